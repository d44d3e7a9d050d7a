use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 默认会话时长（30 分钟）
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
/// 默认重置码时长（10 分钟）
pub const DEFAULT_RESET_TTL_SECS: u64 = 10 * 60;
/// 默认重置码位数
pub const DEFAULT_RESET_CODE_LENGTH: usize = 6;

/// 认证子系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 应用名，作为所有键的前缀，多个应用可共享同一个存储
    pub app_name: String,
    /// JWT 签名密钥（HS256，签发和验证共用）
    pub jwt_secret: String,
    /// 会话配置
    pub session: SessionConfig,
    /// 密码重置配置
    pub reset: ResetConfig,
    /// 存储配置
    pub store: StoreConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_name: "authkv:".to_string(),
            jwt_secret: String::new(),
            session: SessionConfig::default(),
            reset: ResetConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 访问令牌和会话条目的有效期（秒）
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// 密码重置配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetConfig {
    /// 重置码有效期（秒），必须短于会话有效期
    pub ttl_secs: u64,
    /// 重置码位数
    pub code_length: usize,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_RESET_TTL_SECS,
            code_length: DEFAULT_RESET_CODE_LENGTH,
        }
    }
}

impl ResetConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    /// 进程内存储，仅用于开发和测试
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => bail!("unknown store backend: {}", other),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis: RedisConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis: RedisConfig::default(),
        }
    }
}

/// Redis配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis连接URL
    pub url: String,
    /// 连接池大小
    pub pool_size: u32,
    /// 最小空闲连接数
    pub min_idle: u32,
    /// 连接超时时间（秒）
    pub connection_timeout_secs: u64,
    /// 单条命令超时（毫秒）
    pub command_timeout_ms: u64,
    /// 空闲连接回收时间（秒）
    pub idle_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 10,
            min_idle: 1,
            connection_timeout_secs: 5,
            command_timeout_ms: 2000,
            idle_timeout_secs: 300,
        }
    }
}

impl RedisConfig {
    /// 获取连接超时时间
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// 日志配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    /// compact / pretty / json
    pub format: Option<String>,
    pub file: Option<String>,
}

impl AuthConfig {
    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).context("配置文件格式错误")?;
        Ok(toml_config.into())
    }

    /// 从环境变量合并配置（AUTHKV_ 前缀）
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(app_name) = env::var("AUTHKV_APP_NAME") {
            self.app_name = app_name;
        }
        if let Ok(secret) = env::var("AUTHKV_JWT_SECRET").or_else(|_| env::var("SECRET_KEY")) {
            self.jwt_secret = secret;
        }
        if let Ok(redis_url) = env::var("REDIS_URL") {
            self.store.redis.url = redis_url;
        }
        if let Ok(ttl) = env::var("AUTHKV_SESSION_TTL_SECS") {
            self.session.ttl_secs = ttl
                .parse()
                .with_context(|| format!("AUTHKV_SESSION_TTL_SECS 不是有效数字: {}", ttl))?;
        }
        if let Ok(ttl) = env::var("AUTHKV_RESET_TTL_SECS") {
            self.reset.ttl_secs = ttl
                .parse()
                .with_context(|| format!("AUTHKV_RESET_TTL_SECS 不是有效数字: {}", ttl))?;
        }
        if let Ok(backend) = env::var("AUTHKV_STORE_BACKEND") {
            self.store.backend = backend.parse()?;
        }
        if let Ok(level) = env::var("AUTHKV_LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(redis_url) = &cli.redis_url {
            self.store.redis.url = redis_url.clone();
        }
        if let Some(jwt_secret) = &cli.jwt_secret {
            self.jwt_secret = jwt_secret.clone();
        }
        if let Some(backend) = cli.store {
            self.store.backend = backend;
        }
        if let Some(log_level) = cli.get_log_level() {
            self.logging.level = Some(log_level);
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if let Some(config_file) = &cli.config_file {
            if Path::new(config_file).exists() {
                info!("📄 从配置文件加载: {}", config_file);
                Self::from_toml_file(config_file)?
            } else {
                tracing::warn!("⚠️ 配置文件不存在: {}", config_file);
                Self::default()
            }
        } else if Path::new("config.toml").exists() {
            info!("📄 从默认配置文件加载: config.toml");
            Self::from_toml_file("config.toml")?
        } else {
            Self::default()
        };

        config.merge_from_env()?;
        config.merge_from_cli(cli);
        config.validate()?;

        Ok(config)
    }

    /// 校验配置的一致性
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.is_empty() {
            bail!("jwt_secret 未配置（AUTHKV_JWT_SECRET / --jwt-secret）");
        }
        if self.jwt_secret.len() < 32 {
            tracing::warn!("⚠️ jwt_secret 少于 32 字节，建议使用更长的密钥");
        }
        if self.session.ttl_secs == 0 || self.reset.ttl_secs == 0 {
            bail!("session.ttl_secs 和 reset.ttl_secs 必须大于 0");
        }
        if self.reset.ttl_secs >= self.session.ttl_secs {
            bail!(
                "reset.ttl_secs ({}) 必须小于 session.ttl_secs ({})",
                self.reset.ttl_secs,
                self.session.ttl_secs
            );
        }
        if !(4..=9).contains(&self.reset.code_length) {
            bail!("reset.code_length 必须在 4..=9 之间: {}", self.reset.code_length);
        }
        Ok(())
    }

    /// 用于展示的副本（隐藏密钥）
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.jwt_secret.is_empty() {
            config.jwt_secret = "***".to_string();
        }
        config
    }
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    app_name: Option<String>,
    jwt_secret: Option<String>,
    session: Option<TomlSessionConfig>,
    reset: Option<TomlResetConfig>,
    store: Option<TomlStoreConfig>,
    logging: Option<TomlLoggingConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlSessionConfig {
    ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TomlResetConfig {
    ttl_secs: Option<u64>,
    code_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TomlStoreConfig {
    backend: Option<StoreBackend>,
    redis: Option<TomlRedisConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlRedisConfig {
    url: Option<String>,
    pool_size: Option<u32>,
    min_idle: Option<u32>,
    connection_timeout: Option<u64>,
    command_timeout_ms: Option<u64>,
    idle_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlLoggingConfig {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

impl From<TomlLoggingConfig> for LoggingConfig {
    fn from(toml: TomlLoggingConfig) -> Self {
        Self {
            level: toml.level,
            format: toml.format,
            file: toml.file,
        }
    }
}

impl From<TomlConfig> for AuthConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(app_name) = toml.app_name {
            config.app_name = app_name;
        }
        if let Some(secret) = toml.jwt_secret {
            config.jwt_secret = secret;
        }

        if let Some(session) = toml.session {
            if let Some(ttl) = session.ttl_secs {
                config.session.ttl_secs = ttl;
            }
        }

        if let Some(reset) = toml.reset {
            if let Some(ttl) = reset.ttl_secs {
                config.reset.ttl_secs = ttl;
            }
            if let Some(len) = reset.code_length {
                config.reset.code_length = len;
            }
        }

        if let Some(store) = toml.store {
            if let Some(backend) = store.backend {
                config.store.backend = backend;
            }
            if let Some(redis) = store.redis {
                let target = &mut config.store.redis;
                if let Some(url) = redis.url {
                    target.url = url;
                }
                if let Some(size) = redis.pool_size {
                    target.pool_size = size;
                }
                if let Some(min_idle) = redis.min_idle {
                    target.min_idle = min_idle;
                }
                if let Some(timeout) = redis.connection_timeout {
                    target.connection_timeout_secs = timeout;
                }
                if let Some(timeout) = redis.command_timeout_ms {
                    target.command_timeout_ms = timeout;
                }
                if let Some(timeout) = redis.idle_timeout {
                    target.idle_timeout_secs = timeout;
                }
            }
        }

        if let Some(logging) = toml.logging {
            config.logging = logging.into();
        }

        config
    }
}

/// 快速读取 [logging] 段，用于日志初始化之前
pub fn load_early_logging_config(config_file: Option<&str>) -> LoggingConfig {
    #[derive(Deserialize)]
    struct EarlyConfig {
        logging: Option<TomlLoggingConfig>,
    }

    let path = config_file.unwrap_or("config.toml");
    fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<EarlyConfig>(&content).ok())
        .and_then(|c| c.logging)
        .map(LoggingConfig::from)
        .unwrap_or_default()
}

/// 默认配置文件内容（generate-config 使用）
pub const DEFAULT_CONFIG_TOML: &str = r#"# authkv 配置文件
# 此文件由 authkv generate-config 生成

# 所有键的前缀
app_name = "authkv:"
# 建议通过环境变量 AUTHKV_JWT_SECRET 提供
jwt_secret = ""

[session]
ttl_secs = 1800

[reset]
ttl_secs = 600
code_length = 6

[store]
backend = "redis"

[store.redis]
url = "redis://127.0.0.1:6379"
pool_size = 10
min_idle = 1
connection_timeout = 5
command_timeout_ms = 2000
idle_timeout = 300

[logging]
level = "info"
format = "compact"
# file = "./logs/authkv.log"
"#;
