use anyhow::{Context, Result};
use authkv::{
    cli::{Cli, Commands},
    config::{self, AuthConfig, DEFAULT_CONFIG_TOML},
    connect_store, logging, ResetTokenManager, SessionManager,
};
use std::fs;
use std::process;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    // 解析命令行参数
    let cli = Cli::parse();

    // 不需要日志和完整配置的子命令
    match &cli.command {
        Commands::GenerateConfig { path } => return generate_config(path),
        Commands::ValidateConfig { path } => return validate_config(path),
        _ => {}
    }

    // 快速读取 config.toml 的 [logging] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > config.toml > 默认值）
    let log_level = cli
        .get_log_level()
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli.get_log_format().or(early_log.format);
    let log_file = cli.log_file.as_deref().or(early_log.file.as_deref());

    // guard 必须活到进程结束，否则文件日志会丢
    let _log_guard = logging::init_logging(&log_level, log_format.as_deref(), log_file, cli.quiet)?;

    // 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let config = AuthConfig::load(&cli).context("加载配置失败")?;

    if let Commands::ShowConfig = cli.command {
        return show_config(&config);
    }

    tracing::debug!(
        "📊 存储后端: {:?}, 前缀: {}, 会话 TTL: {}s, 重置码 TTL: {}s",
        config.store.backend,
        config.app_name,
        config.session.ttl_secs,
        config.reset.ttl_secs
    );

    let store = match connect_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("❌ 存储连接失败: {}", e);
            tracing::error!("💡 请检查 REDIS_URL / --redis-url 或使用 --store memory");
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Ping => {
            store.ping().await.context("存储 PING 失败")?;
            println!("✅ 存储可用 ({:?})", config.store.backend);
        }
        Commands::Issue { identity, email } => {
            let sessions = SessionManager::from_config(store, &config);
            let tokens = sessions
                .issue_session(&identity, &email)
                .await
                .context("签发会话失败")?;
            println!("{}", serde_json::to_string_pretty(&tokens)?);
        }
        Commands::Inspect {
            identity,
            access_token,
        } => {
            let sessions = SessionManager::from_config(store, &config);
            let entries = sessions
                .list_sessions(&identity)
                .await
                .context("查询会话失败")?;

            println!("📋 {} 的会话条目: {}", identity, entries.len());
            for entry in &entries {
                println!("  - refresh={}", entry.refresh_token);
            }

            if let Some(token) = access_token {
                let header = format!("Bearer {}", token);
                match sessions.validate_bearer(&header) {
                    Ok(claims) => println!("🔑 令牌有效: sub={}, exp={}", claims.sub, claims.expires_at()),
                    Err(e) => println!("❌ 令牌无效: {}", e),
                }
                let status = sessions
                    .session_status(&header, &identity)
                    .await
                    .context("查询会话状态失败")?;
                println!("📡 会话状态: {}", serde_json::to_string(&status)?);
            }
        }
        Commands::Revoke { identity } => {
            let sessions = SessionManager::from_config(store, &config);
            let removed = sessions
                .revoke_by_identity(&identity)
                .await
                .context("撤销会话失败")?;
            println!("✅ 已撤销 {} 个会话条目: {}", removed, identity);
        }
        Commands::ResetCode { identity } => {
            let resets = ResetTokenManager::from_config(store, &config);
            let code = resets
                .issue_reset_code(&identity)
                .await
                .context("签发重置码失败")?;
            println!("✅ 重置码: {} (有效期 {}s)", code, resets.ttl().as_secs());
        }
        Commands::GenerateConfig { .. } | Commands::ValidateConfig { .. } | Commands::ShowConfig => {}
    }

    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    fs::write(path, DEFAULT_CONFIG_TOML).with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = AuthConfig::from_toml_file(path)
        .with_context(|| format!("配置文件验证失败: {}", path))?;
    config
        .validate()
        .with_context(|| format!("配置文件验证失败: {}", path))?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - App Name: {}", config.app_name);
    println!("  - Store: {:?}", config.store.backend);
    println!("  - Session TTL: {}s", config.session.ttl_secs);
    println!("  - Reset TTL: {}s", config.reset.ttl_secs);

    Ok(())
}

/// 显示合并后的配置（密钥隐藏）
fn show_config(config: &AuthConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}
