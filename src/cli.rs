use clap::{Parser, Subcommand};

use crate::config::StoreBackend;

// 确保 Parser trait 被使用
impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// authkv - 基于键值缓存的会话与凭证管理
#[derive(Parser, Debug)]
#[command(name = "authkv")]
#[command(version)]
#[command(about = "会话令牌签发、校验、轮换与撤销，以及一次性密码重置码", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// 日志级别
    #[arg(
        long,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 日志文件路径
    #[arg(long, value_name = "PATH", help = "日志输出文件路径")]
    pub log_file: Option<String>,

    /// Redis 连接 URL
    #[arg(long, value_name = "URL", help = "Redis 连接字符串")]
    pub redis_url: Option<String>,

    /// JWT 密钥
    #[arg(long, value_name = "SECRET", help = "JWT 签名密钥")]
    pub jwt_secret: Option<String>,

    /// 存储后端
    #[arg(long, value_name = "BACKEND", help = "存储后端: redis, memory")]
    pub store: Option<StoreBackend>,

    /// 详细输出（可重复使用：-v, -vv, -vvv）
    #[arg(short, action = clap::ArgAction::Count, help = "详细输出级别")]
    pub verbose: u8,

    /// 静默模式
    #[arg(long, short = 'q', help = "静默模式（不输出日志）")]
    pub quiet: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 生成默认配置文件
    GenerateConfig {
        /// 输出文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 验证配置文件
    ValidateConfig {
        /// 配置文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 显示最终配置（合并后的配置，密钥隐藏）
    ShowConfig,
    /// 检查存储是否可用
    Ping,
    /// 为用户签发新会话（会顶掉已有会话）
    Issue {
        #[arg(long)]
        identity: String,
        #[arg(long)]
        email: String,
    },
    /// 查看用户当前的会话条目
    Inspect {
        #[arg(long)]
        identity: String,
        /// 可选：检查该访问令牌是否仍是当前会话
        #[arg(long, value_name = "TOKEN")]
        access_token: Option<String>,
    },
    /// 撤销用户的所有会话（登出）
    Revoke {
        #[arg(long)]
        identity: String,
    },
    /// 为用户签发密码重置码
    ResetCode {
        #[arg(long)]
        identity: String,
    },
}

impl Cli {
    /// 获取日志级别（考虑 verbose 和 quiet）
    pub fn get_log_level(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }

        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }

        // 根据 verbose 级别设置
        match self.verbose {
            0 => None, // 使用默认或配置文件
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }

    /// 获取日志格式
    pub fn get_log_format(&self) -> Option<String> {
        self.log_format.clone()
    }
}
