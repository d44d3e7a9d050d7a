// 认证模块 - 提供访问令牌签发验证、会话轮换/撤销和密码重置码

pub mod jwt_service;
pub mod models;
pub mod reset_token;
pub mod session_key;
pub mod session_manager;

// 重新导出主要类型
pub use jwt_service::JwtService;
pub use models::{AccessClaims, SessionStatus, SessionTokens};
pub use reset_token::ResetTokenManager;
pub use session_key::SessionKey;
pub use session_manager::{extract_bearer, SessionManager};

const REDACT_VISIBLE_CHARS: usize = 8;

/// 日志里只保留令牌/码的前几个字符
pub(crate) fn redact(secret: &str) -> String {
    let count = secret.chars().count();
    let keep = if count > REDACT_VISIBLE_CHARS {
        REDACT_VISIBLE_CHARS
    } else if count > 2 {
        2
    } else {
        0
    };
    let head: String = secret.chars().take(keep).collect();
    format!("{}…", head)
}
