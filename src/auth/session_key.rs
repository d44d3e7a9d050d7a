//! 会话键编码
//!
//! 一个会话条目的键同时携带刷新令牌和用户标识：
//!
//! ```text
//! refresh-<refresh_token>:jwt-clients--<identity>
//! ```
//!
//! 这样既能按用户（后缀）枚举，也能按刷新令牌（前缀）枚举，
//! 在只支持 key/value + 模式匹配的存储上模拟二级索引。
//! 存储本身没有 schema，解码失败是发现异常键的唯一途径。

use crate::error::{AuthError, Result};
use crate::infra::escape_glob;

/// 会话命名空间
pub const SESSION_NAMESPACE: &str = "jwt-clients";
/// 刷新令牌前缀
pub const REFRESH_PREFIX: &str = "refresh-";
/// 重置码前缀
pub const RESET_PREFIX: &str = "reset-";
const KEY_DELIMITER: &str = "--";
const COLON_DELIMITER: &str = ":";

/// 解码后的会话键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub refresh_token: String,
    pub identity: String,
}

impl SessionKey {
    pub fn new(refresh_token: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            identity: identity.into(),
        }
    }

    pub fn encode(&self) -> String {
        encode(&self.refresh_token, &self.identity)
    }

    pub fn parse(key: &str) -> Result<Self> {
        Ok(Self {
            refresh_token: decode_refresh_token(key)?,
            identity: decode_identity(key)?,
        })
    }
}

/// `refresh-<token>:jwt-clients--<identity>`
pub fn encode(refresh_token: &str, identity: &str) -> String {
    format!(
        "{}{}{}{}{}{}",
        REFRESH_PREFIX, refresh_token, COLON_DELIMITER, SESSION_NAMESPACE, KEY_DELIMITER, identity
    )
}

fn identity_marker() -> String {
    format!("{}{}", SESSION_NAMESPACE, KEY_DELIMITER)
}

fn refresh_end_marker() -> String {
    format!("{}{}", COLON_DELIMITER, SESSION_NAMESPACE)
}

/// 用户标识能否放进会话键
///
/// 标识里出现 `jwt-clients--` 时，解码会取到标识内部的后半段，
/// 按用户枚举的模式也会把它当成另一个用户的条目。
pub fn check_identity(identity: &str) -> Result<()> {
    if identity.is_empty() || identity.contains(&identity_marker()) {
        return Err(AuthError::InvalidToken);
    }
    Ok(())
}

/// 取 `refresh-` 与 `:jwt-clients` 之间的部分
pub fn decode_refresh_token(key: &str) -> Result<String> {
    let (_, rest) = key.split_once(REFRESH_PREFIX).ok_or(AuthError::InvalidToken)?;
    let (token, _) = rest
        .split_once(&refresh_end_marker())
        .ok_or(AuthError::InvalidToken)?;
    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(token.to_string())
}

/// 取最后一个 `jwt-clients--` 之后的部分
pub fn decode_identity(key: &str) -> Result<String> {
    let (_, identity) = key
        .rsplit_once(&identity_marker())
        .ok_or(AuthError::InvalidToken)?;
    if identity.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(identity.to_string())
}

/// 某个用户的所有会话条目
pub fn identity_pattern(identity: &str) -> String {
    format!(
        "{}*{}{}",
        REFRESH_PREFIX,
        COLON_DELIMITER,
        escape_glob(&format!("{}{}", identity_marker(), identity))
    )
}

/// 某个刷新令牌对应的会话条目
pub fn refresh_token_pattern(refresh_token: &str) -> String {
    format!(
        "{}{}*",
        escape_glob(&format!("{}{}", REFRESH_PREFIX, refresh_token)),
        escape_glob(&format!("{}{}", COLON_DELIMITER, identity_marker())),
    )
}

/// 重置码条目的键
pub fn reset_key(code: &str) -> String {
    format!("{}{}", RESET_PREFIX, code)
}
