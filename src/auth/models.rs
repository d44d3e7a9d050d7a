use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 访问令牌 Claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// JWT 标准字段 - 主题 (用户标识)
    pub sub: String,
    /// 用户邮箱
    #[serde(default)]
    pub email: String,
    /// JWT 标准字段 - 过期时间 (Unix timestamp)
    pub exp: i64,
    /// JWT 标准字段 - 签发时间
    #[serde(default)]
    pub iat: i64,
    /// JWT 标准字段 - JWT ID，保证同一秒内签发的令牌也互不相同
    #[serde(default)]
    pub jti: String,
}

impl AccessClaims {
    pub fn identity(&self) -> &str {
        &self.sub
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// 一次签发的结果
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    /// 访问令牌
    pub access_token: String,
    /// 刷新令牌（一次性）
    pub refresh_token: String,
    /// 过期时间（秒）
    pub expires_in: i64,
    /// 过期时间戳
    pub expires_at: DateTime<Utc>,
}

/// 会话状态
///
/// 比单纯的 bool 多保留了"为什么不在线"，便于日志和测试。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// 令牌就是该用户当前唯一的会话
    Live,
    /// 该用户没有会话（已登出、已撤销或已过期）
    NoSession,
    /// 同一用户存在多个会话条目（并发签发的竞争窗口）
    Ambiguous { count: usize },
    /// 会话存在，但已被更新的签发顶替
    Superseded,
}

impl SessionStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::Live)
    }
}
