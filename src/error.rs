use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 键值存储错误
///
/// 只有适配器层产生这个类型，用来区分"键不存在"和"传输失败"。
/// 会话层把它包装进 [`AuthError`] 的 source，调用方只按 `AuthError` 分支。
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// 键不存在或已过期（TTL 淘汰与不存在无法区分）
    #[error("key not found")]
    NotFound,
    /// 单条命令超时
    #[error("store command timeout ({0}ms)")]
    Timeout(u128),
    /// 无法从连接池取得连接
    #[error("store pool error: {0}")]
    Pool(String),
    /// 后端返回的错误
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// 认证/会话错误
#[derive(Debug, Error)]
pub enum AuthError {
    /// 无效令牌（格式错误、缺少 Bearer、签名或算法不符、键无法解析、刷新令牌不存在或不唯一）
    #[error("invalid token")]
    InvalidToken,
    /// 签名有效但已过期
    #[error("expired token")]
    ExpiredToken,
    /// claims 结构错误
    #[error("error decoding JWT token")]
    DecodingToken,
    /// 签发失败（签名或写入存储）
    #[error("error generating JWT token: {0}")]
    TokenGeneration(String),
    /// 重置码写入失败
    #[error("error generating password reset token")]
    ResetTokenGeneration(#[source] StoreError),
    /// 重置码不存在、已过期或读取失败
    #[error("error retrieving password reset token")]
    ResetTokenRetrieval(#[source] Option<StoreError>),
    /// 重置码删除失败
    #[error("error deleting password reset token")]
    ResetTokenDeletion(#[source] StoreError),
    /// 查询会话时存储失败
    #[error("error looking up session")]
    SessionLookup(#[source] StoreError),
    /// 删除会话时存储失败
    #[error("error revoking session")]
    SessionRevocation(#[source] StoreError),
    /// 用户目录中不存在该用户
    #[error("user not found: {0}")]
    UserNotFound(String),
    /// 密码不匹配
    #[error("invalid credentials")]
    InvalidCredentials,
    /// 用户目录访问失败
    #[error("user directory error: {0}")]
    Directory(String),
}

impl AuthError {
    /// 稳定的错误码，供传输层映射状态码
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }

    /// 是否属于"凭证不被接受"一类（调用方通常映射为 401）
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidToken
                | AuthError::ExpiredToken
                | AuthError::DecodingToken
                | AuthError::ResetTokenRetrieval(_)
                | AuthError::InvalidCredentials
        )
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AuthError>;

/// 错误代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// 无效令牌
    InvalidToken = 5002,
    /// 令牌过期
    ExpiredToken = 5010,
    /// 令牌解码失败
    DecodingToken = 5011,
    /// 令牌签发失败
    TokenGeneration = 5012,
    /// 重置码签发失败
    ResetTokenGeneration = 5020,
    /// 重置码读取失败
    ResetTokenRetrieval = 5021,
    /// 重置码删除失败
    ResetTokenDeletion = 5022,
    /// 缓存错误
    Cache = 2004,
    /// 用户未找到
    UserNotFound = 1004,
    /// 认证错误
    Authentication = 1001,
    /// 内部错误
    Internal = 1000,
}

impl From<&AuthError> for ErrorCode {
    fn from(error: &AuthError) -> Self {
        match error {
            AuthError::InvalidToken => ErrorCode::InvalidToken,
            AuthError::ExpiredToken => ErrorCode::ExpiredToken,
            AuthError::DecodingToken => ErrorCode::DecodingToken,
            AuthError::TokenGeneration(_) => ErrorCode::TokenGeneration,
            AuthError::ResetTokenGeneration(_) => ErrorCode::ResetTokenGeneration,
            AuthError::ResetTokenRetrieval(_) => ErrorCode::ResetTokenRetrieval,
            AuthError::ResetTokenDeletion(_) => ErrorCode::ResetTokenDeletion,
            AuthError::SessionLookup(_) | AuthError::SessionRevocation(_) => ErrorCode::Cache,
            AuthError::UserNotFound(_) => ErrorCode::UserNotFound,
            AuthError::InvalidCredentials => ErrorCode::Authentication,
            AuthError::Directory(_) => ErrorCode::Internal,
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: ErrorCode,
    /// 错误消息
    pub message: String,
    /// 详细信息
    pub details: Option<String>,
    /// 时间戳
    pub timestamp: u64,
}

impl ErrorResponse {
    /// 创建错误响应
    pub fn new(error: &AuthError) -> Self {
        Self {
            code: ErrorCode::from(error),
            message: error.to_string(),
            details: None,
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }

    /// 创建带详细信息的错误响应
    pub fn with_details(error: &AuthError, details: String) -> Self {
        Self {
            details: Some(details),
            ..Self::new(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_store_error_is_kept_as_source() {
        let err = AuthError::SessionRevocation(StoreError::Timeout(2000));
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "store command timeout (2000ms)");
        assert_eq!(err.code(), ErrorCode::Cache);
    }

    #[test]
    fn test_unauthorized_classification() {
        assert!(AuthError::InvalidToken.is_unauthorized());
        assert!(AuthError::ExpiredToken.is_unauthorized());
        assert!(AuthError::ResetTokenRetrieval(None).is_unauthorized());
        assert!(!AuthError::TokenGeneration("boom".to_string()).is_unauthorized());
        assert!(!AuthError::SessionLookup(StoreError::NotFound).is_unauthorized());
    }

    #[test]
    fn test_error_response_body() {
        let resp = ErrorResponse::with_details(&AuthError::ExpiredToken, "exp=1".to_string());
        assert_eq!(resp.code, ErrorCode::ExpiredToken);
        assert_eq!(resp.message, "expired token");
        assert_eq!(resp.details.as_deref(), Some("exp=1"));

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["code"], "ExpiredToken");
    }
}
