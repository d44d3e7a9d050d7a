use crate::auth::models::AccessClaims;
use crate::error::{AuthError, Result};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

/// 访问令牌签发和验证服务（HS256 对称加密）
///
/// 密钥在构造时传入，整个进程共用；更换密钥会使所有未过期的会话失效。
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: i64,
}

impl JwtService {
    /// 创建 JWT 服务
    pub fn new(secret: &str, token_ttl: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl,
        }
    }

    /// 签发访问令牌，返回 (token, claims)
    pub fn issue_token(&self, identity: &str, email: &str) -> Result<(String, AccessClaims)> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: identity.to_string(),
            email: email.to_string(),
            exp: now + self.token_ttl,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGeneration(format!("JWT 签发失败: {}", e)))?;

        Ok((token, claims))
    }

    /// 验证令牌
    ///
    /// 只接受 HS256；过期判断不留余量（`now > exp` 即过期）。
    pub fn verify_token(&self, token: &str) -> Result<AccessClaims> {
        self.decode_with(token, true)
    }

    /// 读取存储中保存的令牌：仍然验签，但不检查过期
    pub fn decode_stored(&self, token: &str) -> Result<AccessClaims> {
        self.decode_with(token, false)
    }

    fn decode_with(&self, token: &str, validate_exp: bool) -> Result<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::Json(_)
                | ErrorKind::Base64(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::MissingRequiredClaim(_) => AuthError::DecodingToken,
                _ => AuthError::InvalidToken,
            })?;

        let claims = token_data.claims;
        if claims.sub.is_empty() {
            return Err(AuthError::DecodingToken);
        }
        Ok(claims)
    }

    /// 获取默认 TTL
    pub fn default_ttl(&self) -> i64 {
        self.token_ttl
    }
}
