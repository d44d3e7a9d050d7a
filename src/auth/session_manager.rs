use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::jwt_service::JwtService;
use crate::auth::models::{AccessClaims, SessionStatus, SessionTokens};
use crate::auth::redact;
use crate::auth::session_key::{self, SessionKey};
use crate::config::AuthConfig;
use crate::directory::UserDirectory;
use crate::error::{AuthError, Result, StoreError};
use crate::infra::KvStore;

const BEARER: &str = "Bearer ";

/// 会话管理器
///
/// 负责签发、校验、轮换和撤销会话。所有状态都在键值存储里，进程内不持有任何会话数据，
/// 也不加锁：单会话约束靠"先删旧条目、再写新条目"维持。两个并发签发可能短暂留下
/// 两个条目，此时 [`SessionStatus::Ambiguous`] 按不在线处理。
pub struct SessionManager {
    store: Arc<dyn KvStore>,
    jwt: JwtService,
    session_ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KvStore>, jwt: JwtService, session_ttl: Duration) -> Self {
        Self {
            store,
            jwt,
            session_ttl,
        }
    }

    pub fn from_config(store: Arc<dyn KvStore>, config: &AuthConfig) -> Self {
        let jwt = JwtService::new(&config.jwt_secret, config.session.ttl_secs as i64);
        Self::new(store, jwt, config.session.ttl())
    }

    /// 创建前先检查存储是否可用
    pub async fn connect(store: Arc<dyn KvStore>, config: &AuthConfig) -> Result<Self> {
        store.ping().await.map_err(AuthError::SessionLookup)?;
        Ok(Self::from_config(store, config))
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// 签发新会话
    ///
    /// 先删除该用户所有已有的会话条目，删除失败则不再写入。
    pub async fn issue_session(&self, identity: &str, email: &str) -> Result<SessionTokens> {
        session_key::check_identity(identity).map_err(|_| {
            AuthError::TokenGeneration(format!("identity not allowed in session key: {:?}", identity))
        })?;

        let superseded = self.delete_sessions(identity).await.map_err(|e| {
            AuthError::TokenGeneration(format!("unable to delete existing sessions: {}", e))
        })?;

        let refresh_token = Uuid::new_v4().to_string();
        let (access_token, claims) = self.jwt.issue_token(identity, email)?;

        let key = session_key::encode(&refresh_token, identity);
        self.store
            .set_one(&key, &access_token, self.session_ttl)
            .await
            .map_err(|e| AuthError::TokenGeneration(format!("unable to store session: {}", e)))?;

        info!(
            identity = %identity,
            superseded,
            refresh = %redact(&refresh_token),
            "✅ 会话已签发"
        );

        Ok(SessionTokens {
            access_token,
            refresh_token,
            expires_in: self.session_ttl.as_secs() as i64,
            expires_at: claims.expires_at(),
        })
    }

    /// 校验 `Authorization` 头里的 Bearer 令牌（只看签名和过期，不查存储）
    pub fn validate_bearer(&self, authorization_header: &str) -> Result<AccessClaims> {
        let token = extract_bearer(authorization_header)?;
        self.jwt.verify_token(token)
    }

    /// 令牌是否仍是该用户当前唯一的会话
    pub async fn session_status(
        &self,
        authorization_header: &str,
        identity: &str,
    ) -> Result<SessionStatus> {
        let token = extract_bearer(authorization_header)?;
        session_key::check_identity(identity)?;

        let keys = self
            .store
            .find_keys(&session_key::identity_pattern(identity))
            .await
            .map_err(AuthError::SessionLookup)?;

        let key = match keys.as_slice() {
            [] => return Ok(SessionStatus::NoSession),
            [key] => key,
            _ => {
                warn!(identity = %identity, count = keys.len(), "⚠️ 同一用户存在多个会话条目");
                return Ok(SessionStatus::Ambiguous { count: keys.len() });
            }
        };
        SessionKey::parse(key)?;

        let stored = match self.store.get_one(key).await {
            Ok(stored) => stored,
            // 枚举和读取之间过期了
            Err(StoreError::NotFound) => return Ok(SessionStatus::NoSession),
            Err(e) => return Err(AuthError::SessionLookup(e)),
        };

        if stored == token {
            Ok(SessionStatus::Live)
        } else {
            debug!(identity = %identity, "令牌已被新的会话顶替");
            Ok(SessionStatus::Superseded)
        }
    }

    /// [`Self::session_status`] 的布尔版本，查询失败按不在线处理
    pub async fn is_session_live(&self, authorization_header: &str, identity: &str) -> bool {
        match self.session_status(authorization_header, identity).await {
            Ok(status) => status.is_live(),
            Err(e) => {
                warn!(identity = %identity, error = %e, "会话状态查询失败");
                false
            }
        }
    }

    /// 完整的请求认证：签名、过期、且必须是当前会话
    pub async fn authenticate(&self, authorization_header: &str) -> Result<AccessClaims> {
        let claims = self.validate_bearer(authorization_header)?;
        let status = self.session_status(authorization_header, &claims.sub).await?;
        if !status.is_live() {
            debug!(identity = %claims.sub, ?status, "会话不在线，拒绝请求");
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// 撤销该用户的所有会话（登出），返回删除的条目数
    pub async fn revoke_by_identity(&self, identity: &str) -> Result<usize> {
        session_key::check_identity(identity)?;
        let removed = self
            .delete_sessions(identity)
            .await
            .map_err(AuthError::SessionRevocation)?;
        info!(identity = %identity, removed, "会话已撤销");
        Ok(removed)
    }

    /// 由刷新令牌反查用户标识，必须恰好匹配一个会话条目
    pub async fn identity_from_refresh_token(&self, refresh_token: &str) -> Result<String> {
        let key = self.find_refresh_key(refresh_token).await?;
        session_key::decode_identity(&key)
    }

    /// 用刷新令牌换一组新令牌
    ///
    /// 邮箱取自存储中当前的访问令牌（只验签，不看过期）。旧的刷新令牌随旧条目一起删除，
    /// 不能再次使用。
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<SessionTokens> {
        let key = self.find_refresh_key(refresh_token).await?;
        let parsed = SessionKey::parse(&key)?;

        let stored = match self.store.get_one(&key).await {
            Ok(stored) => stored,
            Err(StoreError::NotFound) => return Err(AuthError::InvalidToken),
            Err(e) => return Err(AuthError::SessionLookup(e)),
        };
        let claims = self.jwt.decode_stored(&stored)?;
        if claims.sub != parsed.identity {
            warn!(identity = %parsed.identity, "会话条目与其中的令牌不一致");
            return Err(AuthError::InvalidToken);
        }

        debug!(identity = %parsed.identity, refresh = %redact(refresh_token), "轮换刷新令牌");
        self.issue_session(&parsed.identity, &claims.email).await
    }

    /// 用刷新令牌换一组新令牌，邮箱以用户目录中的当前值为准
    ///
    /// 目录里已经没有这个用户时按无效令牌处理，不再签发。
    pub async fn refresh_session_with(
        &self,
        refresh_token: &str,
        directory: &dyn UserDirectory,
    ) -> Result<SessionTokens> {
        let identity = self.identity_from_refresh_token(refresh_token).await?;
        let user = match directory.find_by_identity(&identity).await? {
            Some(user) => user,
            None => {
                warn!(identity = %identity, "⚠️ 刷新令牌对应的用户已不存在");
                return Err(AuthError::InvalidToken);
            }
        };

        debug!(identity = %identity, refresh = %redact(refresh_token), "轮换刷新令牌");
        self.issue_session(&user.identity, &user.email).await
    }

    /// 该用户当前的会话条目
    pub async fn list_sessions(&self, identity: &str) -> Result<Vec<SessionKey>> {
        session_key::check_identity(identity)?;
        let keys = self
            .store
            .find_keys(&session_key::identity_pattern(identity))
            .await
            .map_err(AuthError::SessionLookup)?;
        keys.iter().map(|k| SessionKey::parse(k)).collect()
    }

    async fn find_refresh_key(&self, refresh_token: &str) -> Result<String> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let mut keys = self
            .store
            .find_keys(&session_key::refresh_token_pattern(refresh_token))
            .await
            .map_err(AuthError::SessionLookup)?;

        match keys.len() {
            1 => Ok(keys.remove(0)),
            0 => {
                debug!(refresh = %redact(refresh_token), "刷新令牌不存在");
                Err(AuthError::InvalidToken)
            }
            n => {
                warn!(refresh = %redact(refresh_token), count = n, "⚠️ 刷新令牌匹配到多个会话条目");
                Err(AuthError::InvalidToken)
            }
        }
    }

    async fn delete_sessions(&self, identity: &str) -> std::result::Result<usize, StoreError> {
        let keys = self
            .store
            .find_keys(&session_key::identity_pattern(identity))
            .await?;
        for key in &keys {
            self.store.delete_one(key).await?;
        }
        Ok(keys.len())
    }
}

/// 去掉 `Bearer ` 前缀，缺少前缀或令牌为空都算无效
pub fn extract_bearer(authorization_header: &str) -> Result<&str> {
    let token = authorization_header
        .strip_prefix(BEARER)
        .ok_or(AuthError::InvalidToken)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(token)
}
