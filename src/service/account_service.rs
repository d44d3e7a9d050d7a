use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::auth::{AccessClaims, ResetTokenManager, SessionManager, SessionTokens};
use crate::directory::UserDirectory;
use crate::error::{AuthError, Result};

/// 忘记密码流程的结果，由调用方负责投递（邮件等）
#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetTicket {
    pub identity: String,
    pub email: String,
    pub code: String,
    /// 有效期（秒）
    pub expires_in: u64,
}

/// 账号服务
///
/// 把用户目录和会话核心串成登录、登出、刷新、找回密码等用例。
/// 不关心传输层，调用方自行把 [`AuthError`] 映射成响应。
pub struct AccountService {
    directory: Arc<dyn UserDirectory>,
    sessions: Arc<SessionManager>,
    resets: Arc<ResetTokenManager>,
}

impl AccountService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        sessions: Arc<SessionManager>,
        resets: Arc<ResetTokenManager>,
    ) -> Self {
        Self {
            directory,
            sessions,
            resets,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// 邮箱 + 密码登录，成功后顶替该用户已有的会话
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionTokens> {
        let user = self
            .directory
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(email.to_string()))?;

        if !self.directory.verify_password(&user.identity, password).await? {
            warn!("❌ 密码验证失败: identity={}", user.identity);
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.sessions.issue_session(&user.identity, &user.email).await?;
        info!("✅ 用户登录成功: identity={}", user.identity);
        Ok(tokens)
    }

    /// 登出：撤销该用户的全部会话
    pub async fn logout(&self, claims: &AccessClaims) -> Result<()> {
        self.sessions.revoke_by_identity(claims.identity()).await?;
        Ok(())
    }

    /// 刷新令牌换新会话，邮箱以目录中的当前值为准
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens> {
        self.sessions
            .refresh_session_with(refresh_token, self.directory.as_ref())
            .await
    }

    /// 忘记密码：签发重置码
    pub async fn forgot_password(&self, email: &str) -> Result<PasswordResetTicket> {
        let user = self
            .directory
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(email.to_string()))?;

        let code = self.resets.issue_reset_code(&user.identity).await?;
        Ok(PasswordResetTicket {
            identity: user.identity,
            email: user.email,
            code,
            expires_in: self.resets.ttl().as_secs(),
        })
    }

    /// 校验重置码（不消耗）
    pub async fn verify_reset_code(&self, code: &str) -> Result<()> {
        self.resets.verify_reset_code(code).await
    }

    /// 用重置码设置新密码
    ///
    /// 顺序：兑换 → 改密码 → 撤销会话 → 删除重置码。撤销失败只记日志，
    /// 删除失败则返回错误（密码已经改了，但码仍可在 TTL 内再次使用）。
    pub async fn reset_password(&self, code: &str, new_password: &str) -> Result<()> {
        let identity = self.resets.redeem_reset_code(code).await?;
        self.directory.update_password(&identity, new_password).await?;

        if let Err(e) = self.sessions.revoke_by_identity(&identity).await {
            warn!("重置密码后撤销会话失败: identity={}, error={}", identity, e);
        }

        self.resets.delete_reset_code(code).await?;
        info!("✅ 密码已重置: identity={}", identity);
        Ok(())
    }

    /// 已登录用户修改密码，成功后所有会话失效
    pub async fn change_password(
        &self,
        claims: &AccessClaims,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let identity = claims.identity();
        if !self.directory.verify_password(identity, old_password).await? {
            return Err(AuthError::InvalidCredentials);
        }
        self.directory.update_password(identity, new_password).await?;
        self.sessions.revoke_by_identity(identity).await?;
        info!("✅ 密码已修改: identity={}", identity);
        Ok(())
    }

    /// 修改邮箱；邮箱变化时令牌里的 email 已过时，撤销全部会话
    pub async fn update_email(&self, claims: &AccessClaims, new_email: &str) -> Result<bool> {
        let identity = claims.identity();
        let user = self
            .directory
            .find_by_identity(identity)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(identity.to_string()))?;

        self.directory.update_email(identity, new_email).await?;
        let changed = self
            .directory
            .find_by_identity(identity)
            .await?
            .map(|updated| updated.email != user.email)
            .unwrap_or(true);

        if changed {
            self.sessions.revoke_by_identity(identity).await?;
            info!("邮箱已修改，会话已撤销: identity={}", identity);
        }
        Ok(changed)
    }
}
