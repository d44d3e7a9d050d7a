use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::auth::redact;
use crate::auth::session_key::reset_key;
use crate::config::{AuthConfig, DEFAULT_RESET_CODE_LENGTH};
use crate::error::{AuthError, Result, StoreError};
use crate::infra::KvStore;

/// 密码重置码管理
///
/// 重置码是短的纯数字一次性码，用于邮件发送后手动输入，熵不高，只靠短 TTL 保护。
/// 与会话的生命周期相互独立，只共享键值存储。使用成功后必须由调用方显式删除，
/// 否则在 TTL 到期前仍可再次兑换。
pub struct ResetTokenManager {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    code_length: usize,
}

impl ResetTokenManager {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration, code_length: usize) -> Self {
        Self {
            store,
            ttl,
            code_length,
        }
    }

    pub fn from_config(store: Arc<dyn KvStore>, config: &AuthConfig) -> Self {
        Self::new(store, config.reset.ttl(), config.reset.code_length)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 为用户签发重置码
    pub async fn issue_reset_code(&self, identity: &str) -> Result<String> {
        let code = generate_code(self.code_length);
        self.store
            .set_one(&reset_key(&code), identity, self.ttl)
            .await
            .map_err(AuthError::ResetTokenGeneration)?;

        info!(identity = %identity, ttl_secs = self.ttl.as_secs(), "重置码已签发");
        Ok(code)
    }

    /// 兑换重置码，返回用户标识（不删除）
    pub async fn redeem_reset_code(&self, code: &str) -> Result<String> {
        if !self.is_well_formed(code) {
            debug!(code = %redact(code), "重置码格式不正确");
            return Err(AuthError::ResetTokenRetrieval(None));
        }

        match self.store.get_one(&reset_key(code)).await {
            Ok(identity) => Ok(identity),
            Err(StoreError::NotFound) => Err(AuthError::ResetTokenRetrieval(None)),
            Err(e) => {
                warn!(error = %e, "读取重置码失败");
                Err(AuthError::ResetTokenRetrieval(Some(e)))
            }
        }
    }

    /// 校验重置码存在且格式正确，不消耗
    pub async fn verify_reset_code(&self, code: &str) -> Result<()> {
        self.redeem_reset_code(code).await.map(|_| ())
    }

    /// 删除重置码
    pub async fn delete_reset_code(&self, code: &str) -> Result<()> {
        self.store
            .delete_one(&reset_key(code))
            .await
            .map_err(AuthError::ResetTokenDeletion)
    }

    fn is_well_formed(&self, code: &str) -> bool {
        code.len() == self.code_length && code.bytes().all(|b| b.is_ascii_digit())
    }
}

/// 生成 `length` 位十进制码（均匀分布，保留前导零）
pub fn generate_code(length: usize) -> String {
    let length = if length == 0 {
        DEFAULT_RESET_CODE_LENGTH
    } else {
        length
    };
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::MemoryStore;

    fn manager(ttl: Duration) -> (ResetTokenManager, MemoryStore) {
        let store = MemoryStore::new("test:");
        (ResetTokenManager::new(Arc::new(store.clone()), ttl, 6), store)
    }

    #[test]
    fn test_generate_code_shape() {
        for _ in 0..100 {
            let code = generate_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
        assert_eq!(generate_code(0).len(), DEFAULT_RESET_CODE_LENGTH);
    }

    #[tokio::test]
    async fn test_issue_and_redeem() {
        let (manager, store) = manager(Duration::from_secs(600));
        let code = manager.issue_reset_code("u1").await.unwrap();

        assert_eq!(manager.redeem_reset_code(&code).await.unwrap(), "u1");
        // 兑换不会消耗
        assert_eq!(manager.redeem_reset_code(&code).await.unwrap(), "u1");
        assert!(manager.verify_reset_code(&code).await.is_ok());
        assert!(store.ttl_of(&reset_key(&code)).unwrap() <= Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_deleted_code_cannot_be_redeemed() {
        let (manager, _store) = manager(Duration::from_secs(600));
        let code = manager.issue_reset_code("u1").await.unwrap();

        manager.delete_reset_code(&code).await.unwrap();
        assert!(matches!(
            manager.redeem_reset_code(&code).await,
            Err(AuthError::ResetTokenRetrieval(None))
        ));
        // 重复删除不报错
        manager.delete_reset_code(&code).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_codes() {
        let (manager, _store) = manager(Duration::from_secs(600));
        manager.issue_reset_code("u1").await.unwrap();

        for code in ["", "12345", "1234567", "12a456", "******"] {
            assert!(
                matches!(
                    manager.redeem_reset_code(code).await,
                    Err(AuthError::ResetTokenRetrieval(None))
                ),
                "code {:?} should not redeem",
                code
            );
        }
    }

    #[tokio::test]
    async fn test_code_expires() {
        let (manager, _store) = manager(Duration::from_millis(30));
        let code = manager.issue_reset_code("u1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(matches!(
            manager.verify_reset_code(&code).await,
            Err(AuthError::ResetTokenRetrieval(None))
        ));
    }

    #[tokio::test]
    async fn test_store_failures_map_to_reset_errors() {
        use crate::infra::testing::{FlakyStore, StoreOp};

        let store = Arc::new(FlakyStore::new(MemoryStore::new("test:")));
        let manager = ResetTokenManager::new(store.clone(), Duration::from_secs(600), 6);

        store.fail(StoreOp::Set, true);
        assert!(matches!(
            manager.issue_reset_code("u1").await,
            Err(AuthError::ResetTokenGeneration(StoreError::Backend(_)))
        ));
        assert!(store.inner().is_empty());
        store.fail(StoreOp::Set, false);

        let code = manager.issue_reset_code("u1").await.unwrap();

        store.fail(StoreOp::Get, true);
        assert!(matches!(
            manager.redeem_reset_code(&code).await,
            Err(AuthError::ResetTokenRetrieval(Some(StoreError::Backend(_))))
        ));
        assert!(matches!(
            manager.verify_reset_code(&code).await,
            Err(AuthError::ResetTokenRetrieval(Some(_)))
        ));
        store.fail(StoreOp::Get, false);

        store.fail(StoreOp::Delete, true);
        assert!(matches!(
            manager.delete_reset_code(&code).await,
            Err(AuthError::ResetTokenDeletion(StoreError::Backend(_)))
        ));
        store.fail(StoreOp::Delete, false);

        // 删除失败时码仍然有效
        assert_eq!(manager.redeem_reset_code(&code).await.unwrap(), "u1");
    }
}
