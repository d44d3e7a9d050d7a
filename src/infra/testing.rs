// 测试用存储：包一层 MemoryStore，可以按操作注入失败

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::StoreError;
use crate::infra::kv_store::KvStore;
use crate::infra::memory_store::MemoryStore;

#[derive(Debug, Clone, Copy)]
pub(crate) enum StoreOp {
    Set,
    Get,
    Delete,
    Find,
    Ping,
}

#[derive(Debug)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    fail_set: AtomicBool,
    fail_get: AtomicBool,
    fail_delete: AtomicBool,
    fail_find: AtomicBool,
    fail_ping: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_set: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_find: AtomicBool::new(false),
            fail_ping: AtomicBool::new(false),
        }
    }

    pub(crate) fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub(crate) fn fail(&self, op: StoreOp, on: bool) {
        self.flag(op).store(on, Ordering::SeqCst);
    }

    fn flag(&self, op: StoreOp) -> &AtomicBool {
        match op {
            StoreOp::Set => &self.fail_set,
            StoreOp::Get => &self.fail_get,
            StoreOp::Delete => &self.fail_delete,
            StoreOp::Find => &self.fail_find,
            StoreOp::Ping => &self.fail_ping,
        }
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        if self.flag(op).load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn set_one(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check(StoreOp::Set)?;
        self.inner.set_one(key, value, ttl).await
    }

    async fn get_one(&self, key: &str) -> Result<String, StoreError> {
        self.check(StoreOp::Get)?;
        self.inner.get_one(key).await
    }

    async fn delete_one(&self, key: &str) -> Result<(), StoreError> {
        self.check(StoreOp::Delete)?;
        self.inner.delete_one(key).await
    }

    async fn find_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check(StoreOp::Find)?;
        self.inner.find_keys(pattern).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check(StoreOp::Ping)?;
        self.inner.ping().await
    }
}
