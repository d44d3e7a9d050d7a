// 基础设施层 - 键值存储适配

pub mod kv_store;
pub mod memory_store;
pub mod redis;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::config::{AuthConfig, StoreBackend};
use crate::error::StoreError;

pub use kv_store::{escape_glob, glob_match, KvStore};
pub use memory_store::MemoryStore;
pub use redis::RedisStore;

/// 按配置创建存储后端
pub async fn connect_store(config: &AuthConfig) -> Result<Arc<dyn KvStore>, StoreError> {
    match config.store.backend {
        StoreBackend::Redis => {
            let store = RedisStore::new(&config.store.redis, config.app_name.clone()).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("⚠️ 使用进程内存储，数据不会跨进程共享，仅用于开发和测试");
            Ok(Arc::new(MemoryStore::new(config.app_name.clone())))
        }
    }
}
