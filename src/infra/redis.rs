// RedisStore - Redis 键值存储实现
// 基于 bb8-redis 连接池

use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RedisConfig;
use crate::error::StoreError;
use crate::infra::kv_store::{escape_glob, KvStore};

/// SCAN 每批返回数量的提示值
const SCAN_COUNT: usize = 200;

/// Redis 存储（基于连接池）
pub struct RedisStore {
    pool: Arc<Pool<RedisConnectionManager>>,
    /// 单条 Redis 命令的执行超时
    command_timeout: Duration,
    /// 应用前缀
    prefix: String,
}

impl RedisStore {
    /// 创建新的 Redis 存储（从 RedisConfig 配置）
    pub async fn new(config: &RedisConfig, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let manager = RedisConnectionManager::new(config.url.clone()).map_err(|e| {
            StoreError::Backend(format!("Failed to create Redis manager: {}", e))
        })?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(config.connection_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .build(manager)
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create Redis pool: {}", e)))?;

        let store = Self {
            pool: Arc::new(pool),
            command_timeout: config.command_timeout(),
            prefix: prefix.into(),
        };

        // 测试连接
        store.ping().await?;

        tracing::info!(
            "✅ Redis 连接池已创建 (pool_size={}, min_idle={}, conn_timeout={}s, cmd_timeout={}ms, idle_timeout={}s, prefix={:?})",
            config.pool_size,
            config.min_idle,
            config.connection_timeout_secs,
            config.command_timeout_ms,
            config.idle_timeout_secs,
            store.prefix,
        );

        Ok(store)
    }

    /// 获取连接池状态（活跃连接数、空闲连接数）
    pub fn pool_state(&self) -> bb8::State {
        self.pool.state()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// 从连接池获取连接
    async fn get_conn(
        &self,
    ) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to get Redis connection: {}", e)))
    }

    /// 执行带超时的 Redis 操作
    async fn with_timeout<F, T>(&self, op: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.command_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.command_timeout.as_millis()))?
    }
}

#[async_trait]
impl KvStore for RedisStore {
    /// SET key value EX seconds
    async fn set_one(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        // EX 以秒为单位，不足一秒按一秒计
        let seconds = ttl.as_secs().max(1);
        let key = self.full_key(key);
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            conn.set_ex::<_, _, ()>(&key, value, seconds)
                .await
                .map_err(|e| StoreError::Backend(format!("Redis SETEX failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    /// GET key
    async fn get_one(&self, key: &str) -> Result<String, StoreError> {
        let key = self.full_key(key);
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let result: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| StoreError::Backend(format!("Redis GET failed: {}", e)))?;
            result.ok_or(StoreError::NotFound)
        })
        .await
    }

    /// DEL key
    async fn delete_one(&self, key: &str) -> Result<(), StoreError> {
        let key = self.full_key(key);
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            conn.del::<_, ()>(&key)
                .await
                .map_err(|e| StoreError::Backend(format!("Redis DEL failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    /// SCAN cursor MATCH pattern COUNT n，直到游标归零
    ///
    /// 超时按每次 SCAN 往返计算，键空间再大也不会整体超时。
    async fn find_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let full_pattern = format!("{}{}", escape_glob(&self.prefix), pattern);
        let mut conn = self.with_timeout(self.get_conn()).await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT);
            let (next, batch): (u64, Vec<String>) = self
                .with_timeout(async {
                    scan.query_async::<(u64, Vec<String>)>(&mut *conn)
                        .await
                        .map_err(|e| StoreError::Backend(format!("Redis SCAN failed: {}", e)))
                })
                .await?;

            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string)),
            );

            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN 可能重复返回同一个键
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// PING
    async fn ping(&self) -> Result<(), StoreError> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|e| StoreError::Backend(format!("Redis ping failed: {}", e)))?;
            Ok(())
        })
        .await
    }
}
