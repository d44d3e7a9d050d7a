// MemoryStore - 进程内键值存储
// 语义与 RedisStore 一致（前缀、TTL、glob 枚举），用于测试和本地开发

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::StoreError;
use crate::infra::kv_store::{escape_glob, glob_match, KvStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// 基于 DashMap 的内存存储，过期在读取时惰性清理
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    prefix: String,
}

impl MemoryStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            prefix: prefix.into(),
        }
    }

    /// 与另一个实例共享底层数据，但使用不同的前缀
    pub fn with_shared_prefix(&self, prefix: impl Into<String>) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            prefix: prefix.into(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// 未过期条目数（含其他前缀）
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 剩余存活时间，测试用
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(&self.full_key(key))
            .filter(|e| !e.is_expired(now))
            .map(|e| e.expires_at.saturating_duration_since(now))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_one(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            self.full_key(key),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_one(&self, key: &str) -> Result<String, StoreError> {
        let full_key = self.full_key(key);
        let now = Instant::now();

        let value = match self.entries.get(&full_key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => return Err(StoreError::NotFound),
        };

        match value {
            Some(v) => Ok(v),
            None => {
                self.entries.remove_if(&full_key, |_, e| e.is_expired(now));
                Err(StoreError::NotFound)
            }
        }
    }

    async fn delete_one(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(&self.full_key(key));
        Ok(())
    }

    async fn find_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let full_pattern = format!("{}{}", escape_glob(&self.prefix), pattern);
        let now = Instant::now();

        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now) && glob_match(&full_pattern, e.key()))
            .filter_map(|e| e.key().strip_prefix(&self.prefix).map(str::to_string))
            .collect();
        keys.sort();

        self.entries.retain(|_, e| !e.is_expired(now));
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
