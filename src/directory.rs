//! 用户目录
//!
//! 会话核心只通过这个窄接口接触用户数据：按标识/邮箱查找、校验和修改密码。
//! 持久化和密码哈希算法都是实现方的事情。

use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::session_key::check_identity;
use crate::error::{AuthError, Result};

/// 目录中的用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    /// 不透明的用户标识（会话键的后缀）
    pub identity: String,
    pub email: String,
}

/// 用户目录接口
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<DirectoryUser>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<DirectoryUser>>;

    /// 用户不存在时返回 `Ok(false)`
    async fn verify_password(&self, identity: &str, password: &str) -> Result<bool>;

    async fn update_password(&self, identity: &str, new_password: &str) -> Result<()>;

    async fn update_email(&self, identity: &str, new_email: &str) -> Result<()>;
}

struct UserRecord {
    email: String,
    password_hash: String,
}

/// 内存用户目录（测试和 memory 后端使用，bcrypt 存储密码）
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserRecord>,
    /// email -> identity
    emails: DashMap<String, String>,
    cost: u32,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::with_cost(DEFAULT_COST)
    }

    /// 指定 bcrypt 成本（测试里用最小值 4）
    pub fn with_cost(cost: u32) -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            cost,
        }
    }

    /// 添加用户，邮箱已被占用时返回错误
    pub fn insert(&self, identity: &str, email: &str, password: &str) -> Result<()> {
        check_identity(identity)
            .map_err(|_| AuthError::Directory(format!("用户标识不合法: {:?}", identity)))?;
        let email = normalize_email(email);
        if let Some(owner) = self.emails.get(&email) {
            if owner.value() != identity {
                return Err(AuthError::Directory(format!("邮箱已被占用: {}", email)));
            }
        }

        let password_hash = self.hash(password)?;
        if let Some(old) = self.users.insert(
            identity.to_string(),
            UserRecord {
                email: email.clone(),
                password_hash,
            },
        ) {
            self.emails.remove(&old.email);
        }
        self.emails.insert(email, identity.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn hash(&self, password: &str) -> Result<String> {
        hash(password, self.cost).map_err(|e| AuthError::Directory(format!("密码加密失败: {}", e)))
    }
}

impl Default for InMemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<DirectoryUser>> {
        Ok(self.users.get(identity).map(|record| DirectoryUser {
            identity: identity.to_string(),
            email: record.email.clone(),
        }))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<DirectoryUser>> {
        let email = normalize_email(email);
        Ok(self.emails.get(&email).map(|identity| DirectoryUser {
            identity: identity.value().clone(),
            email,
        }))
    }

    async fn verify_password(&self, identity: &str, password: &str) -> Result<bool> {
        let Some(record) = self.users.get(identity) else {
            return Ok(false);
        };
        verify(password, &record.password_hash)
            .map_err(|e| AuthError::Directory(format!("密码验证失败: {}", e)))
    }

    async fn update_password(&self, identity: &str, new_password: &str) -> Result<()> {
        let password_hash = self.hash(new_password)?;
        let mut record = self
            .users
            .get_mut(identity)
            .ok_or_else(|| AuthError::UserNotFound(identity.to_string()))?;
        record.password_hash = password_hash;
        debug!(identity = %identity, "密码已更新");
        Ok(())
    }

    async fn update_email(&self, identity: &str, new_email: &str) -> Result<()> {
        let new_email = normalize_email(new_email);
        if let Some(owner) = self.emails.get(&new_email) {
            if owner.value() != identity {
                return Err(AuthError::Directory(format!("邮箱已被占用: {}", new_email)));
            }
        }

        let old_email = {
            let mut record = self
                .users
                .get_mut(identity)
                .ok_or_else(|| AuthError::UserNotFound(identity.to_string()))?;
            std::mem::replace(&mut record.email, new_email.clone())
        };
        self.emails.remove(&old_email);
        self.emails.insert(new_email, identity.to_string());
        Ok(())
    }
}
