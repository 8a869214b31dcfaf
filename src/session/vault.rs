use std::{
    collections::HashMap,
    sync::RwLock,
};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Plain string key-value storage for session records. The volatile
/// vault mirrors tab-scoped storage (lost across external redirects),
/// the durable one cross-tab storage that survives them.
#[async_trait]
pub trait SessionVault: Send + Sync {
    async fn store(&self, key: &str, value: &str) -> Result<(), VaultError>;
    async fn load(&self, key: &str) -> Result<Option<String>, VaultError>;
    async fn delete(&self, key: &str) -> Result<(), VaultError>;
}

/// Redis-backed durable vault.
#[derive(Clone)]
pub struct RedisVault {
    conn: ConnectionManager,
    ttl: Option<u64>,
}

impl RedisVault {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, ttl: None }
    }

    /// Set the time-to-live (TTL) for the stored data
    pub fn with_ttl(self, ttl: u64) -> Self {
        Self {
            ttl: Some(ttl),
            ..self
        }
    }
}

#[async_trait]
impl SessionVault for RedisVault {
    async fn store(&self, key: &str, value: &str) -> Result<(), VaultError> {
        let mut conn = self.conn.clone();
        if let Some(ttl) = self.ttl {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, VaultError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), VaultError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

/// In-memory vault; serves as the volatile store and as the test double
/// for the durable one.
#[derive(Default)]
pub struct MemoryVault {
    entries: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl SessionVault for MemoryVault {
    async fn store(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}
