//! Blob store for large intermediate scan outputs.
//!
//! Workflow steps pass references (prefixed UUID keys), never payloads, so
//! enumeration output size does not bloat workflow state. Redis backs the
//! production store; [`MemoryBlobStore`] satisfies the same contract for
//! tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::error::{Error, Result};

/// Key/value store for scan blobs.
///
/// Guarantees:
/// - `put` returns a fresh `{prefix}-{uuid}` key; existing blobs are never
///   overwritten.
/// - `get` of an unknown key fails with `BadInput` (a dangling reference is
///   a caller bug, not a transient condition).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under a new prefixed key and return the key.
    async fn put(&self, prefix: &str, data: &str) -> Result<String>;

    /// Fetch a blob by key.
    async fn get(&self, key: &str) -> Result<String>;
}

fn new_key(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

/// Redis-backed blob store.
pub struct RedisBlobStore {
    client: redis::Client,
}

impl RedisBlobStore {
    /// Build a client from the configuration. The connection itself is
    /// established lazily per operation.
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url())
            .map_err(|e| Error::BadInput(format!("invalid redis config: {e}")))?;
        Ok(RedisBlobStore { client })
    }
}

#[async_trait]
impl BlobStore for RedisBlobStore {
    async fn put(&self, prefix: &str, data: &str) -> Result<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = new_key(prefix);
        conn.set::<_, _, ()>(&key, data).await?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        value.ok_or_else(|| Error::BadInput(format!("blob not found: {key}")))
    }
}

/// In-memory blob store for tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob under an explicit key (test setup helper).
    pub fn insert(&self, key: &str, data: &str) {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_string());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, prefix: &str, data: &str) -> Result<String> {
        let key = new_key(prefix);
        self.blobs
            .lock()
            .unwrap()
            .insert(key.clone(), data.to_string());
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<String> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::BadInput(format!("blob not found: {key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryBlobStore::new();
        let key = store.put("subfinder", "a.example.com\n").await.unwrap();
        assert!(key.starts_with("subfinder-"));
        assert_eq!(store.get(&key).await.unwrap(), "a.example.com\n");
    }

    #[tokio::test]
    async fn test_keys_are_unique_per_put() {
        let store = MemoryBlobStore::new();
        let first = store.put("scan", "x").await.unwrap();
        let second = store.put("scan", "x").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_missing_key_is_bad_input() {
        let store = MemoryBlobStore::new();
        let err = store.get("scan-does-not-exist").await.unwrap_err();
        assert_eq!(err.kind(), "BadInput");
    }
}
