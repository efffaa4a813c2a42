//! Durable store boundary: a string key-value store with per-key expiry.
//!
//! The orchestration core only needs get and set-with-TTL; anything richer
//! (Redis, a SQL table) plugs in behind the same trait.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use webpilot_core::Result;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes the value and (re)arms its expiry.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
}

/// In-process store for single-node deployments and tests.
/// Expired entries are dropped lazily on read and swept on write.
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, deadline)) if *deadline > Instant::now() => {
                    return Ok(Some(value.clone()))
                }
                None => return Ok(None),
                _ => {}
            }
        }
        // Entry looked expired under the read lock. Recheck under the
        // write lock: a concurrent set may have refreshed it in between,
        // and that fresh value must not be deleted.
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, deadline)| *deadline > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }
}
