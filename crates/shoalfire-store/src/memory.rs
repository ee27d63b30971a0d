//! In-process [`KvStore`] implementation.
//!
//! Backs single-process deployments and tests. Lock semantics match the
//! external service: a lock entry carries its owner and a deadline, and
//! an expired entry counts as free.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{KvStore, StoreError};

struct LockEntry {
    owner: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
    locks: HashMap<String, LockEntry>,
}

/// An in-memory key/value and lock store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolves a Redis-style index (negative counts from the tail) to an
/// absolute offset, clamped into `0..=len`.
fn resolve_index(len: usize, idx: i64, clamp_end: bool) -> usize {
    let len = len as i64;
    let abs = if idx < 0 { len + idx } else { idx };
    let upper = if clamp_end { len - 1 } else { len };
    abs.clamp(0, upper.max(0)) as usize
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.strings.get(key).cloned())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.strings.remove(key);
        inner.hashes.remove(key);
        inner.lists.remove(key);
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        let Some(list) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };
        if list.is_empty() {
            return Ok(Vec::new());
        }
        let from = resolve_index(list.len(), start, false);
        let to = resolve_index(list.len(), stop, true);
        if from > to {
            return Ok(Vec::new());
        }
        Ok(list.iter().skip(from).take(to - from + 1).cloned().collect())
    }

    async fn acquire_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        if let Some(entry) = inner.locks.get(key) {
            if entry.expires_at > now {
                return Ok(false);
            }
        }
        inner.locks.insert(
            key.to_string(),
            LockEntry {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release_lock(&self, key: &str, owner: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.locks.get(key) {
            Some(entry) if entry.owner == owner && entry.expires_at > Instant::now() => {
                inner.locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
