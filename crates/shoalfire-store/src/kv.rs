//! The key/value and distributed-lock interface.
//!
//! The backend is shared infrastructure (Redis in production); the core
//! only depends on this trait. Locks are owner-checked: release is a
//! compare-and-delete, so an actor can never free a lock that expired
//! and was re-acquired by someone else.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::StoreError;

/// Simple key/hash/list storage plus atomic lock acquire/release.
///
/// List operations follow Redis conventions: `lpush` prepends, `rpush`
/// appends, and `lrange` takes inclusive indices where negative values
/// count from the tail (`-1` is the last element).
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Sets a string value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Reads a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deletes a key of any type.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Sets one field of a hash.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Reads all fields of a hash. Missing keys yield an empty map.
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Prepends a value to a list.
    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Appends a value to a list.
    async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Reads an inclusive range of a list.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;

    /// Tries to acquire a lock for `owner`, expiring after `ttl`.
    /// Returns `false` if another live owner holds it.
    async fn acquire_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Releases a lock, but only if `owner` still holds it.
    /// Returns `true` if the lock was actually released.
    async fn release_lock(&self, key: &str, owner: &str) -> Result<bool, StoreError>;
}
