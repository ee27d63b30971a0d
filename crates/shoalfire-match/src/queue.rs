//! The matchmaking queue: an ordered waiting list of unmatched players.
//!
//! The queue lives in the key/value store as a list of JSON entries so
//! it survives this process and is visible to sibling processes. FIFO
//! order is the fairness guarantee: `enqueue` appends, batches come off
//! the front, and cancelled matches put confirmed players back at the
//! front so they keep their wait priority.
//!
//! All mutations are serialized by an in-process mutex; the batch
//! removal additionally takes the `matchmaking:batch` distributed lock
//! so two batcher ticks (in this process or another) can never match the
//! same player twice. Removal happens before any room is formed — a
//! crash mid-batch loses one match attempt, never duplicates one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use shoalfire_protocol::{Profile, UserId};
use shoalfire_store::KvStore;

use crate::MatchError;

/// Key of the queue list in the key/value store.
const QUEUE_KEY: &str = "matchmaking:queue";
/// Key of the distributed lock guarding batch removal.
const BATCH_LOCK_KEY: &str = "matchmaking:batch";
/// How long a batch lock may be held before it expires.
const BATCH_LOCK_TTL: Duration = Duration::from_secs(5);

/// One queued, unmatched player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingPlayer {
    pub user_id: UserId,
    pub nickname: String,
    pub avatar_url: String,
    pub queued_at: DateTime<Utc>,
}

impl MatchingPlayer {
    /// Builds a queue entry stamped with the current time.
    pub fn new(user_id: UserId, profile: &Profile) -> Self {
        Self {
            user_id,
            nickname: profile.nickname.clone(),
            avatar_url: profile.avatar_url.clone(),
            queued_at: Utc::now(),
        }
    }
}

/// The shared FIFO waiting list.
pub struct MatchQueue {
    kv: Arc<dyn KvStore>,
    /// Serializes every queue mutation within this process.
    guard: Mutex<()>,
    /// Lock owner identity for the batch lock; unique per process.
    owner: String,
}

impl MatchQueue {
    /// Creates a queue over the given store.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            guard: Mutex::new(()),
            owner: format!("matcher:{}", uuid::Uuid::new_v4()),
        }
    }

    /// Appends a player to the queue. Idempotent: a user already queued
    /// is left where they are, and `false` is returned.
    pub async fn enqueue(&self, player: MatchingPlayer) -> Result<bool, MatchError> {
        let _guard = self.guard.lock().await;
        let queued = self.read_all().await?;
        if queued.iter().any(|p| p.user_id == player.user_id) {
            return Ok(false);
        }
        self.kv
            .rpush(QUEUE_KEY, &serde_json::to_string(&player)?)
            .await?;
        debug!(user = %player.user_id, "player queued for matchmaking");
        Ok(true)
    }

    /// Puts players back at the front of the queue, preserving their
    /// relative order. Used when a formed match is cancelled so the
    /// confirmed players keep their wait priority.
    pub async fn enqueue_front(&self, players: &[MatchingPlayer]) -> Result<(), MatchError> {
        let _guard = self.guard.lock().await;
        for player in players.iter().rev() {
            self.kv
                .lpush(QUEUE_KEY, &serde_json::to_string(player)?)
                .await?;
        }
        Ok(())
    }

    /// Removes a user from the queue. Idempotent; returns whether they
    /// were present.
    pub async fn dequeue(&self, user_id: UserId) -> Result<bool, MatchError> {
        let _guard = self.guard.lock().await;
        let queued = self.read_all().await?;
        if !queued.iter().any(|p| p.user_id == user_id) {
            return Ok(false);
        }
        let remaining: Vec<&MatchingPlayer> =
            queued.iter().filter(|p| p.user_id != user_id).collect();
        self.rewrite(&remaining).await?;
        debug!(user = %user_id, "player left matchmaking queue");
        Ok(true)
    }

    /// The queue contents in FIFO order.
    pub async fn players(&self) -> Result<Vec<MatchingPlayer>, MatchError> {
        let _guard = self.guard.lock().await;
        self.read_all().await
    }

    /// Queue length.
    pub async fn len(&self) -> Result<usize, MatchError> {
        Ok(self.players().await?.len())
    }

    /// Returns `true` if no one is waiting.
    pub async fn is_empty(&self) -> Result<bool, MatchError> {
        Ok(self.len().await? == 0)
    }

    /// Returns `true` if the user is queued.
    pub async fn contains(&self, user_id: UserId) -> Result<bool, MatchError> {
        Ok(self
            .players()
            .await?
            .iter()
            .any(|p| p.user_id == user_id))
    }

    /// Atomically removes and returns the `size` oldest players, or
    /// `None` if fewer are waiting (or another batcher holds the lock).
    pub async fn take_batch(&self, size: usize) -> Result<Option<Vec<MatchingPlayer>>, MatchError> {
        let _guard = self.guard.lock().await;

        if !self
            .kv
            .acquire_lock(BATCH_LOCK_KEY, &self.owner, BATCH_LOCK_TTL)
            .await?
        {
            debug!("batch lock held elsewhere, skipping this tick");
            return Ok(None);
        }

        let result = self.take_batch_locked(size).await;
        self.kv.release_lock(BATCH_LOCK_KEY, &self.owner).await?;
        result
    }

    async fn take_batch_locked(
        &self,
        size: usize,
    ) -> Result<Option<Vec<MatchingPlayer>>, MatchError> {
        let queued = self.read_all().await?;
        if queued.len() < size || size == 0 {
            return Ok(None);
        }
        let batch = queued[..size].to_vec();
        let remaining: Vec<&MatchingPlayer> = queued[size..].iter().collect();
        // Remove first, process later: a crash here loses one match
        // attempt instead of matching someone twice.
        self.rewrite(&remaining).await?;
        Ok(Some(batch))
    }

    /// Reads and decodes the whole list. Entries that fail to decode are
    /// dropped with a warning so one corrupt record cannot wedge the
    /// matcher.
    async fn read_all(&self) -> Result<Vec<MatchingPlayer>, MatchError> {
        let raw = self.kv.lrange(QUEUE_KEY, 0, -1).await?;
        let mut players = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str::<MatchingPlayer>(&entry) {
                Ok(player) => players.push(player),
                Err(error) => {
                    warn!(%error, "dropping corrupt matchmaking entry");
                }
            }
        }
        Ok(players)
    }

    async fn rewrite(&self, players: &[&MatchingPlayer]) -> Result<(), MatchError> {
        self.kv.del(QUEUE_KEY).await?;
        for player in players {
            self.kv
                .rpush(QUEUE_KEY, &serde_json::to_string(player)?)
                .await?;
        }
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shoalfire_store::MemoryStore;

    fn queue() -> MatchQueue {
        MatchQueue::new(Arc::new(MemoryStore::new()))
    }

    fn player(nickname: &str) -> MatchingPlayer {
        MatchingPlayer::new(
            UserId::new(),
            &Profile {
                nickname: nickname.into(),
                avatar_url: String::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_enqueue_is_fifo() {
        let q = queue();
        let (a, b, c) = (player("a"), player("b"), player("c"));
        q.enqueue(a.clone()).await.unwrap();
        q.enqueue(b.clone()).await.unwrap();
        q.enqueue(c.clone()).await.unwrap();

        let order: Vec<UserId> = q
            .players()
            .await
            .unwrap()
            .iter()
            .map(|p| p.user_id)
            .collect();
        assert_eq!(order, vec![a.user_id, b.user_id, c.user_id]);
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_per_user() {
        let q = queue();
        let p = player("a");
        assert!(q.enqueue(p.clone()).await.unwrap());
        assert!(!q.enqueue(p.clone()).await.unwrap());
        assert_eq!(q.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dequeue_removes_only_target() {
        let q = queue();
        let (a, b) = (player("a"), player("b"));
        q.enqueue(a.clone()).await.unwrap();
        q.enqueue(b.clone()).await.unwrap();

        assert!(q.dequeue(a.user_id).await.unwrap());
        assert!(!q.dequeue(a.user_id).await.unwrap());

        let remaining = q.players().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, b.user_id);
    }

    #[tokio::test]
    async fn test_take_batch_returns_oldest_and_drains() {
        let q = queue();
        let players: Vec<MatchingPlayer> =
            (0..5).map(|i| player(&format!("p{i}"))).collect();
        for p in &players {
            q.enqueue(p.clone()).await.unwrap();
        }

        let batch = q.take_batch(4).await.unwrap().expect("enough players");
        let batch_ids: Vec<UserId> = batch.iter().map(|p| p.user_id).collect();
        let expected: Vec<UserId> = players[..4].iter().map(|p| p.user_id).collect();
        assert_eq!(batch_ids, expected);

        // The fifth player is still waiting, now at the front.
        let rest = q.players().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].user_id, players[4].user_id);
    }

    #[tokio::test]
    async fn test_take_batch_needs_enough_players() {
        let q = queue();
        q.enqueue(player("a")).await.unwrap();
        assert!(q.take_batch(4).await.unwrap().is_none());
        assert_eq!(q.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_take_batch_skips_when_lock_held() {
        let kv = Arc::new(MemoryStore::new());
        let q = MatchQueue::new(kv.clone());
        for i in 0..4 {
            q.enqueue(player(&format!("p{i}"))).await.unwrap();
        }

        kv.acquire_lock("matchmaking:batch", "rival", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(q.take_batch(4).await.unwrap().is_none());
        // Nobody was removed.
        assert_eq!(q.len().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_batchers_never_double_match() {
        // Two queues over the same store stand in for two processes.
        let kv = Arc::new(MemoryStore::new());
        let q1 = Arc::new(MatchQueue::new(kv.clone()));
        let q2 = Arc::new(MatchQueue::new(kv));
        for i in 0..4 {
            q1.enqueue(player(&format!("p{i}"))).await.unwrap();
        }

        let (r1, r2) = tokio::join!(q1.take_batch(4), q2.take_batch(4));
        let batches: Vec<_> = [r1.unwrap(), r2.unwrap()]
            .into_iter()
            .flatten()
            .collect();
        // Exactly one tick wins the race.
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 4);
        assert!(q1.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_enqueue_front_preserves_relative_order() {
        let q = queue();
        let tail = player("tail");
        q.enqueue(tail.clone()).await.unwrap();

        let (a, b) = (player("a"), player("b"));
        q.enqueue_front(&[a.clone(), b.clone()]).await.unwrap();

        let order: Vec<UserId> = q
            .players()
            .await
            .unwrap()
            .iter()
            .map(|p| p.user_id)
            .collect();
        assert_eq!(order, vec![a.user_id, b.user_id, tail.user_id]);
    }

    #[tokio::test]
    async fn test_corrupt_entries_are_dropped() {
        let kv = Arc::new(MemoryStore::new());
        kv.rpush("matchmaking:queue", "{not json").await.unwrap();
        let q = MatchQueue::new(kv);
        let good = player("a");
        q.enqueue(good.clone()).await.unwrap();

        let players = q.players().await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].user_id, good.user_id);
    }
}
