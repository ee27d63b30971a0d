//! Persistence interfaces for game records and lifetime player stats.
//!
//! Both are write-behind collaborators of the session core: the game
//! controller emits into them at game end and never reads them on the
//! hot path.

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use shoalfire_protocol::{GameRecord, UserId};

use crate::StoreError;

/// Stores immutable results of finished games.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Persists a finished game's record.
    async fn insert(&self, record: &GameRecord) -> Result<(), StoreError>;

    /// Fetches a record by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<GameRecord>, StoreError>;

    /// Fetches the records a player participated in, newest first.
    async fn find_by_player(&self, user_id: UserId) -> Result<Vec<GameRecord>, StoreError>;
}

/// A player's lifetime aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub games_played: u64,
    pub total_score: i64,
    pub wins: u64,
}

/// Updates lifetime player statistics.
#[async_trait]
pub trait StatsStore: Send + Sync + 'static {
    /// Applies one finished game to a player's aggregates:
    /// games-played +1, score added, wins +1 iff `won`.
    async fn record_game(&self, user_id: UserId, score: i64, won: bool)
    -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// In-memory [`RecordStore`] for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryRecords {
    records: Mutex<Vec<GameRecord>>,
}

impl MemoryRecords {
    /// Creates an empty record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything stored, insertion order.
    pub async fn all(&self) -> Vec<GameRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn insert(&self, record: &GameRecord) -> Result<(), StoreError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<GameRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_by_player(&self, user_id: UserId) -> Result<Vec<GameRecord>, StoreError> {
        let records = self.records.lock().await;
        let mut found: Vec<GameRecord> = records
            .iter()
            .filter(|r| r.players.iter().any(|p| p.user_id == user_id))
            .cloned()
            .collect();
        found.reverse();
        Ok(found)
    }
}

/// In-memory [`StatsStore`] for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStats {
    stats: Mutex<std::collections::HashMap<UserId, PlayerStats>>,
}

impl MemoryStats {
    /// Creates an empty stats store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one player's aggregates.
    pub async fn stats(&self, user_id: UserId) -> PlayerStats {
        self.stats
            .lock()
            .await
            .get(&user_id)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl StatsStore for MemoryStats {
    async fn record_game(
        &self,
        user_id: UserId,
        score: i64,
        won: bool,
    ) -> Result<(), StoreError> {
        let mut stats = self.stats.lock().await;
        let entry = stats.entry(user_id).or_default();
        entry.games_played += 1;
        entry.total_score += score;
        if won {
            entry.wins += 1;
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
    use shoalfire_protocol::{PlayerResult, RoomId};

    fn record_for(players: &[(UserId, i64)]) -> GameRecord {
        let results: Vec<PlayerResult> = players
            .iter()
            .enumerate()
            .map(|(i, (id, score))| PlayerResult {
                user_id: *id,
                nickname: format!("p{i}"),
                score: *score,
                rank: i as u32 + 1,
                events: vec![],
            })
            .collect();
        GameRecord {
            id: Uuid::new_v4(),
            room_id: RoomId::new(),
            room_code: "123456".into(),
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            duration: 60,
            winner: results[0].clone(),
            players: results,
        }
    }

    #[tokio::test]
    async fn test_records_insert_and_find_by_id() {
        let store = MemoryRecords::new();
        let record = record_for(&[(UserId::new(), 10)]);
        store.insert(&record).await.unwrap();
        let found = store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(found, record);
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_records_find_by_player_newest_first() {
        let store = MemoryRecords::new();
        let player = UserId::new();
        let first = record_for(&[(player, 10)]);
        let second = record_for(&[(player, 20)]);
        let unrelated = record_for(&[(UserId::new(), 5)]);
        store.insert(&first).await.unwrap();
        store.insert(&unrelated).await.unwrap();
        store.insert(&second).await.unwrap();

        let found = store.find_by_player(player).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, second.id);
        assert_eq!(found[1].id, first.id);
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let store = MemoryStats::new();
        let player = UserId::new();
        store.record_game(player, 40, true).await.unwrap();
        store.record_game(player, 10, false).await.unwrap();
        let stats = store.stats(player).await;
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.total_score, 50);
        assert_eq!(stats.wins, 1);
    }

    #[tokio::test]
    async fn test_stats_default_for_unknown_player() {
        let store = MemoryStats::new();
        assert_eq!(store.stats(UserId::new()).await, PlayerStats::default());
    }
}
