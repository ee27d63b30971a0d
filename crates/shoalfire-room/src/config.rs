//! Room registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings governing room capacity and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Maximum players allowed in one room.
    pub max_players: usize,

    /// Player count at which a public room with everyone ready begins
    /// its countdown automatically.
    pub auto_start_threshold: usize,

    /// How long an abandoned room lives before the sweep collects it.
    pub room_ttl: Duration,

    /// Bound on random six-digit code generation retries. The keyspace
    /// is 900 000 codes, so hitting this bound in practice means the
    /// registry is effectively full.
    pub max_code_attempts: u32,

    /// TTL for the per-room lock taken during the matchable-room scan.
    pub match_lock_ttl: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            auto_start_threshold: 2,
            room_ttl: Duration::from_secs(3600),
            max_code_attempts: 64,
            match_lock_ttl: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment_values() {
        let config = RoomConfig::default();
        assert_eq!(config.max_players, 4);
        assert_eq!(config.auto_start_threshold, 2);
        assert_eq!(config.room_ttl, Duration::from_secs(3600));
        assert_eq!(config.match_lock_ttl, Duration::from_secs(5));
    }
}
