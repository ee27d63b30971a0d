//! Server configuration.

use std::time::Duration;

use shoalfire_room::RoomConfig;

/// Full configuration for an arena server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// Room capacity and lifecycle settings.
    pub room: RoomConfig,

    /// Pre-game countdown length in seconds.
    pub countdown_secs: u32,

    /// Game duration in seconds.
    pub game_duration_secs: u32,

    /// How long matched players have to confirm readiness.
    pub ready_timeout_secs: u32,

    /// Cadence of the matchmaking batcher.
    pub match_tick_interval: Duration,

    /// Cadence of the expired-room sweep.
    pub sweep_interval: Duration,

    /// How long a fresh connection has to send its `hello`.
    pub handshake_timeout: Duration,

    /// Idle cutoff for authenticated connections; heartbeats keep a
    /// connection alive past this.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room: RoomConfig::default(),
            countdown_secs: 5,
            game_duration_secs: 60,
            ready_timeout_secs: 10,
            match_tick_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.countdown_secs, 5);
        assert_eq!(config.game_duration_secs, 60);
        assert_eq!(config.ready_timeout_secs, 10);
        assert_eq!(config.match_tick_interval, Duration::from_secs(1));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }
}
