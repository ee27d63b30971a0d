//! Shared server state.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use shoalfire_protocol::RoomId;
use shoalfire_room::RoomRegistry;
use shoalfire_session::Router;
use shoalfire_store::{KvStore, RecordStore, StatsStore};
use shoalfire_timer::{TimerEngine, TimerEvent};

use crate::ServerConfig;

/// Everything the server's tasks share: the registry behind its mutex,
/// the connection router, the timer engine, and the store handles.
///
/// The registry mutex is the linearization point for room mutation;
/// handlers, timers, the matchmaker, and the sweep all take it before
/// touching a room.
pub struct ArenaCore {
    pub config: ServerConfig,
    pub kv: Arc<dyn KvStore>,
    pub registry: Mutex<RoomRegistry>,
    pub router: Router,
    pub timers: TimerEngine<RoomId>,
    pub records: Arc<dyn RecordStore>,
    pub stats: Arc<dyn StatsStore>,
}

impl ArenaCore {
    /// Builds the core and hands back the timer event stream for the
    /// driver task.
    pub fn new(
        config: ServerConfig,
        kv: Arc<dyn KvStore>,
        records: Arc<dyn RecordStore>,
        stats: Arc<dyn StatsStore>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TimerEvent<RoomId>>) {
        let (timers, timer_events) = TimerEngine::new();
        let registry = RoomRegistry::new(config.room.clone(), kv.clone());
        let core = Arc::new(Self {
            config,
            kv,
            registry: Mutex::new(registry),
            router: Router::new(),
            timers,
            records,
            stats,
        });
        (core, timer_events)
    }
}
