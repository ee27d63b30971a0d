//! `ArenaServer` builder, background loops, and the accept loop.
//!
//! This ties the layers together: transport → protocol → session →
//! rooms, plus the three background tasks that make the system tick —
//! the timer driver, the matchmaking batcher, and the TTL sweep.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use shoalfire_protocol::{JsonCodec, RoomId, ServerEvent};
use shoalfire_session::Authenticator;
use shoalfire_store::{
    KvStore, MemoryRecords, MemoryStats, MemoryStore, RecordStore, StatsStore,
};
use shoalfire_timer::{TimerEvent, TimerKind, TimerSignal};
use shoalfire_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{ArenaApi, ArenaCore, ArenaError, GameController, Matchmaker, ServerConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerContext<A: Authenticator> {
    pub(crate) core: Arc<ArenaCore>,
    pub(crate) games: Arc<GameController>,
    pub(crate) matchmaker: Arc<Matchmaker>,
    pub(crate) api: ArenaApi,
    pub(crate) auth: A,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting an arena server.
///
/// # Example
///
/// ```rust,ignore
/// let server = ArenaServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(TokenIssuer::new(secret))
///     .await?;
/// server.run().await
/// ```
pub struct ArenaServerBuilder {
    config: ServerConfig,
    kv: Option<Arc<dyn KvStore>>,
    records: Option<Arc<dyn RecordStore>>,
    stats: Option<Arc<dyn StatsStore>>,
}

impl ArenaServerBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            kv: None,
            records: None,
            stats: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Uses an external key/value + lock store instead of the in-memory
    /// default.
    pub fn kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Uses an external game-record store.
    pub fn records(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Uses an external player-stats store.
    pub fn stats(mut self, stats: Arc<dyn StatsStore>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Binds the transport and assembles the server.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<ArenaServer<A>, ArenaError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let kv = self.kv.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let records = self
            .records
            .unwrap_or_else(|| Arc::new(MemoryRecords::new()));
        let stats = self.stats.unwrap_or_else(|| Arc::new(MemoryStats::new()));

        let (core, timer_events) = ArenaCore::new(self.config, kv, records, stats);
        let games = Arc::new(GameController::new(Arc::clone(&core)));
        let matchmaker = Arc::new(Matchmaker::new(Arc::clone(&core)));
        let api = ArenaApi::new(
            Arc::clone(&core),
            Arc::clone(&games),
            Arc::clone(&matchmaker),
        );
        let ctx = Arc::new(ServerContext {
            core,
            games,
            matchmaker,
            api,
            auth,
            codec: JsonCodec,
        });

        Ok(ArenaServer {
            transport,
            ctx,
            timer_events,
        })
    }
}

impl Default for ArenaServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running arena server.
pub struct ArenaServer<A: Authenticator> {
    transport: WebSocketTransport,
    ctx: Arc<ServerContext<A>>,
    timer_events: mpsc::UnboundedReceiver<TimerEvent<RoomId>>,
}

impl<A: Authenticator> ArenaServer<A> {
    /// Creates a new builder.
    pub fn builder() -> ArenaServerBuilder {
        ArenaServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The synchronous request surface of this server.
    pub fn api(&self) -> ArenaApi {
        self.ctx.api.clone()
    }

    /// Runs the server: spawns the timer driver, the matchmaking
    /// batcher, and the TTL sweep, then accepts connections until the
    /// process terminates.
    pub async fn run(self) -> Result<(), ArenaError> {
        let ArenaServer {
            mut transport,
            ctx,
            timer_events,
        } = self;

        tokio::spawn(drive_timers(
            Arc::clone(&ctx.core),
            Arc::clone(&ctx.games),
            Arc::clone(&ctx.matchmaker),
            timer_events,
        ));
        tokio::spawn(match_loop(Arc::clone(&ctx.matchmaker)));
        tokio::spawn(sweep_loop(
            Arc::clone(&ctx.core),
            Arc::clone(&ctx.games),
            Arc::clone(&ctx.matchmaker),
        ));

        info!("Shoalfire server running");
        loop {
            match transport.accept().await {
                Ok(conn) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, ctx).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Consumes the timer event stream and maps each event onto room and
/// matchmaking behavior. One room's failure is logged and the loop
/// continues — a broken room must never halt the global clock.
pub async fn drive_timers(
    core: Arc<ArenaCore>,
    games: Arc<GameController>,
    matchmaker: Arc<Matchmaker>,
    mut events: mpsc::UnboundedReceiver<TimerEvent<RoomId>>,
) {
    while let Some(event) = events.recv().await {
        let room_id = event.key;
        match (event.kind, event.signal) {
            (TimerKind::Countdown, TimerSignal::Tick { remaining }) => {
                core.router
                    .broadcast(room_id, ServerEvent::CountdownTick { count: remaining })
                    .await;
            }
            (TimerKind::Countdown, TimerSignal::Elapsed) => {
                games.handle_countdown_elapsed(room_id).await;
            }
            (TimerKind::Game, TimerSignal::Tick { remaining }) => {
                core.router
                    .broadcast(
                        room_id,
                        ServerEvent::TimeTick {
                            remaining,
                            total: core.config.game_duration_secs,
                        },
                    )
                    .await;
            }
            (TimerKind::Game, TimerSignal::Elapsed) => {
                if let Err(error) = games.end_game(room_id).await {
                    warn!(%room_id, %error, "game-end processing failed");
                    core.router
                        .broadcast(
                            room_id,
                            ServerEvent::Error {
                                code: error.code().to_string(),
                                message: "game end processing failed".to_string(),
                            },
                        )
                        .await;
                }
            }
            (TimerKind::ReadyTimeout, TimerSignal::Tick { remaining }) => {
                matchmaker.broadcast_ready_tick(room_id, remaining).await;
            }
            (TimerKind::ReadyTimeout, TimerSignal::Elapsed) => {
                matchmaker.handle_ready_timeout(room_id).await;
            }
        }
    }
}

/// Drives the matchmaking batcher on its fixed tick.
async fn match_loop(matchmaker: Arc<Matchmaker>) {
    let mut ticker = tokio::time::interval(matchmaker.tick_interval());
    loop {
        ticker.tick().await;
        if let Err(error) = matchmaker.tick().await {
            warn!(%error, "matchmaking tick failed");
        }
    }
}

/// Collects expired rooms and tears down their timers and attachments.
async fn sweep_loop(
    core: Arc<ArenaCore>,
    games: Arc<GameController>,
    matchmaker: Arc<Matchmaker>,
) {
    let mut ticker = tokio::time::interval(core.config.sweep_interval);
    loop {
        ticker.tick().await;
        let expired = core.registry.lock().await.sweep_expired(Utc::now());
        for room_id in expired {
            core.timers.cancel_all(&room_id).await;
            core.router.clear_room(room_id).await;
            games.forget_room(room_id).await;
            matchmaker.forget(room_id).await;
        }
    }
}
