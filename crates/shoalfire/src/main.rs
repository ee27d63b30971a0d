//! Shoalfire server binary.

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use shoalfire::{ArenaError, ArenaServer, ServerConfig};
use shoalfire_session::TokenIssuer;

#[derive(Debug, Parser)]
#[command(name = "shoalfire-server", about = "Shoalfire arena game server")]
struct Args {
    /// Address to bind the WebSocket listener to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Maximum players per room.
    #[arg(long, default_value_t = 4)]
    max_players: usize,

    /// Player count at which public rooms auto-start.
    #[arg(long, default_value_t = 2)]
    auto_start_threshold: usize,

    /// Pre-game countdown in seconds.
    #[arg(long, default_value_t = 5)]
    countdown_secs: u32,

    /// Game duration in seconds.
    #[arg(long, default_value_t = 60)]
    game_duration_secs: u32,

    /// Matchmaking ready-confirmation deadline in seconds.
    #[arg(long, default_value_t = 10)]
    ready_timeout_secs: u32,
}

#[tokio::main]
async fn main() -> Result<(), ArenaError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let secret = std::env::var("SHOALFIRE_AUTH_SECRET").unwrap_or_else(|_| {
        warn!("SHOALFIRE_AUTH_SECRET not set, using development secret");
        "shoalfire-dev-secret".to_string()
    });

    let mut config = ServerConfig::default();
    config.bind_addr = args.bind;
    config.room.max_players = args.max_players;
    config.room.auto_start_threshold = args.auto_start_threshold;
    config.countdown_secs = args.countdown_secs;
    config.game_duration_secs = args.game_duration_secs;
    config.ready_timeout_secs = args.ready_timeout_secs;

    let server = ArenaServer::<TokenIssuer>::builder()
        .config(config)
        .build(TokenIssuer::new(&secret))
        .await?;
    server.run().await
}
