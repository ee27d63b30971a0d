//! Per-connection handler: hello handshake, command loop, cleanup.
//!
//! Each accepted connection gets its own task running this handler:
//!
//!   1. First frame must be `hello` with a session token
//!   2. Token verified → `welcome`, outbound writer task started
//!   3. Loop: decode commands, dispatch, acknowledge
//!   4. On exit (close, error, idle timeout) a drop guard tears the
//!      connection down: queue removal, room departure, unregistration

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use shoalfire_protocol::{
    ClientCommand, Codec, ProtocolError, RoomId, ServerEvent, UserId,
};
use shoalfire_room::RoomError;
use shoalfire_session::{AuthClaims, Authenticator};
use shoalfire_transport::{Connection, WebSocketConnection};

use crate::ArenaError;
use crate::server::ServerContext;

/// Drop guard that cleans up a connection's footprint when the handler
/// exits, even on panic. `Drop` is synchronous, so the async work runs
/// in a fire-and-forget task.
struct ConnectionGuard<A: Authenticator> {
    user_id: UserId,
    ctx: Arc<ServerContext<A>>,
}

impl<A: Authenticator> Drop for ConnectionGuard<A> {
    fn drop(&mut self) {
        let user_id = self.user_id;
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            ctx.core.router.unregister(user_id).await;
            if let Err(error) = ctx.matchmaker.cancel(user_id).await {
                debug!(%user_id, %error, "queue removal on disconnect failed");
            }
            if let Some(room_id) = ctx.core.router.room_of(user_id).await {
                if let Err(error) = ctx.api.leave_room(room_id, user_id).await {
                    debug!(%user_id, %error, "room departure on disconnect failed");
                }
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A: Authenticator>(
    conn: WebSocketConnection,
    ctx: Arc<ServerContext<A>>,
) -> Result<(), ArenaError> {
    let conn_id = conn.id();
    debug!(%conn_id, "handling new connection");

    // --- Step 1: hello handshake ---
    let claims = perform_handshake(&conn, &ctx).await?;
    let user_id = claims.user_id;
    info!(%conn_id, %user_id, nickname = %claims.profile.nickname, "connection authenticated");

    // --- Step 2: outbound channel + writer task ---
    let (sender, mut outbound) = mpsc::unbounded_channel();
    ctx.core.router.register(user_id, sender).await;

    let writer_conn = conn.clone();
    let codec = ctx.codec;
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let bytes = match codec.encode(&event) {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(%error, "failed to encode outbound event");
                    continue;
                }
            };
            if writer_conn.send(&bytes).await.is_err() {
                break;
            }
        }
    });

    ctx.core
        .router
        .send_to(
            user_id,
            ServerEvent::Welcome {
                user_id,
                nickname: claims.profile.nickname.clone(),
            },
        )
        .await;

    let _guard = ConnectionGuard {
        user_id,
        ctx: Arc::clone(&ctx),
    };

    // --- Step 3: command loop ---
    loop {
        let frame = match timeout(ctx.core.config.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                info!(%user_id, "connection closed cleanly");
                break;
            }
            Ok(Err(error)) => {
                debug!(%user_id, %error, "recv error");
                break;
            }
            Err(_) => {
                info!(%user_id, "connection idle timeout");
                break;
            }
        };

        let command: ClientCommand = match ctx.codec.decode(&frame) {
            Ok(command) => command,
            Err(error) => {
                debug!(%user_id, %error, "undecodable frame");
                ctx.core
                    .router
                    .send_to(
                        user_id,
                        ServerEvent::fail("bad_request", "could not decode command"),
                    )
                    .await;
                continue;
            }
        };

        // Heartbeat and status answer with their own payloads; every
        // other command gets an explicit ack.
        let wants_ack = !matches!(
            command,
            ClientCommand::Heartbeat { .. } | ClientCommand::Status
        );
        match dispatch(&ctx, &claims, command).await {
            Ok(()) => {
                if wants_ack {
                    ctx.core.router.send_to(user_id, ServerEvent::ok()).await;
                }
            }
            Err(error) => {
                debug!(%user_id, %error, "command failed");
                ctx.core
                    .router
                    .send_to(
                        user_id,
                        ServerEvent::fail(error.code(), error.to_string()),
                    )
                    .await;
            }
        }
    }

    // _guard drops here → disconnect cleanup fires.
    writer.abort();
    Ok(())
}

/// Receives and validates the `hello` frame, returning the verified
/// identity.
async fn perform_handshake<A: Authenticator>(
    conn: &WebSocketConnection,
    ctx: &Arc<ServerContext<A>>,
) -> Result<AuthClaims, ArenaError> {
    let frame = match timeout(ctx.core.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before hello".into(),
            )
            .into());
        }
        Ok(Err(error)) => return Err(error.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("hello timed out".into()).into());
        }
    };

    let command: ClientCommand = ctx.codec.decode(&frame)?;
    let ClientCommand::Hello { token } = command else {
        send_direct(
            conn,
            &ctx.codec,
            ServerEvent::fail("unauthorized", "first command must be hello"),
        )
        .await?;
        return Err(
            ProtocolError::InvalidMessage("first command must be hello".into()).into(),
        );
    };

    match ctx.auth.authenticate(&token).await {
        Ok(claims) => Ok(claims),
        Err(error) => {
            send_direct(
                conn,
                &ctx.codec,
                ServerEvent::fail("unauthorized", "invalid session token"),
            )
            .await?;
            Err(error.into())
        }
    }
}

/// Routes one authenticated command.
async fn dispatch<A: Authenticator>(
    ctx: &Arc<ServerContext<A>>,
    claims: &AuthClaims,
    command: ClientCommand,
) -> Result<(), ArenaError> {
    let user_id = claims.user_id;
    match command {
        ClientCommand::Hello { .. } => {
            debug!(%user_id, "redundant hello ignored");
            Ok(())
        }

        ClientCommand::JoinRoom { room_id } => {
            let room = ctx.core.registry.lock().await.find_by_id(room_id)?;
            if !room.contains(user_id) {
                return Err(RoomError::UserNotInRoom(user_id, room_id).into());
            }
            ctx.core.router.attach_room(user_id, room_id).await;
            ctx.core
                .router
                .broadcast_except(
                    room_id,
                    user_id,
                    ServerEvent::UserJoined {
                        user_id,
                        nickname: claims.profile.nickname.clone(),
                    },
                )
                .await;
            ctx.core
                .router
                .send_to(user_id, ServerEvent::RoomUpdated { room })
                .await;
            ctx.api.arm_countdown_if_due(room_id).await;
            Ok(())
        }

        ClientCommand::LeaveRoom => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.api.leave_room(room_id, user_id).await?;
            Ok(())
        }

        ClientCommand::SetReady { is_ready } => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.api.set_ready(room_id, user_id, is_ready).await?;
            Ok(())
        }

        ClientCommand::StartGame => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.api.start_game(room_id, user_id).await?;
            Ok(())
        }

        ClientCommand::ReadyForNextGame => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.api.ready_for_next_game(room_id, user_id).await?;
            Ok(())
        }

        ClientCommand::GameEvent { event } => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.games
                .handle_game_event(room_id, user_id, claims.profile.nickname.clone(), event)
                .await;
            Ok(())
        }

        ClientCommand::UpdateScore { delta } => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.games.update_player_score(room_id, user_id, delta).await
        }

        ClientCommand::PlayerInit { weapon_type } => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.games.player_init(room_id, user_id, weapon_type).await
        }

        ClientCommand::Shoot { bullet } => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.core
                .router
                .broadcast_except(room_id, user_id, ServerEvent::Shot { user_id, bullet })
                .await;
            Ok(())
        }

        // Host-authority commands: the host client runs the fish/bullet
        // simulation, everyone else only hears the results.
        ClientCommand::SpawnFish { fishes } => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.games.ensure_host(room_id, user_id).await?;
            ctx.core
                .router
                .broadcast_except(room_id, user_id, ServerEvent::FishSpawned { fishes })
                .await;
            Ok(())
        }

        ClientCommand::UpdateFishBehavior { fishes } => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.games.ensure_host(room_id, user_id).await?;
            ctx.core
                .router
                .broadcast_except(
                    room_id,
                    user_id,
                    ServerEvent::FishBehaviorUpdated { fishes },
                )
                .await;
            Ok(())
        }

        ClientCommand::BulletCollision { bullets } => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.games.ensure_host(room_id, user_id).await?;
            ctx.core
                .router
                .broadcast_except(room_id, user_id, ServerEvent::BulletCollided { bullets })
                .await;
            Ok(())
        }

        ClientCommand::FishCollision { collisions } => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.games.ensure_host(room_id, user_id).await?;
            ctx.core
                .router
                .broadcast_except(
                    room_id,
                    user_id,
                    ServerEvent::FishCollided { collisions },
                )
                .await;
            Ok(())
        }

        ClientCommand::CancelMatch => {
            ctx.matchmaker.cancel(user_id).await?;
            Ok(())
        }

        ClientCommand::EndGame => {
            let room_id = current_room(ctx, user_id).await?;
            ctx.games.manual_end_game(room_id, user_id).await
        }

        ClientCommand::Heartbeat { client_time } => {
            ctx.core
                .router
                .send_to(
                    user_id,
                    ServerEvent::HeartbeatAck {
                        client_time,
                        server_time: now_millis(),
                    },
                )
                .await;
            Ok(())
        }

        ClientCommand::Status => {
            let room_id = ctx.core.router.room_of(user_id).await;
            let queued = match ctx.matchmaker.is_queued(user_id).await {
                Ok(queued) => queued,
                Err(error) => {
                    debug!(%user_id, %error, "queue lookup failed for status");
                    false
                }
            };
            ctx.core
                .router
                .send_to(
                    user_id,
                    ServerEvent::StatusReport {
                        user_id,
                        room_id,
                        queued,
                        server_time: now_millis(),
                    },
                )
                .await;
            Ok(())
        }
    }
}

async fn current_room<A: Authenticator>(
    ctx: &Arc<ServerContext<A>>,
    user_id: UserId,
) -> Result<RoomId, ArenaError> {
    ctx.core
        .router
        .room_of(user_id)
        .await
        .ok_or(ArenaError::NotInRoom)
}

/// Sends an event on the raw connection, bypassing the router. Only for
/// the pre-registration handshake phase.
async fn send_direct(
    conn: &WebSocketConnection,
    codec: &shoalfire_protocol::JsonCodec,
    event: ServerEvent,
) -> Result<(), ArenaError> {
    let bytes = codec.encode(&event)?;
    conn.send(&bytes).await.map_err(ArenaError::Transport)
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
