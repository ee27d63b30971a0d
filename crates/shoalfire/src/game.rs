//! The game session controller.
//!
//! Orchestrates in-round behavior on top of the room registry and the
//! timer engine: countdown and game clocks, verbatim event fan-out,
//! score updates, host-authority checks, and game-end record emission.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use shoalfire_protocol::{
    GameEvent, GameEventWithUser, GameRecord, PlayerResult, RoomId, RoomStatus,
    ServerEvent, UserId,
};
use shoalfire_room::RoomError;
use shoalfire_timer::TimerKind;

use crate::{ArenaCore, ArenaError};

/// Drives game lifecycle for all rooms.
pub struct GameController {
    core: Arc<ArenaCore>,
    /// Per-room ordered log of in-round events; drained into the
    /// game record at game end.
    events: Mutex<HashMap<RoomId, Vec<GameEventWithUser>>>,
}

impl GameController {
    /// Creates a controller over the shared core.
    pub fn new(core: Arc<ArenaCore>) -> Self {
        Self {
            core,
            events: Mutex::new(HashMap::new()),
        }
    }

    /// Arms the pre-game countdown for a room that is in countdown
    /// state. A no-op otherwise, so racing callers are harmless.
    pub async fn start_countdown(&self, room_id: RoomId) {
        let status = self
            .core
            .registry
            .lock()
            .await
            .find_by_id(room_id)
            .map(|r| r.status);
        if !matches!(status, Ok(RoomStatus::Countdown)) {
            debug!(%room_id, "countdown not armed, room is not counting down");
            return;
        }
        self.core
            .timers
            .start(room_id, TimerKind::Countdown, self.core.config.countdown_secs)
            .await;
    }

    /// Arms the game clock.
    pub async fn start_game_timer(&self, room_id: RoomId) {
        self.core
            .timers
            .start(room_id, TimerKind::Game, self.core.config.game_duration_secs)
            .await;
    }

    /// Countdown reached zero: start the game with the host as actor and
    /// arm the game clock. On failure the room is told, and the timer
    /// loop carries on.
    pub async fn handle_countdown_elapsed(&self, room_id: RoomId) {
        let started = {
            let mut registry = self.core.registry.lock().await;
            match registry.find_by_id(room_id).map(|room| room.host_id) {
                Ok(host_id) => registry.start_game(room_id, host_id),
                Err(error) => Err(error),
            }
        };
        match started {
            Ok(room) => {
                self.core
                    .router
                    .broadcast(room_id, ServerEvent::RoomUpdated { room })
                    .await;
                self.core
                    .router
                    .broadcast(room_id, ServerEvent::GameStarted)
                    .await;
                self.start_game_timer(room_id).await;
            }
            Err(error) => {
                warn!(%room_id, %error, "countdown elapsed but game failed to start");
                self.core
                    .router
                    .broadcast(
                        room_id,
                        ServerEvent::Error {
                            code: error.code().to_string(),
                            message: "failed to start game".to_string(),
                        },
                    )
                    .await;
            }
        }
    }

    /// Fans a generic game event out to the room verbatim, with the
    /// acting user attached. Never touches score.
    pub async fn handle_game_event(
        &self,
        room_id: RoomId,
        user_id: UserId,
        nickname: String,
        event: GameEvent,
    ) {
        let with_user = GameEventWithUser {
            event,
            user_id,
            nickname,
        };
        self.events
            .lock()
            .await
            .entry(room_id)
            .or_default()
            .push(with_user.clone());
        self.core
            .router
            .broadcast(room_id, ServerEvent::GameEvent { game: with_user })
            .await;
    }

    /// Applies an additive score delta and broadcasts the updated
    /// player list.
    pub async fn update_player_score(
        &self,
        room_id: RoomId,
        user_id: UserId,
        delta: i64,
    ) -> Result<(), ArenaError> {
        let room = self
            .core
            .registry
            .lock()
            .await
            .update_player_score(room_id, user_id, delta)?;
        self.core
            .router
            .broadcast(
                room_id,
                ServerEvent::ScoreUpdated {
                    user_id,
                    delta,
                    players: room.players,
                },
            )
            .await;
        Ok(())
    }

    /// Records a player's weapon choice and announces it.
    pub async fn player_init(
        &self,
        room_id: RoomId,
        user_id: UserId,
        weapon_type: u32,
    ) -> Result<(), ArenaError> {
        self.core
            .registry
            .lock()
            .await
            .set_weapon(room_id, user_id, weapon_type)?;
        self.core
            .router
            .broadcast(
                room_id,
                ServerEvent::PlayerInit {
                    user_id,
                    weapon_type,
                },
            )
            .await;
        Ok(())
    }

    /// Ends the game: ranks players, persists the record, updates
    /// lifetime stats, and broadcasts the result set.
    ///
    /// Guarded to act only when the room is playing, so the game-clock
    /// expiry and a near-simultaneous manual end cannot both run it.
    pub async fn end_game(&self, room_id: RoomId) -> Result<(), ArenaError> {
        let room = {
            let mut registry = self.core.registry.lock().await;
            match registry.find_by_id(room_id) {
                Ok(room) if room.status == RoomStatus::Playing => {
                    registry.end_game(room_id)?
                }
                _ => return Ok(()),
            }
        };
        self.core.timers.cancel(&room_id, TimerKind::Game).await;

        let end_time = room.end_time.unwrap_or_else(Utc::now);
        let start_time = room.start_time.unwrap_or_else(|| {
            end_time
                - chrono::Duration::seconds(i64::from(self.core.config.game_duration_secs))
        });
        let duration = (end_time - start_time).num_seconds().max(0) as u64;

        let event_log = self
            .events
            .lock()
            .await
            .remove(&room_id)
            .unwrap_or_default();

        // Rank by descending score; the sort is stable, so ties keep
        // join order and every rank is unique.
        let mut results: Vec<PlayerResult> = room
            .players
            .iter()
            .map(|p| PlayerResult {
                user_id: p.user_id,
                nickname: p.nickname.clone(),
                score: p.score,
                rank: 0,
                events: event_log
                    .iter()
                    .filter(|e| e.user_id == p.user_id)
                    .cloned()
                    .collect(),
            })
            .collect();
        results.sort_by(|a, b| b.score.cmp(&a.score));
        for (index, result) in results.iter_mut().enumerate() {
            result.rank = index as u32 + 1;
        }
        let Some(winner) = results.first().cloned() else {
            return Ok(());
        };

        let record = GameRecord {
            id: Uuid::new_v4(),
            room_id,
            room_code: room.room_code.clone(),
            start_time,
            end_time,
            duration,
            players: results.clone(),
            winner: winner.clone(),
        };
        self.core.records.insert(&record).await?;
        for result in &results {
            self.core
                .stats
                .record_game(result.user_id, result.score, result.rank == 1)
                .await?;
        }

        self.core
            .router
            .broadcast(
                room_id,
                ServerEvent::GameEnded {
                    game_id: record.id,
                    duration,
                    player_results: results,
                    winner_id: winner.user_id,
                },
            )
            .await;
        Ok(())
    }

    /// Host-initiated early end: cancels the game clock, then runs the
    /// normal end-game path.
    pub async fn manual_end_game(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<(), ArenaError> {
        let host_id = self
            .core
            .registry
            .lock()
            .await
            .find_by_id(room_id)?
            .host_id;
        if host_id != user_id {
            return Err(RoomError::NotHost(user_id, room_id).into());
        }
        self.core.timers.cancel(&room_id, TimerKind::Game).await;
        self.end_game(room_id).await
    }

    /// Host-authority gate for simulation commands (fish spawns,
    /// behavior updates, collision confirmations).
    pub async fn ensure_host(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<(), ArenaError> {
        let host_id = self
            .core
            .registry
            .lock()
            .await
            .find_by_id(room_id)?
            .host_id;
        if host_id != user_id {
            return Err(ArenaError::OperationNotAllowed);
        }
        Ok(())
    }

    /// Drops a dissolved room's event log.
    pub async fn forget_room(&self, room_id: RoomId) {
        self.events.lock().await.remove(&room_id);
    }
}
