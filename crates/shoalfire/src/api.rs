//! The synchronous request surface.
//!
//! Everything a caller can do outside the real-time channel: create and
//! join rooms, toggle readiness, start games, browse the public lobby,
//! and request matchmaking. The connection handler routes its commands
//! through the same methods, so both surfaces share one orchestration
//! path and one error taxonomy.

use std::sync::Arc;

use shoalfire_protocol::{
    Profile, Room, RoomId, RoomStatus, RoomSummary, RoomType, SEAT_LAYOUTS,
    SeatLayout, ServerEvent, UserId,
};
use shoalfire_timer::TimerKind;

use crate::{ArenaCore, ArenaError, GameController, MatchOutcome, Matchmaker};

/// Facade over the room, game, and matchmaking orchestration.
#[derive(Clone)]
pub struct ArenaApi {
    core: Arc<ArenaCore>,
    games: Arc<GameController>,
    matchmaker: Arc<Matchmaker>,
}

impl ArenaApi {
    /// Assembles the facade from the shared components.
    pub fn new(
        core: Arc<ArenaCore>,
        games: Arc<GameController>,
        matchmaker: Arc<Matchmaker>,
    ) -> Self {
        Self {
            core,
            games,
            matchmaker,
        }
    }

    /// Creates a room with the caller as host.
    pub async fn create_room(
        &self,
        user_id: UserId,
        profile: &Profile,
        kind: RoomType,
    ) -> Result<Room, ArenaError> {
        let room = self
            .core
            .registry
            .lock()
            .await
            .create_room(user_id, profile, kind)?;
        self.core
            .router
            .send_to(user_id, ServerEvent::RoomCreated { room: room.clone() })
            .await;
        Ok(room)
    }

    /// Joins a room by its six-digit code and tells the room about it.
    pub async fn join_room(
        &self,
        user_id: UserId,
        profile: &Profile,
        room_code: &str,
    ) -> Result<Room, ArenaError> {
        let room = self
            .core
            .registry
            .lock()
            .await
            .join_room(user_id, profile, room_code)?;
        self.core
            .router
            .broadcast(
                room.id,
                ServerEvent::UserJoined {
                    user_id,
                    nickname: profile.nickname.clone(),
                },
            )
            .await;
        self.core
            .router
            .broadcast(room.id, ServerEvent::RoomUpdated { room: room.clone() })
            .await;
        // The join may have met the auto-start threshold.
        self.arm_countdown_if_due(room.id).await;
        Ok(room)
    }

    /// Removes the caller from a room. Returns `None` when the room
    /// dissolved; all its timers and attachments are torn down here.
    pub async fn leave_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Room>, ArenaError> {
        // Detach this user's socket first so they don't hear their own
        // departure.
        if self.core.router.room_of(user_id).await == Some(room_id) {
            self.core.router.detach_room(user_id).await;
        }
        let outcome = self.core.registry.lock().await.leave_room(room_id, user_id)?;
        match &outcome {
            Some(room) => {
                // A departure can revert a countdown (below threshold);
                // the countdown timer must not keep ticking toward a
                // start the room no longer qualifies for.
                if room.status != RoomStatus::Countdown {
                    self.core
                        .timers
                        .cancel(&room_id, TimerKind::Countdown)
                        .await;
                }
                self.core
                    .router
                    .broadcast(room_id, ServerEvent::UserLeft { user_id })
                    .await;
                self.core
                    .router
                    .broadcast(room_id, ServerEvent::RoomUpdated { room: room.clone() })
                    .await;
            }
            None => {
                self.core.timers.cancel_all(&room_id).await;
                self.core.router.clear_room(room_id).await;
                self.games.forget_room(room_id).await;
                self.matchmaker.forget(room_id).await;
            }
        }
        Ok(outcome)
    }

    /// Sets the caller's ready flag and runs the downstream effects:
    /// match confirmation, auto-countdown.
    pub async fn set_ready(
        &self,
        room_id: RoomId,
        user_id: UserId,
        is_ready: bool,
    ) -> Result<Room, ArenaError> {
        let result = self
            .core
            .registry
            .lock()
            .await
            .set_ready(room_id, user_id, is_ready);
        let room = match result {
            Ok(room) => room,
            // A matchmade room can already be counting down (auto-start
            // rule) while its host's confirmation is still outstanding;
            // accept that confirmation instead of bouncing it.
            Err(error @ shoalfire_room::RoomError::InvalidState { .. }) if is_ready => {
                if self.matchmaker.is_pending(room_id).await {
                    self.core.registry.lock().await.find_by_id(room_id)?
                } else {
                    return Err(error.into());
                }
            }
            Err(error) => return Err(error.into()),
        };

        self.core
            .router
            .broadcast(room_id, ServerEvent::RoomUpdated { room: room.clone() })
            .await;

        if is_ready {
            self.matchmaker.note_ready(room_id, user_id).await;
        }
        self.arm_countdown_if_due(room_id).await;

        Ok(room)
    }

    /// Starts the game as host, preempting any running countdown, and
    /// arms the game clock.
    pub async fn start_game(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Room, ArenaError> {
        let room = self
            .core
            .registry
            .lock()
            .await
            .start_game(room_id, user_id)?;
        self.core.timers.cancel(&room_id, TimerKind::Countdown).await;
        self.core
            .router
            .broadcast(room_id, ServerEvent::RoomUpdated { room: room.clone() })
            .await;
        self.core
            .router
            .broadcast(room_id, ServerEvent::GameStarted)
            .await;
        self.games.start_game_timer(room_id).await;
        Ok(room)
    }

    /// Signals readiness for another round in a finished room.
    pub async fn ready_for_next_game(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Room, ArenaError> {
        let room = self
            .core
            .registry
            .lock()
            .await
            .ready_for_next_game(room_id, user_id)?;
        self.core
            .router
            .broadcast(room_id, ServerEvent::RoomUpdated { room: room.clone() })
            .await;
        Ok(room)
    }

    /// Public rooms open for joining.
    pub async fn list_public_rooms(&self) -> Vec<RoomSummary> {
        self.core.registry.lock().await.list_public()
    }

    /// Fetches a room by id.
    pub async fn room_by_id(&self, room_id: RoomId) -> Result<Room, ArenaError> {
        Ok(self.core.registry.lock().await.find_by_id(room_id)?)
    }

    /// Fetches a room by join code.
    pub async fn room_by_code(&self, room_code: &str) -> Result<Room, ArenaError> {
        Ok(self.core.registry.lock().await.find_by_code(room_code)?)
    }

    /// Requests matchmaking for the caller.
    pub async fn request_match(
        &self,
        user_id: UserId,
        profile: &Profile,
    ) -> Result<MatchOutcome, ArenaError> {
        self.matchmaker.request_match(user_id, profile).await
    }

    /// Withdraws the caller from matchmaking.
    pub async fn cancel_match(&self, user_id: UserId) -> Result<bool, ArenaError> {
        self.matchmaker.cancel(user_id).await
    }

    /// The fixed seat layout constants.
    pub fn player_positions(&self) -> [SeatLayout; 4] {
        SEAT_LAYOUTS
    }

    /// Arms the countdown timer when a room sits in countdown state
    /// without one: the auto-start rule fired, or a client re-attached
    /// to a counting-down room. Pending matches wait for confirmation
    /// instead.
    pub(crate) async fn arm_countdown_if_due(&self, room_id: RoomId) {
        if self.matchmaker.is_pending(room_id).await {
            return;
        }
        if self
            .core
            .timers
            .is_running(&room_id, TimerKind::Countdown)
            .await
        {
            return;
        }
        let status = self
            .core
            .registry
            .lock()
            .await
            .find_by_id(room_id)
            .map(|r| r.status);
        if matches!(status, Ok(RoomStatus::Countdown)) {
            self.games.start_countdown(room_id).await;
        }
    }
}
