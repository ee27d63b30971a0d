//! The room registry: exclusive owner of all Room and Player mutation.
//!
//! The registry is a plain struct; the server wraps it in one async
//! mutex, which linearizes every mutation per room (and in fact across
//! rooms — stronger than required, and it makes the system-wide
//! "one unfinished room per user" check race-free in-process). The
//! distributed lock from the key/value store additionally guards the
//! matchable-room scan against concurrent matchers in other processes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

use shoalfire_protocol::{
    Player, Profile, Room, RoomId, RoomStatus, RoomSummary, RoomType, UserId,
    seat_for_position,
};
use shoalfire_store::KvStore;

use crate::{RoomConfig, RoomError};

/// Owns every live room, indexed by id and by join code.
pub struct RoomRegistry {
    config: RoomConfig,
    kv: Arc<dyn KvStore>,
    rooms: HashMap<RoomId, Room>,
    by_code: HashMap<String, RoomId>,
}

impl RoomRegistry {
    /// Creates an empty registry.
    pub fn new(config: RoomConfig, kv: Arc<dyn KvStore>) -> Self {
        Self {
            config,
            kv,
            rooms: HashMap::new(),
            by_code: HashMap::new(),
        }
    }

    /// The registry's configuration.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Creation and membership
    // -----------------------------------------------------------------

    /// Creates a room with `host` as its sole player.
    pub fn create_room(
        &mut self,
        host: UserId,
        profile: &Profile,
        kind: RoomType,
    ) -> Result<Room, RoomError> {
        self.ensure_free(host, None)?;
        let room_code = self.generate_code()?;

        let mut host_player = Player::from_profile(host, profile);
        host_player.is_host = true;

        let now = Utc::now();
        let room = Room {
            id: RoomId::new(),
            room_code: room_code.clone(),
            kind,
            status: RoomStatus::Waiting,
            host_id: host,
            players: vec![host_player],
            start_time: None,
            end_time: None,
            current_round: 0,
            created_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.config.room_ttl)
                    .unwrap_or_else(|_| chrono::Duration::hours(1)),
        };

        info!(room_id = %room.id, %room_code, host = %host, "room created");
        self.by_code.insert(room_code, room.id);
        self.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    /// Adds a player to the room with the given join code.
    pub fn join_room(
        &mut self,
        user: UserId,
        profile: &Profile,
        room_code: &str,
    ) -> Result<Room, RoomError> {
        self.ensure_free(user, Some(room_code))?;

        let room_id = *self
            .by_code
            .get(room_code)
            .ok_or_else(|| RoomError::UnknownCode(room_code.to_string()))?;
        let max_players = self.config.max_players;
        let threshold = self.config.auto_start_threshold;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        if room.status.is_closed() {
            return Err(RoomError::RoomClosed(room_id));
        }
        if room.players.len() >= max_players {
            return Err(RoomError::RoomFull(room_id));
        }

        room.players.push(Player::from_profile(user, profile));
        info!(
            %room_id,
            %user,
            players = room.players.len(),
            "player joined"
        );

        maybe_begin_countdown(room, threshold);
        Ok(room.clone())
    }

    /// Removes a player. Returns `None` when the last player left and
    /// the room was dissolved; the caller must cancel its timers.
    pub fn leave_room(
        &mut self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<Option<Room>, RoomError> {
        let threshold = self.config.auto_start_threshold;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        let index = room
            .players
            .iter()
            .position(|p| p.user_id == user)
            .ok_or(RoomError::UserNotInRoom(user, room_id))?;
        let was_host = room.players[index].is_host;
        room.players.remove(index);

        if room.players.is_empty() {
            self.by_code.remove(&room.room_code);
            self.rooms.remove(&room_id);
            info!(%room_id, %user, "last player left, room dissolved");
            return Ok(None);
        }

        if was_host {
            let successor = &mut room.players[0];
            successor.is_host = true;
            room.host_id = successor.user_id;
            info!(%room_id, new_host = %room.host_id, "host transferred");
        }

        // A public room that dropped below the threshold mid-countdown
        // goes back to waiting.
        if room.kind == RoomType::Public
            && room.status == RoomStatus::Countdown
            && room.players.len() < threshold
        {
            room.status = RoomStatus::Waiting;
            debug!(%room_id, "countdown reverted, below player threshold");
        }

        info!(%room_id, %user, players = room.players.len(), "player left");
        Ok(Some(room.clone()))
    }

    /// Updates a player's ready flag. Only valid while waiting.
    pub fn set_ready(
        &mut self,
        room_id: RoomId,
        user: UserId,
        is_ready: bool,
    ) -> Result<Room, RoomError> {
        let threshold = self.config.auto_start_threshold;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        if room.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState {
                room: room_id,
                status: room.status,
                operation: "set_ready",
            });
        }
        let player = room
            .player_mut(user)
            .ok_or(RoomError::UserNotInRoom(user, room_id))?;
        player.is_ready = is_ready;

        if is_ready {
            maybe_begin_countdown(room, threshold);
        }
        Ok(room.clone())
    }

    // -----------------------------------------------------------------
    // Game lifecycle
    // -----------------------------------------------------------------

    /// Starts the game: assigns seats in join order, marks the room
    /// playing, and records the start time.
    pub fn start_game(&mut self, room_id: RoomId, user: UserId) -> Result<Room, RoomError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        if room.host_id != user {
            return Err(RoomError::NotHost(user, room_id));
        }
        match room.status {
            RoomStatus::Playing => return Err(RoomError::GameAlreadyStarted(room_id)),
            RoomStatus::Finished => {
                return Err(RoomError::InvalidState {
                    room: room_id,
                    status: room.status,
                    operation: "start_game",
                });
            }
            RoomStatus::Waiting | RoomStatus::Countdown => {}
        }
        if room.players.is_empty() {
            return Err(RoomError::NotEnoughPlayers(room_id));
        }
        if room.kind == RoomType::Public
            && !room.players.iter().all(|p| p.is_host || p.is_ready)
        {
            return Err(RoomError::PlayersNotReady(room_id));
        }

        assign_positions(room);
        room.status = RoomStatus::Playing;
        room.start_time = Some(Utc::now());
        room.current_round += 1;

        info!(
            %room_id,
            round = room.current_round,
            players = room.players.len(),
            "game started"
        );
        Ok(room.clone())
    }

    /// Ends the game: marks the room finished and records the end time.
    pub fn end_game(&mut self, room_id: RoomId) -> Result<Room, RoomError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        if room.status != RoomStatus::Playing {
            return Err(RoomError::RoomNotPlaying(room_id));
        }
        room.status = RoomStatus::Finished;
        room.end_time = Some(Utc::now());
        info!(%room_id, "game ended");
        Ok(room.clone())
    }

    /// Marks a player ready for another round, resetting their score.
    /// When every player has readied up, the room cycles back to
    /// waiting with the game clock fields cleared.
    pub fn ready_for_next_game(
        &mut self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<Room, RoomError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        if room.status != RoomStatus::Finished {
            return Err(RoomError::InvalidState {
                room: room_id,
                status: room.status,
                operation: "ready_for_next_game",
            });
        }
        let player = room
            .player_mut(user)
            .ok_or(RoomError::UserNotInRoom(user, room_id))?;
        player.is_ready = true;
        player.score = 0;

        if room.players.iter().all(|p| p.is_ready) {
            room.status = RoomStatus::Waiting;
            room.start_time = None;
            room.end_time = None;
            info!(%room_id, "all players ready, room reset for next game");
        }
        Ok(room.clone())
    }

    /// Applies an additive score delta to a player.
    pub fn update_player_score(
        &mut self,
        room_id: RoomId,
        user: UserId,
        delta: i64,
    ) -> Result<Room, RoomError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        let player = room
            .player_mut(user)
            .ok_or(RoomError::UserNotInRoom(user, room_id))?;
        player.score += delta;
        Ok(room.clone())
    }

    /// Records a player's chosen weapon.
    pub fn set_weapon(
        &mut self,
        room_id: RoomId,
        user: UserId,
        weapon_type: u32,
    ) -> Result<Room, RoomError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        let player = room
            .player_mut(user)
            .ok_or(RoomError::UserNotInRoom(user, room_id))?;
        player.weapon_type = Some(weapon_type);
        Ok(room.clone())
    }

    /// Moves a room along a legal state-machine edge.
    pub fn set_status(
        &mut self,
        room_id: RoomId,
        status: RoomStatus,
    ) -> Result<Room, RoomError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        if !room.status.can_transition_to(status) {
            return Err(RoomError::InvalidState {
                room: room_id,
                status: room.status,
                operation: "set_status",
            });
        }
        room.status = status;
        Ok(room.clone())
    }

    // -----------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------

    /// Fetches a room by id.
    pub fn find_by_id(&self, room_id: RoomId) -> Result<Room, RoomError> {
        self.rooms
            .get(&room_id)
            .cloned()
            .ok_or(RoomError::NotFound(room_id))
    }

    /// Fetches a room by join code.
    pub fn find_by_code(&self, room_code: &str) -> Result<Room, RoomError> {
        self.by_code
            .get(room_code)
            .and_then(|id| self.rooms.get(id))
            .cloned()
            .ok_or_else(|| RoomError::UnknownCode(room_code.to_string()))
    }

    /// Public rooms that have not started playing, for the lobby list.
    pub fn list_public(&self) -> Vec<RoomSummary> {
        self.rooms
            .values()
            .filter(|r| r.kind == RoomType::Public && r.status.is_open())
            .map(RoomSummary::from_room)
            .collect()
    }

    /// The unfinished room a user is currently in, if any.
    pub fn membership_of(&self, user: UserId) -> Option<RoomId> {
        self.active_room_of(user).map(|r| r.id)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    // -----------------------------------------------------------------
    // Matching and garbage collection
    // -----------------------------------------------------------------

    /// Scans public waiting rooms with spare capacity and returns the
    /// first one that re-verifies under a short-lived distributed lock.
    ///
    /// The lock guards the gap between scan and assignment when several
    /// matchers (possibly in other processes) race for the same room; it
    /// is released on every path, pass or fail.
    pub async fn find_matchable_room(
        &self,
        user: UserId,
    ) -> Result<Option<Room>, RoomError> {
        self.ensure_free(user, None)?;

        let owner = user.to_string();
        let candidates: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|r| r.kind == RoomType::Public && r.status == RoomStatus::Waiting)
            .map(|r| r.id)
            .collect();

        for room_id in candidates {
            let Some(room) = self.rooms.get(&room_id) else {
                continue;
            };
            if room.players.len() >= self.config.max_players {
                continue;
            }

            let lock_key = format!("room:lock:{room_id}");
            if !self
                .kv
                .acquire_lock(&lock_key, &owner, self.config.match_lock_ttl)
                .await?
            {
                continue;
            }

            // Re-verify under the lock: the room may have filled or
            // started between the scan and the acquire.
            let verified = self.rooms.get(&room_id).filter(|r| {
                r.status == RoomStatus::Waiting
                    && r.players.len() < self.config.max_players
            });
            let result = verified.cloned();
            self.kv.release_lock(&lock_key, &owner).await?;

            if let Some(room) = result {
                return Ok(Some(room));
            }
        }
        Ok(None)
    }

    /// Deletes a room outright (matchmaking cancellation, sweep).
    pub fn remove_room(&mut self, room_id: RoomId) -> Option<Room> {
        let room = self.rooms.remove(&room_id)?;
        self.by_code.remove(&room.room_code);
        info!(%room_id, "room removed");
        Some(room)
    }

    /// Collects rooms whose TTL has passed. Returns the removed ids so
    /// the caller can cancel their timers and detach connections.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<RoomId> {
        let expired: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|r| r.expires_at <= now)
            .map(|r| r.id)
            .collect();
        for room_id in &expired {
            if let Some(room) = self.rooms.remove(room_id) {
                self.by_code.remove(&room.room_code);
                info!(%room_id, room_code = %room.room_code, "expired room swept");
            }
        }
        expired
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Enforces the system-wide rule that a user is in at most one
    /// unfinished room.
    fn ensure_free(&self, user: UserId, joining_code: Option<&str>) -> Result<(), RoomError> {
        if let Some(room) = self.active_room_of(user) {
            if joining_code == Some(room.room_code.as_str()) {
                return Err(RoomError::AlreadyInThisRoom(user, room.id));
            }
            return Err(RoomError::AlreadyInRoom(user, room.id));
        }
        Ok(())
    }

    fn active_room_of(&self, user: UserId) -> Option<&Room> {
        self.rooms
            .values()
            .find(|r| r.status != RoomStatus::Finished && r.contains(user))
    }

    /// Draws random six-digit codes until one is unused, with a bounded
    /// number of attempts.
    fn generate_code(&self) -> Result<String, RoomError> {
        let mut rng = rand::rng();
        for _ in 0..self.config.max_code_attempts {
            let code = rng.random_range(100_000..=999_999).to_string();
            if !self.by_code.contains_key(&code) {
                return Ok(code);
            }
        }
        Err(RoomError::CodeAllocation)
    }
}

/// Transitions a public waiting room into countdown once it has reached
/// the auto-start threshold with every non-host player ready.
fn maybe_begin_countdown(room: &mut Room, threshold: usize) {
    if room.kind == RoomType::Public
        && room.status == RoomStatus::Waiting
        && room.players.len() >= threshold
        && room.players.iter().all(|p| p.is_host || p.is_ready)
    {
        room.status = RoomStatus::Countdown;
        info!(room_id = %room.id, "auto-start threshold met, countdown begins");
    }
}

/// Assigns seat positions 1..=4 in current player order and derives each
/// seat's orientation and side.
fn assign_positions(room: &mut Room) {
    for (index, player) in room.players.iter_mut().take(4).enumerate() {
        let position_id = index as u8 + 1;
        player.position_id = Some(position_id);
        if let Some((orientation, side)) = seat_for_position(position_id) {
            player.orientation = Some(orientation);
            player.side = Some(side);
        }
    }
}
