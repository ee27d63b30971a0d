//! Matchmaking orchestration: batching, room formation, and the
//! ready-confirmation watchdog.
//!
//! The queue itself lives in `shoalfire-match`; this module turns
//! batches into rooms and polices the confirmation deadline. Matching
//! never auto-starts a game — every matched player must confirm ready
//! within the deadline, or the match is cancelled, the confirmed
//! players are re-queued at the front, and the room is deleted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shoalfire_match::{MatchQueue, MatchingPlayer};
use shoalfire_protocol::{
    MatchedPlayer, Profile, Room, RoomId, RoomStatus, RoomType, ServerEvent, UserId,
};
use shoalfire_room::RoomError;
use shoalfire_timer::TimerKind;

use crate::{ArenaCore, ArenaError};

/// Outcome of a matchmaking request.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// An open room had space; the user has been seated in it.
    Matched(Room),
    /// No open room; the user is waiting in the queue.
    Queued,
}

/// A formed room still waiting for its players' ready confirmations.
struct PendingMatch {
    players: Vec<MatchingPlayer>,
    confirmed: HashSet<UserId>,
}

/// Forms rooms from the queue and supervises ready confirmation.
pub struct Matchmaker {
    core: Arc<ArenaCore>,
    queue: MatchQueue,
    pending: Mutex<HashMap<RoomId, PendingMatch>>,
}

impl Matchmaker {
    /// Creates a matchmaker over the shared core.
    pub fn new(core: Arc<ArenaCore>) -> Self {
        let queue = MatchQueue::new(core.kv.clone());
        Self {
            core,
            queue,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying waiting list.
    pub fn queue(&self) -> &MatchQueue {
        &self.queue
    }

    /// Cadence of the background batcher.
    pub fn tick_interval(&self) -> std::time::Duration {
        self.core.config.match_tick_interval
    }

    /// Entry point for a matchmaking request: seat the user in an open
    /// public room if one passes the locked re-verification, otherwise
    /// queue them.
    pub async fn request_match(
        &self,
        user_id: UserId,
        profile: &Profile,
    ) -> Result<MatchOutcome, ArenaError> {
        let seated = {
            let mut registry = self.core.registry.lock().await;
            match registry.find_matchable_room(user_id).await? {
                Some(room) => match registry.join_room(user_id, profile, &room.room_code) {
                    Ok(room) => Some(room),
                    // Lost the race between scan and join; fall through
                    // to the queue.
                    Err(RoomError::RoomFull(_) | RoomError::RoomClosed(_)) => None,
                    Err(error) => return Err(error.into()),
                },
                None => None,
            }
        };

        if let Some(room) = seated {
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
            info!(%user_id, room_id = %room.id, "matched into open room");
            return Ok(MatchOutcome::Matched(room));
        }

        self.queue
            .enqueue(MatchingPlayer::new(user_id, profile))
            .await?;
        Ok(MatchOutcome::Queued)
    }

    /// Removes the user from the queue. Idempotent.
    pub async fn cancel(&self, user_id: UserId) -> Result<bool, ArenaError> {
        Ok(self.queue.dequeue(user_id).await?)
    }

    /// Returns `true` if the user is waiting in the queue.
    pub async fn is_queued(&self, user_id: UserId) -> Result<bool, ArenaError> {
        Ok(self.queue.contains(user_id).await?)
    }

    /// Returns `true` if the room is a formed match still awaiting
    /// confirmations.
    pub async fn is_pending(&self, room_id: RoomId) -> bool {
        self.pending.lock().await.contains_key(&room_id)
    }

    /// Drops a pending entry whose room went away underneath it.
    pub async fn forget(&self, room_id: RoomId) {
        self.pending.lock().await.remove(&room_id);
    }

    /// One batcher tick: when enough players are waiting, take a
    /// room-sized batch off the front and form a room for it.
    pub async fn tick(&self) -> Result<(), ArenaError> {
        let capacity = self.core.config.room.max_players;
        let Some(batch) = self.queue.take_batch(capacity).await? else {
            return Ok(());
        };
        self.form_room(batch).await
    }

    /// Forms a room from a batch: the oldest player hosts, the rest
    /// join by code; everyone is notified and the ready-timeout watch
    /// begins. The game does not start here.
    async fn form_room(&self, batch: Vec<MatchingPlayer>) -> Result<(), ArenaError> {
        let Some(host) = batch.first() else {
            return Ok(());
        };
        let formed = {
            let mut registry = self.core.registry.lock().await;
            match registry.create_room(host.user_id, &queued_profile(host), RoomType::Public)
            {
                Ok(room) => {
                    for player in &batch[1..] {
                        if let Err(error) = registry.join_room(
                            player.user_id,
                            &queued_profile(player),
                            &room.room_code,
                        ) {
                            // The player slipped into another room since
                            // they queued; the match proceeds without them.
                            warn!(user = %player.user_id, %error, "matched player could not be seated");
                        }
                    }
                    registry.find_by_id(room.id)
                }
                Err(error) => Err(error),
            }
        };
        let room = match formed {
            Ok(room) => room,
            Err(error) => {
                // The host could not open a room (already in one, code
                // space exhausted). Put the rest back at the front so
                // they keep their wait priority.
                warn!(user = %host.user_id, %error, "match host could not open a room");
                self.queue.enqueue_front(&batch[1..]).await?;
                return Ok(());
            }
        };

        self.pending.lock().await.insert(
            room.id,
            PendingMatch {
                players: batch.clone(),
                confirmed: HashSet::new(),
            },
        );
        self.core
            .timers
            .start(
                room.id,
                TimerKind::ReadyTimeout,
                self.core.config.ready_timeout_secs,
            )
            .await;

        let roster: Vec<MatchedPlayer> = room
            .players
            .iter()
            .map(|p| MatchedPlayer {
                user_id: p.user_id,
                nickname: p.nickname.clone(),
                avatar_url: p.avatar_url.clone(),
            })
            .collect();
        let announcement = ServerEvent::MatchFound {
            room_id: room.id,
            room_code: room.room_code.clone(),
            ready_deadline_secs: self.core.config.ready_timeout_secs,
            players: roster,
        };
        for player in &batch {
            self.core
                .router
                .send_to(player.user_id, announcement.clone())
                .await;
        }
        info!(
            room_id = %room.id,
            players = batch.len(),
            "match formed, awaiting ready confirmations"
        );
        Ok(())
    }

    /// Registers a ready confirmation from a member of a pending match.
    /// When the last one lands, the watchdog is cancelled and the room
    /// proceeds into the normal countdown.
    pub async fn note_ready(&self, room_id: RoomId, user_id: UserId) {
        let all_confirmed = {
            let mut pending = self.pending.lock().await;
            let Some(entry) = pending.get_mut(&room_id) else {
                return;
            };
            entry.confirmed.insert(user_id);
            entry
                .players
                .iter()
                .all(|p| entry.confirmed.contains(&p.user_id))
        };
        if all_confirmed {
            self.pending.lock().await.remove(&room_id);
            self.core
                .timers
                .cancel(&room_id, TimerKind::ReadyTimeout)
                .await;
            self.begin_countdown(room_id).await;
        }
    }

    /// Sends the remaining-seconds tick to every matched player. Direct
    /// sends, not a room broadcast: a player may not have attached their
    /// socket to the room yet.
    pub async fn broadcast_ready_tick(&self, room_id: RoomId, remaining: u32) {
        let players: Vec<UserId> = {
            let pending = self.pending.lock().await;
            match pending.get(&room_id) {
                Some(entry) => entry.players.iter().map(|p| p.user_id).collect(),
                None => return,
            }
        };
        for user_id in players {
            self.core
                .router
                .send_to(user_id, ServerEvent::MatchReadyTick { remaining })
                .await;
        }
    }

    /// The confirmation deadline passed. If anyone failed to confirm,
    /// the match is cancelled: non-ready ids are announced, confirmed
    /// players go back to the front of the queue, and the room is
    /// deleted.
    pub async fn handle_ready_timeout(&self, room_id: RoomId) {
        let Some(entry) = self.pending.lock().await.remove(&room_id) else {
            return;
        };
        let not_ready: Vec<UserId> = entry
            .players
            .iter()
            .filter(|p| !entry.confirmed.contains(&p.user_id))
            .map(|p| p.user_id)
            .collect();

        if not_ready.is_empty() {
            // Everyone confirmed on the final tick; proceed normally.
            self.begin_countdown(room_id).await;
            return;
        }

        let cancelled = ServerEvent::MatchCancelled {
            reason: "ready confirmation timed out".to_string(),
            not_ready: not_ready.clone(),
        };
        for player in &entry.players {
            self.core
                .router
                .send_to(player.user_id, cancelled.clone())
                .await;
        }

        let confirmed: Vec<MatchingPlayer> = entry
            .players
            .iter()
            .filter(|p| entry.confirmed.contains(&p.user_id))
            .cloned()
            .collect();
        if let Err(error) = self.queue.enqueue_front(&confirmed).await {
            warn!(%room_id, %error, "failed to re-queue confirmed players");
        }

        self.core.registry.lock().await.remove_room(room_id);
        self.core.router.clear_room(room_id).await;
        self.core.timers.cancel_all(&room_id).await;
        info!(
            %room_id,
            not_ready = not_ready.len(),
            requeued = confirmed.len(),
            "match cancelled on ready timeout"
        );
    }

    /// Moves a fully-confirmed match into countdown.
    async fn begin_countdown(&self, room_id: RoomId) {
        let room = {
            let mut registry = self.core.registry.lock().await;
            match registry.find_by_id(room_id) {
                // The auto-start rule may have flipped the room already.
                Ok(room) if room.status == RoomStatus::Waiting => {
                    registry.set_status(room_id, RoomStatus::Countdown)
                }
                other => other,
            }
        };
        match room {
            Ok(room) if room.status == RoomStatus::Countdown => {
                self.core
                    .router
                    .broadcast(room_id, ServerEvent::RoomUpdated { room })
                    .await;
                self.core
                    .timers
                    .start(room_id, TimerKind::Countdown, self.core.config.countdown_secs)
                    .await;
            }
            Ok(room) => {
                debug!(%room_id, status = %room.status, "confirmed match in unexpected state");
            }
            Err(error) => {
                warn!(%room_id, %error, "confirmed match has no room");
            }
        }
    }
}

fn queued_profile(player: &MatchingPlayer) -> Profile {
    Profile {
        nickname: player.nickname.clone(),
        avatar_url: player.avatar_url.clone(),
    }
}
