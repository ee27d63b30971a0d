//! Registry behavior: membership, host transfer, the status machine,
//! matching, and the invariants every mutation must preserve.

use std::sync::Arc;

use shoalfire_protocol::{
    Orientation, Profile, Room, RoomStatus, RoomType, Side, UserId,
};
use shoalfire_room::{RoomConfig, RoomError, RoomRegistry};
use shoalfire_store::{KvStore, MemoryStore};

fn registry() -> RoomRegistry {
    RoomRegistry::new(RoomConfig::default(), Arc::new(MemoryStore::new()))
}

fn profile(nickname: &str) -> Profile {
    Profile {
        nickname: nickname.into(),
        avatar_url: format!("https://img/{nickname}.png"),
    }
}

/// Exactly one player holds the host flag, and it matches `host_id`.
fn assert_host_invariant(room: &Room) {
    let hosts: Vec<_> = room.players.iter().filter(|p| p.is_host).collect();
    assert_eq!(hosts.len(), 1, "exactly one host expected");
    assert_eq!(hosts[0].user_id, room.host_id);
}

/// Creates a public room with a host and n-1 additional joined players.
fn room_with_players(reg: &mut RoomRegistry, n: usize) -> (Room, Vec<UserId>) {
    let mut users = vec![UserId::new()];
    let mut room = reg
        .create_room(users[0], &profile("host"), RoomType::Public)
        .unwrap();
    for i in 1..n {
        let user = UserId::new();
        users.push(user);
        room = reg
            .join_room(user, &profile(&format!("p{i}")), &room.room_code)
            .unwrap();
    }
    (room, users)
}

// ---------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------

#[test]
fn create_room_starts_waiting_with_sole_host() {
    let mut reg = registry();
    let host = UserId::new();
    let room = reg
        .create_room(host, &profile("host"), RoomType::Public)
        .unwrap();

    assert_eq!(room.status, RoomStatus::Waiting);
    assert_eq!(room.players.len(), 1);
    assert_eq!(room.host_id, host);
    assert!(room.players[0].is_host);
    assert!(!room.players[0].is_ready);
    assert_eq!(room.players[0].score, 0);
    assert_host_invariant(&room);
}

#[test]
fn room_code_is_six_digits_and_resolvable() {
    let mut reg = registry();
    let room = reg
        .create_room(UserId::new(), &profile("host"), RoomType::Private)
        .unwrap();
    assert_eq!(room.room_code.len(), 6);
    assert!(room.room_code.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(reg.find_by_code(&room.room_code).unwrap().id, room.id);
}

#[test]
fn room_expires_one_hour_after_creation() {
    let mut reg = registry();
    let room = reg
        .create_room(UserId::new(), &profile("host"), RoomType::Public)
        .unwrap();
    assert_eq!((room.expires_at - room.created_at).num_seconds(), 3600);
}

#[test]
fn create_while_in_another_room_is_rejected() {
    let mut reg = registry();
    let host = UserId::new();
    reg.create_room(host, &profile("host"), RoomType::Public)
        .unwrap();
    let err = reg
        .create_room(host, &profile("host"), RoomType::Public)
        .unwrap_err();
    assert!(matches!(err, RoomError::AlreadyInRoom(..)));
    assert_eq!(err.code(), "already_in_room");
}

// ---------------------------------------------------------------------
// Joining
// ---------------------------------------------------------------------

#[test]
fn join_appends_players_in_order() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 3);
    let ids: Vec<UserId> = room.players.iter().map(|p| p.user_id).collect();
    assert_eq!(ids, users);
    assert!(!room.players[2].is_host);
    assert_host_invariant(&room);
}

#[test]
fn join_boundary_fourth_succeeds_fifth_fails() {
    let mut reg = registry();
    let (room, _) = room_with_players(&mut reg, 3);

    // 3 -> 4 is fine.
    let room = reg
        .join_room(UserId::new(), &profile("p4"), &room.room_code)
        .unwrap();
    assert_eq!(room.players.len(), 4);

    // 4 -> 5 is not.
    let err = reg
        .join_room(UserId::new(), &profile("p5"), &room.room_code)
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomFull(_)));
}

#[test]
fn join_unknown_code_is_not_found() {
    let mut reg = registry();
    let err = reg
        .join_room(UserId::new(), &profile("p"), "000000")
        .unwrap_err();
    assert_eq!(err.code(), "room_not_found");
}

#[test]
fn join_playing_or_finished_room_is_closed() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    reg.set_ready(room.id, users[1], true).unwrap();
    reg.start_game(room.id, users[0]).unwrap();

    let err = reg
        .join_room(UserId::new(), &profile("late"), &room.room_code)
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomClosed(_)));

    reg.end_game(room.id).unwrap();
    let err = reg
        .join_room(UserId::new(), &profile("late"), &room.room_code)
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomClosed(_)));
}

#[test]
fn join_own_room_again_is_distinguished() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    let err = reg
        .join_room(users[1], &profile("p1"), &room.room_code)
        .unwrap_err();
    assert!(matches!(err, RoomError::AlreadyInThisRoom(..)));
}

#[test]
fn member_of_finished_room_may_join_elsewhere() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    reg.set_ready(room.id, users[1], true).unwrap();
    reg.start_game(room.id, users[0]).unwrap();
    reg.end_game(room.id).unwrap();

    // The finished room no longer pins its members.
    let other = reg
        .create_room(users[1], &profile("p1"), RoomType::Private)
        .unwrap();
    assert_eq!(other.players.len(), 1);
}

// ---------------------------------------------------------------------
// Auto-countdown
// ---------------------------------------------------------------------

#[test]
fn public_room_counts_down_once_threshold_met_and_ready() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    assert_eq!(room.status, RoomStatus::Waiting);

    // Second player readies up: threshold (2) reached, non-hosts ready.
    let room = reg.set_ready(room.id, users[1], true).unwrap();
    assert_eq!(room.status, RoomStatus::Countdown);
}

#[test]
fn join_triggers_countdown_when_existing_players_ready() {
    let mut reg = registry();
    let host = UserId::new();
    let room = reg
        .create_room(host, &profile("host"), RoomType::Public)
        .unwrap();
    let p1 = UserId::new();
    let room = reg.join_room(p1, &profile("p1"), &room.room_code).unwrap();
    let room = reg.set_ready(room.id, p1, true).unwrap();
    // Already counting down with two ready players; a third may still
    // join while the countdown runs.
    assert_eq!(room.status, RoomStatus::Countdown);
    let room = reg
        .join_room(UserId::new(), &profile("p2"), &room.room_code)
        .unwrap();
    assert_eq!(room.players.len(), 3);
    assert_eq!(room.status, RoomStatus::Countdown);
}

#[test]
fn private_room_never_counts_down_automatically() {
    let mut reg = registry();
    let host = UserId::new();
    let room = reg
        .create_room(host, &profile("host"), RoomType::Private)
        .unwrap();
    let p1 = UserId::new();
    reg.join_room(p1, &profile("p1"), &room.room_code).unwrap();
    let room = reg.set_ready(room.id, p1, true).unwrap();
    assert_eq!(room.status, RoomStatus::Waiting);
}

// ---------------------------------------------------------------------
// Leaving
// ---------------------------------------------------------------------

#[test]
fn non_host_leaving_keeps_host() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    let room = reg.leave_room(room.id, users[1]).unwrap().unwrap();
    assert_eq!(room.players.len(), 1);
    assert_eq!(room.host_id, users[0]);
    assert_host_invariant(&room);
}

#[test]
fn host_leaving_promotes_first_remaining_player() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 3);
    let room = reg.leave_room(room.id, users[0]).unwrap().unwrap();
    assert_eq!(room.host_id, users[1]);
    assert!(room.players[0].is_host);
    assert_host_invariant(&room);
}

#[test]
fn last_player_leaving_dissolves_room() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    // Non-host leaves: room survives with the host alone.
    assert!(reg.leave_room(room.id, users[1]).unwrap().is_some());
    // Host leaves: room dissolves.
    assert!(reg.leave_room(room.id, users[0]).unwrap().is_none());
    assert!(matches!(
        reg.find_by_id(room.id),
        Err(RoomError::NotFound(_))
    ));
    // The code is freed as well.
    assert!(reg.find_by_code(&room.room_code).is_err());
}

#[test]
fn leave_by_non_member_is_rejected() {
    let mut reg = registry();
    let (room, _) = room_with_players(&mut reg, 2);
    let err = reg.leave_room(room.id, UserId::new()).unwrap_err();
    assert!(matches!(err, RoomError::UserNotInRoom(..)));
}

#[test]
fn dropping_below_threshold_reverts_countdown() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    let room = reg.set_ready(room.id, users[1], true).unwrap();
    assert_eq!(room.status, RoomStatus::Countdown);

    let room = reg.leave_room(room.id, users[1]).unwrap().unwrap();
    assert_eq!(room.status, RoomStatus::Waiting);
}

// ---------------------------------------------------------------------
// Ready flag
// ---------------------------------------------------------------------

#[test]
fn set_ready_is_idempotent() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 3);
    let once = reg.set_ready(room.id, users[1], true).unwrap();
    let twice = reg.set_ready(room.id, users[1], true).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn set_ready_requires_waiting_status() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    reg.set_ready(room.id, users[1], true).unwrap();
    reg.start_game(room.id, users[0]).unwrap();
    let err = reg.set_ready(room.id, users[1], false).unwrap_err();
    assert!(matches!(err, RoomError::InvalidState { .. }));
    assert_eq!(err.code(), "invalid_room_state");
}

// ---------------------------------------------------------------------
// Start / end / next-game cycle
// ---------------------------------------------------------------------

#[test]
fn start_game_requires_host() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    let err = reg.start_game(room.id, users[1]).unwrap_err();
    assert!(matches!(err, RoomError::NotHost(..)));
}

#[test]
fn public_start_requires_non_hosts_ready() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 3);
    reg.set_ready(room.id, users[1], true).unwrap();
    // users[2] never readied.
    let err = reg.start_game(room.id, users[0]).unwrap_err();
    assert!(matches!(err, RoomError::PlayersNotReady(_)));
}

#[test]
fn private_start_does_not_require_ready() {
    let mut reg = registry();
    let host = UserId::new();
    let room = reg
        .create_room(host, &profile("host"), RoomType::Private)
        .unwrap();
    reg.join_room(UserId::new(), &profile("p1"), &room.room_code)
        .unwrap();
    let room = reg.start_game(room.id, host).unwrap();
    assert_eq!(room.status, RoomStatus::Playing);
}

#[test]
fn start_game_assigns_seats_in_join_order() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 4);
    for user in &users[1..] {
        reg.set_ready(room.id, *user, true).unwrap();
    }
    let room = reg.start_game(room.id, users[0]).unwrap();

    let expected = [
        (1, Orientation::Bottom, Side::Left),
        (2, Orientation::Bottom, Side::Right),
        (3, Orientation::Top, Side::Left),
        (4, Orientation::Top, Side::Right),
    ];
    for (player, (id, orientation, side)) in room.players.iter().zip(expected) {
        assert_eq!(player.position_id, Some(id));
        assert_eq!(player.orientation, Some(orientation));
        assert_eq!(player.side, Some(side));
    }
    assert!(room.start_time.is_some());
    assert_eq!(room.current_round, 1);
}

#[test]
fn start_twice_is_already_started() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    reg.set_ready(room.id, users[1], true).unwrap();
    reg.start_game(room.id, users[0]).unwrap();
    let err = reg.start_game(room.id, users[0]).unwrap_err();
    assert!(matches!(err, RoomError::GameAlreadyStarted(_)));
}

#[test]
fn start_from_finished_is_invalid() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    reg.set_ready(room.id, users[1], true).unwrap();
    reg.start_game(room.id, users[0]).unwrap();
    reg.end_game(room.id).unwrap();
    let err = reg.start_game(room.id, users[0]).unwrap_err();
    assert!(matches!(err, RoomError::InvalidState { .. }));
}

#[test]
fn end_game_requires_playing() {
    let mut reg = registry();
    let (room, _) = room_with_players(&mut reg, 2);
    let err = reg.end_game(room.id).unwrap_err();
    assert!(matches!(err, RoomError::RoomNotPlaying(_)));
}

#[test]
fn full_cycle_returns_room_to_waiting_with_reset_scores() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    reg.set_ready(room.id, users[1], true).unwrap();
    reg.start_game(room.id, users[0]).unwrap();
    reg.update_player_score(room.id, users[0], 30).unwrap();
    reg.update_player_score(room.id, users[1], 50).unwrap();
    reg.end_game(room.id).unwrap();

    // First player readies: room still finished.
    let room_mid = reg.ready_for_next_game(room.id, users[0]).unwrap();
    assert_eq!(room_mid.status, RoomStatus::Finished);

    // Second player readies: full reset.
    let room_done = reg.ready_for_next_game(room.id, users[1]).unwrap();
    assert_eq!(room_done.status, RoomStatus::Waiting);
    assert!(room_done.start_time.is_none());
    assert!(room_done.end_time.is_none());
    assert!(room_done.players.iter().all(|p| p.score == 0));
    assert_host_invariant(&room_done);
}

#[test]
fn ready_for_next_game_requires_finished() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    let err = reg.ready_for_next_game(room.id, users[1]).unwrap_err();
    assert!(matches!(err, RoomError::InvalidState { .. }));
}

// ---------------------------------------------------------------------
// Scores and status edges
// ---------------------------------------------------------------------

#[test]
fn score_updates_are_additive() {
    let mut reg = registry();
    let (room, users) = room_with_players(&mut reg, 2);
    reg.update_player_score(room.id, users[1], 10).unwrap();
    let room = reg.update_player_score(room.id, users[1], 25).unwrap();
    assert_eq!(room.player(users[1]).unwrap().score, 35);
}

#[test]
fn score_update_for_stranger_is_rejected() {
    let mut reg = registry();
    let (room, _) = room_with_players(&mut reg, 2);
    let err = reg
        .update_player_score(room.id, UserId::new(), 10)
        .unwrap_err();
    assert!(matches!(err, RoomError::UserNotInRoom(..)));
}

#[test]
fn set_status_enforces_state_machine() {
    let mut reg = registry();
    let (room, _) = room_with_players(&mut reg, 2);
    assert!(reg.set_status(room.id, RoomStatus::Countdown).is_ok());
    let err = reg.set_status(room.id, RoomStatus::Finished).unwrap_err();
    assert!(matches!(err, RoomError::InvalidState { .. }));
    // The countdown back-edge is legal.
    assert!(reg.set_status(room.id, RoomStatus::Waiting).is_ok());
}

// ---------------------------------------------------------------------
// Matching and sweeping
// ---------------------------------------------------------------------

#[tokio::test]
async fn find_matchable_returns_waiting_public_room() {
    let mut reg = registry();
    let (room, _) = room_with_players(&mut reg, 2);
    let found = reg.find_matchable_room(UserId::new()).await.unwrap();
    assert_eq!(found.map(|r| r.id), Some(room.id));
}

#[tokio::test]
async fn find_matchable_skips_private_full_and_started_rooms() {
    let mut reg = registry();
    // Private room.
    reg.create_room(UserId::new(), &profile("a"), RoomType::Private)
        .unwrap();
    // Full public room.
    room_with_players(&mut reg, 4);
    // Playing public room.
    let (playing, users) = room_with_players(&mut reg, 2);
    reg.set_ready(playing.id, users[1], true).unwrap();
    reg.start_game(playing.id, users[0]).unwrap();

    let found = reg.find_matchable_room(UserId::new()).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn find_matchable_rejects_user_already_in_room() {
    let mut reg = registry();
    let (_, users) = room_with_players(&mut reg, 2);
    let err = reg.find_matchable_room(users[1]).await.unwrap_err();
    assert!(matches!(err, RoomError::AlreadyInRoom(..)));
}

#[tokio::test]
async fn find_matchable_releases_its_lock() {
    let kv = Arc::new(MemoryStore::new());
    let mut reg = RoomRegistry::new(RoomConfig::default(), kv.clone());
    let host = UserId::new();
    let room = reg
        .create_room(host, &profile("host"), RoomType::Public)
        .unwrap();

    reg.find_matchable_room(UserId::new()).await.unwrap();

    // If the scan had leaked its lock this acquire would fail.
    let key = format!("room:lock:{}", room.id);
    assert!(
        kv.acquire_lock(&key, "someone-else", std::time::Duration::from_secs(5))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn find_matchable_skips_locked_room() {
    let kv = Arc::new(MemoryStore::new());
    let mut reg = RoomRegistry::new(RoomConfig::default(), kv.clone());
    let room = reg
        .create_room(UserId::new(), &profile("host"), RoomType::Public)
        .unwrap();

    // Another matcher holds the room's lock.
    let key = format!("room:lock:{}", room.id);
    kv.acquire_lock(&key, "rival", std::time::Duration::from_secs(5))
        .await
        .unwrap();

    let found = reg.find_matchable_room(UserId::new()).await.unwrap();
    assert!(found.is_none());
}

#[test]
fn sweep_collects_expired_rooms_only() {
    let mut reg = registry();
    let (room, _) = room_with_players(&mut reg, 2);

    // Nothing expires at creation time.
    assert!(reg.sweep_expired(chrono::Utc::now()).is_empty());

    // Two hours later the room is gone.
    let later = chrono::Utc::now() + chrono::Duration::hours(2);
    let swept = reg.sweep_expired(later);
    assert_eq!(swept, vec![room.id]);
    assert!(reg.find_by_id(room.id).is_err());
    assert_eq!(reg.room_count(), 0);
}
