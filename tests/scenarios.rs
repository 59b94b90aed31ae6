//! Integration-level tests exercising `Room`/`RoomManager` end-to-end
//! through their public API, covering the six concrete scenarios and the
//! room-idle-sweep case.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shiritori_server::engine::Settings;
use shiritori_server::room::{GameOverPayload, GameOverSink, Room};
use shiritori_server::room_manager::RoomManager;
use shiritori_server::vote::ChallengeVoteError;
use tokio::sync::mpsc;

fn settings(name: &str) -> Settings {
    Settings {
        name: name.to_string(),
        min_len: 0,
        max_len: 0,
        genre: String::new(),
        time_limit: 0,
        allowed_rows: vec![],
        no_dakuten: false,
        max_lives: 3,
        max_players: 8,
        private: false,
    }
}

struct RecordingSink {
    payloads: std::sync::Mutex<Vec<GameOverPayload>>,
    count: Arc<AtomicUsize>,
}

impl GameOverSink for RecordingSink {
    fn on_game_over(&self, payload: GameOverPayload) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload);
    }
}

async fn join_all(manager: &RoomManager, room: &Arc<Room>, names: &[&str]) {
    for name in &names[1..] {
        manager.track_player(name, &room.id);
        let (tx, _rx) = mpsc::channel(256);
        room.add_player(name, tx).await.unwrap();
    }
}

/// Scenario 1: self-challenge is blocked; a different challenger succeeds.
#[tokio::test]
async fn scenario_self_challenge_blocked() {
    let manager = RoomManager::new();
    let room = manager.create_room("room", "alice", settings("room"));
    manager.track_player("alice", &room.id);
    let (tx, _rx) = mpsc::channel(256);
    room.add_player("alice", tx).await.unwrap();
    join_all(&manager, &room, &["alice", "bob"]).await;

    room.start_game("alice", None).await.unwrap();
    room.submit_word("alice", "しりとり").await;

    let err = room.start_challenge_vote("alice").await.unwrap_err();
    assert_eq!(err, ChallengeVoteError::SelfChallenge);

    room.start_challenge_vote("bob").await.unwrap();
}

/// Scenario 2: a rejected challenge reverts score, life, turn, and history.
#[tokio::test]
async fn scenario_challenge_rejected_reverts_full_state() {
    let manager = RoomManager::new();
    let room = manager.create_room("room", "alice", settings("room"));
    manager.track_player("alice", &room.id);
    let (tx, _rx) = mpsc::channel(256);
    room.add_player("alice", tx).await.unwrap();
    join_all(&manager, &room, &["alice", "bob", "charlie"]).await;

    room.start_game("alice", None).await.unwrap();
    room.submit_word("alice", "しりとり").await;

    room.start_challenge_vote("bob").await.unwrap();
    room.cast_vote("charlie", false).await;

    let joined = room.joined_envelope("alice").await;
    match joined {
        shiritori_server::envelope::ServerEnvelope::RoomJoined { players, .. } => {
            let alice = players.iter().find(|p| p.name == "alice").unwrap();
            assert_eq!(alice.score, 0);
            assert_eq!(alice.lives, 2);
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
    assert_eq!(room.current_turn().await.as_deref(), Some("alice"));
}

/// Scenario 3: an accepted challenge keeps score/lives and advances turn.
#[tokio::test]
async fn scenario_challenge_accepted_keeps_state() {
    let manager = RoomManager::new();
    let room = manager.create_room("room", "alice", settings("room"));
    manager.track_player("alice", &room.id);
    let (tx, _rx) = mpsc::channel(256);
    room.add_player("alice", tx).await.unwrap();
    join_all(&manager, &room, &["alice", "bob", "charlie", "dave"]).await;

    room.start_game("alice", None).await.unwrap();
    room.submit_word("alice", "しりとり").await;

    room.start_challenge_vote("bob").await.unwrap();
    room.cast_vote("charlie", true).await;
    room.cast_vote("dave", true).await;

    let joined = room.joined_envelope("alice").await;
    match joined {
        shiritori_server::envelope::ServerEnvelope::RoomJoined { players, .. } => {
            let alice = players.iter().find(|p| p.name == "alice").unwrap();
            assert_eq!(alice.score, 1);
            assert_eq!(alice.lives, 3);
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
    // Turn advances past alice to the next alive player.
    assert_ne!(room.current_turn().await.as_deref(), Some("alice"));
}

/// Scenario 4: a word outside the allowed rows is a penalty, not a turn
/// advance, and the current word stays unchanged.
#[tokio::test]
async fn scenario_allowed_rows_penalty() {
    let manager = RoomManager::new();
    let mut s = settings("room");
    s.allowed_rows = vec!["あ行".to_string(), "か行".to_string()];
    let room = manager.create_room("room", "alice", s);
    manager.track_player("alice", &room.id);
    let (tx, _rx) = mpsc::channel(256);
    room.add_player("alice", tx).await.unwrap();
    join_all(&manager, &room, &["alice", "bob"]).await;

    room.start_game("alice", None).await.unwrap();
    room.submit_word("alice", "あき").await;
    room.submit_word("bob", "きた").await;

    assert_eq!(room.current_turn().await.as_deref(), Some("bob"));
}

/// Scenario 5: a genre vote that resolves accepted applies the word exactly
/// as an `OK` submission would have.
#[tokio::test]
async fn scenario_genre_vote_accepted_applies_word() {
    let manager = RoomManager::new();
    let mut s = settings("room");
    s.genre = "食べ物".to_string();
    let room = manager.create_room("room", "alice", s);
    manager.track_player("alice", &room.id);
    let (tx, _rx) = mpsc::channel(256);
    room.add_player("alice", tx).await.unwrap();
    join_all(&manager, &room, &["alice", "bob"]).await;

    room.start_game("alice", None).await.unwrap();
    room.submit_word("alice", "でたらめ").await;
    room.cast_vote("bob", true).await;

    assert_eq!(room.current_turn().await.as_deref(), Some("bob"));
}

/// Scenario 6: an empty room is removed only once the grace window has
/// elapsed; joining before then clears the staleness.
#[tokio::test(start_paused = true)]
async fn scenario_room_idle_sweep() {
    let manager = Arc::new(RoomManager::new());
    let room = manager.create_room("room", "alice", settings("room"));
    manager.track_player("alice", &room.id);
    let (tx, _rx) = mpsc::channel(256);
    room.add_player("alice", tx).await.unwrap();
    manager.untrack_player("alice");
    room.remove_player("alice").await;

    tokio::time::advance(Duration::from_secs(301)).await;
    manager.sweep_once(Duration::from_secs(300)).await;
    assert!(manager.get_room(&room.id).is_none());
}

/// Mirrors scenario 6's "join before grace expires" half, against a fresh
/// room so the first room's removal doesn't interfere.
#[tokio::test(start_paused = true)]
async fn scenario_room_idle_sweep_cleared_by_rejoin() {
    let manager = Arc::new(RoomManager::new());
    let room = manager.create_room("room", "alice", settings("room"));
    manager.track_player("alice", &room.id);
    let (tx, _rx) = mpsc::channel(256);
    room.add_player("alice", tx).await.unwrap();
    manager.untrack_player("alice");
    room.remove_player("alice").await;

    tokio::time::advance(Duration::from_secs(100)).await;
    manager.track_player("alice", &room.id);
    let (tx2, _rx2) = mpsc::channel(256);
    room.add_player("alice", tx2).await.unwrap();

    tokio::time::advance(Duration::from_secs(301)).await;
    manager.sweep_once(Duration::from_secs(300)).await;
    assert!(manager.get_room(&room.id).is_some());
}

/// A timed-out turn ends the game and invokes the game-over sink exactly
/// once, naming the player whose turn it was as the loser.
#[tokio::test(start_paused = true)]
async fn turn_timeout_ends_game_via_sink() {
    let count = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(RecordingSink {
        payloads: std::sync::Mutex::new(Vec::new()),
        count: Arc::clone(&count),
    });

    let mut s = settings("room");
    s.time_limit = 3;
    let room = Arc::new(Room::with_sink(
        "abc123".to_string(),
        "room".to_string(),
        "alice".to_string(),
        s,
        sink.clone(),
    ));
    let (tx_a, _rx_a) = mpsc::channel(256);
    let (tx_b, _rx_b) = mpsc::channel(256);
    room.add_player("alice", tx_a).await.unwrap();
    room.add_player("bob", tx_b).await.unwrap();
    room.start_game("alice", None).await.unwrap();

    tokio::time::advance(Duration::from_secs(4)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!room.status_is_playing().await);

    let payloads = sink.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].loser.as_deref(), Some("alice"));
    assert_eq!(payloads[0].reason, "タイムアップ");
}
