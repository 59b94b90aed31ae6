//! Concurrent room registry (C8).
//!
//! `dashmap` is the teacher's own dependency, used there for
//! `Manager::sessions: Arc<DashMap<UserId, Sender<GameMessage>>>` — a
//! concurrent registry keyed by identity, mutated from many connection
//! tasks. Reused here verbatim for the identical shape, generalized from
//! `UserId` to a room ID / display name.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::engine::Settings;
use crate::envelope::PlayerInfo;
use crate::room::Room;

/// A non-private room's public listing entry for `get_rooms`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub status: String,
    pub player_count: usize,
    pub max_players: u32,
    pub settings: Settings,
}

/// The `GET /room/{id}` invite-card snapshot (§6). Unlike [`RoomSummary`]
/// (which backs the `get_rooms` listing and hides private rooms), this is
/// served for any room ID, private or not — `private` only hides a room
/// from the public listing, not from someone holding a direct link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub status: String,
    pub player_count: usize,
    pub settings: Settings,
    pub players: Vec<PlayerInfo>,
}

/// Process-wide registry of active rooms and the cross-connection display
/// name index (§3's "RoomManager").
pub struct RoomManager {
    rooms: DashMap<String, Arc<Room>>,
    names: DashMap<String, String>,
    sweep_stop: Arc<AtomicBool>,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomManager {
    pub fn new() -> Self {
        RoomManager {
            rooms: DashMap::new(),
            names: DashMap::new(),
            sweep_stop: Arc::new(AtomicBool::new(false)),
            sweeper: std::sync::Mutex::new(None),
        }
    }

    /// Generates a fresh 6-char lowercase-alphanumeric room ID, retried on
    /// collision against the current map (§6).
    fn fresh_room_id(&self) -> String {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        loop {
            let id: String = {
                let mut rng = rand::rng();
                (0..6)
                    .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
                    .collect()
            };
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }

    /// Creates a room owned by `owner`, storing it under a freshly minted ID.
    pub fn create_room(&self, name: &str, owner: &str, settings: Settings) -> Arc<Room> {
        let id = self.fresh_room_id();
        let room = Arc::new(Room::new(id.clone(), name.to_string(), owner.to_string(), settings));
        self.rooms.insert(id, Arc::clone(&room));
        room
    }

    pub fn get_room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn remove_room(&self, id: &str) {
        self.rooms.remove(id);
    }

    /// A snapshot of every non-private room, for `get_rooms`.
    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut out = Vec::new();
        for entry in self.rooms.iter() {
            let room = Arc::clone(entry.value());
            if let Some(summary) = room.summary().await {
                out.push(summary);
            }
        }
        out
    }

    /// Registers `name` as present in `room_id`. Fails if `name` is already
    /// tracked anywhere.
    pub fn track_player(&self, name: &str, room_id: &str) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(room_id.to_string());
                true
            }
        }
    }

    pub fn untrack_player(&self, name: &str) {
        self.names.remove(name);
    }

    pub fn player_room_id(&self, name: &str) -> Option<String> {
        self.names.get(name).map(|r| r.value().clone())
    }

    /// Launches the background sweeper: every `interval`, removes rooms
    /// whose `empty_since` is older than `max_empty_age`. Idempotent —
    /// calling twice replaces the prior driver.
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration, max_empty_age: Duration) {
        self.sweep_stop.store(false, Ordering::SeqCst);
        let manager = Arc::clone(self);
        let stop = Arc::clone(&self.sweep_stop);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                manager.sweep_once(max_empty_age).await;
            }
        });

        if let Some(old) = self.sweeper.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    /// One sweep pass, exposed directly so tests can drive it without
    /// waiting on the real interval.
    pub async fn sweep_once(&self, max_empty_age: Duration) {
        let now = Instant::now();
        let mut stale = Vec::new();
        for entry in self.rooms.iter() {
            if entry.value().is_stale(now, max_empty_age).await {
                stale.push(entry.key().clone());
            }
        }
        for id in stale {
            tracing::info!(room_id = %id, "sweeping idle room");
            self.rooms.remove(&id);
        }
    }

    pub fn stop_cleanup(&self) {
        self.sweep_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Settings;
    use std::time::Duration as StdDuration;

    fn settings() -> Settings {
        Settings {
            name: "room".to_string(),
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

    #[test]
    fn fresh_room_ids_are_six_chars() {
        let manager = RoomManager::new();
        let room = manager.create_room("room", "alice", settings());
        assert_eq!(room.id.len(), 6);
    }

    #[test]
    fn track_player_rejects_duplicate_name() {
        let manager = RoomManager::new();
        assert!(manager.track_player("alice", "room1"));
        assert!(!manager.track_player("alice", "room2"));
        assert_eq!(manager.player_room_id("alice").as_deref(), Some("room1"));
        manager.untrack_player("alice");
        assert!(manager.track_player("alice", "room2"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_stale_rooms_only() {
        let manager = Arc::new(RoomManager::new());
        let room = manager.create_room("room", "alice", settings());
        room.add_player("alice", tokio::sync::mpsc::channel(4).0).await.unwrap();
        room.remove_player("alice").await;

        tokio::time::advance(StdDuration::from_secs(10)).await;
        manager.sweep_once(StdDuration::from_secs(300)).await;
        assert!(manager.get_room(&room.id).is_some(), "not yet past grace");

        tokio::time::advance(StdDuration::from_secs(301)).await;
        manager.sweep_once(StdDuration::from_secs(300)).await;
        assert!(manager.get_room(&room.id).is_none());
    }
}
