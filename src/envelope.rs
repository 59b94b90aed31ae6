//! The wire format (§6): `ClientEnvelope` decodes inbound JSON, `ServerEnvelope`
//! encodes everything the room/connection layer sends back out.
//!
//! Both are `serde`-tagged enums (`#[serde(tag = "type")]`), the same shape
//! the pack's server examples (`archforge`, `stacks-wars`) use for their own
//! protocol messages, generalized here to every message type named in §6.

use serde::{Deserialize, Serialize};

use crate::engine::{HistoryEntry, Settings};
use crate::room_manager::RoomSummary;
use crate::vote::VoteKind;

/// A message arriving from a client connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    GetRooms,
    GetGenres,
    CreateRoom {
        name: String,
        settings: Settings,
    },
    Join {
        name: String,
        #[serde(rename = "roomId")]
        room_id: String,
    },
    LeaveRoom,
    StartGame {
        settings: Option<Settings>,
    },
    Answer {
        word: String,
    },
    Vote {
        accept: bool,
    },
    Challenge,
    Rebuttal {
        rebuttal: String,
    },
    WithdrawChallenge,
    Ping,
}

/// A player's public score/lives snapshot, as listed in `player_list` and
/// room snapshots.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub name: String,
    pub score: u32,
    pub lives: u32,
}

/// Payload of `vote_request`/`vote_update`/`vote_result`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    pub vote_type: VoteKind,
    pub word: String,
    pub player: String,
    pub challenger: Option<String>,
    pub reason: String,
    pub votes_cast: usize,
    pub votes_needed: usize,
}

impl Serialize for VoteKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            VoteKind::Genre => "genre",
            VoteKind::Challenge => "challenge",
        };
        serializer.serialize_str(s)
    }
}

/// A message the server sends to one or more clients. Sent through each
/// player's mpsc channel as a typed value — the writer task (C9) is the one
/// place that serializes it to JSON, not the room.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEnvelope {
    Rooms {
        rooms: Vec<RoomSummary>,
    },
    /// Field name is `kanaRows` verbatim per the `get_genres` contract: the
    /// ten row labels (あ行…わ行) a room's `allowedRows` setting can name.
    /// `genres` carries the separate built-in word-list names (動物/食べ物/国)
    /// a room's `genre` setting can name.
    Genres {
        #[serde(rename = "kanaRows")]
        kana_rows: Vec<String>,
        genres: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        id: String,
        name: String,
        owner: String,
        status: String,
        settings: Settings,
        players: Vec<PlayerInfo>,
        you: String,
    },
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    PlayerList {
        players: Vec<PlayerInfo>,
    },
    #[serde(rename_all = "camelCase")]
    GameStarted {
        turn_order: Vec<String>,
        current_turn: String,
        history: Vec<HistoryEntry>,
    },
    #[serde(rename_all = "camelCase")]
    WordAccepted {
        word: String,
        player: String,
        history: Vec<HistoryEntry>,
        scores: Vec<PlayerInfo>,
        current_turn: String,
    },
    #[serde(rename_all = "camelCase")]
    AnswerRejected {
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Timer {
        left: u64,
    },
    #[serde(rename_all = "camelCase")]
    GameOver {
        reason: String,
        loser: Option<String>,
        winner: Option<String>,
        scores: Vec<PlayerInfo>,
        history: Vec<HistoryEntry>,
    },
    VoteRequest(VotePayload),
    VoteUpdate(VotePayload),
    #[serde(rename_all = "camelCase")]
    VoteResult {
        #[serde(flatten)]
        vote: VotePayload,
        accepted: bool,
        reverted: bool,
        word: String,
        current_turn: Option<String>,
        history: Option<Vec<HistoryEntry>>,
        scores: Option<Vec<PlayerInfo>>,
        penalty_player: Option<String>,
        penalty_lives: Option<u32>,
        eliminated: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Rebuttal {
        player: String,
        rebuttal: String,
    },
    ChallengeWithdrawn,
    #[serde(rename_all = "camelCase")]
    Penalty {
        player: String,
        reason: String,
        lives: u32,
        all_lives: Vec<PlayerInfo>,
    },
    #[serde(rename_all = "camelCase")]
    TurnUpdate {
        current_turn: String,
    },
    #[serde(rename_all = "camelCase")]
    SettingsUpdated {
        settings: Settings,
    },
    Error {
        reason: String,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_envelope_tags_snake_case_types() {
        let json = r#"{"type":"create_room","name":"alice","settings":{"name":"room"}}"#;
        let parsed: ClientEnvelope = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, ClientEnvelope::CreateRoom { .. }));
    }

    #[test]
    fn join_decodes_camelcase_room_id() {
        let json = r#"{"type":"join","name":"bob","roomId":"ab12cd"}"#;
        let parsed: ClientEnvelope = serde_json::from_str(json).unwrap();
        match parsed {
            ClientEnvelope::Join { name, room_id } => {
                assert_eq!(name, "bob");
                assert_eq!(room_id, "ab12cd");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        let json = r#"{"type":"does_not_exist"}"#;
        assert!(serde_json::from_str::<ClientEnvelope>(json).is_err());
    }

    #[test]
    fn error_envelope_serializes_with_tag() {
        let env = ServerEnvelope::Error {
            reason: "boom".to_string(),
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""reason":"boom""#));
    }

    #[test]
    fn pong_serializes_without_body() {
        let json = serde_json::to_string(&ServerEnvelope::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
