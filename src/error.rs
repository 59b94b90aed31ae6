//! Typed error enums for the user-visible-local and fatal error classes (§7).
//!
//! `thiserror` is pulled in from the wider pack (seen in the `tenhou-db`/
//! `riichi` workspace and in several server-shaped `other_examples` files) —
//! the teacher's single hand-written `SessionAlreadyCreated` unit struct
//! doesn't scale to the variant count this system needs.

use thiserror::Error;

/// Failures from joining or creating a room, surfaced to the requesting
/// connection only as an `error` envelope.
#[derive(Debug, Clone, Error)]
pub enum JoinError {
    #[error("name is already in use")]
    NameTaken,
    #[error("room not found")]
    RoomNotFound,
    #[error("room is full")]
    RoomFull,
    #[error("name and settings are required")]
    MissingFields,
}

/// Failures specific to room operations dispatched while already joined.
#[derive(Debug, Clone, Error)]
pub enum RoomError {
    #[error("only the room owner can start the game")]
    NotOwner,
    #[error("game is already in progress")]
    AlreadyPlaying,
    #[error("no pending vote to act on")]
    NoPendingVote,
    #[error("you are not the challenged player")]
    NotChallenged,
    #[error("rebuttal text is required")]
    EmptyRebuttal,
}
