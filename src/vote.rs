//! In-room voting subsystem (C5): genre votes and challenge votes.
//!
//! Resolution tallying is a pure function over `(votes, eligible_voters)`
//! so it's unit-testable without a `Room` or `GameEngine` in the loop.

use std::collections::HashMap;

/// Which protocol a pending vote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Genre,
    Challenge,
}

/// A single in-flight vote. At most one exists per room at a time.
#[derive(Debug, Clone)]
pub struct PendingVote {
    pub kind: VoteKind,
    /// The word as submitted (not hiragana-normalized).
    pub word: String,
    pub hiragana: String,
    /// The player who submitted `word`.
    pub player: String,
    /// Set only for challenge votes: the player who raised the challenge.
    pub challenger: Option<String>,
    pub votes: HashMap<String, bool>,
    pub reason: String,
    pub resolved: bool,
}

impl PendingVote {
    /// Number of voters eligible to cast a ballot: every room player,
    /// except the challenged player (`self.player`) in a challenge vote.
    pub(crate) fn eligible_count(&self, room_players: &[String]) -> usize {
        room_players
            .iter()
            .filter(|name| !(self.kind == VoteKind::Challenge && name.as_str() == self.player))
            .count()
    }
}

/// The outcome of a resolved vote, for the room to apply as side effects.
#[derive(Debug, Clone)]
pub struct VoteResolution {
    pub kind: VoteKind,
    pub word: String,
    pub hiragana: String,
    pub player: String,
    pub challenger: Option<String>,
    pub accepted: bool,
    /// True only for a challenge vote that was *not* accepted — the engine
    /// must revert the challenged word.
    pub reverted: bool,
}

/// Failure modes for starting a challenge vote (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeVoteError {
    #[error("game is not in progress")]
    NotPlaying,
    #[error("a vote is already pending")]
    VotePending,
    #[error("there is no word to challenge")]
    HistoryEmpty,
    #[error("challenger is not in the room")]
    ChallengerNotInRoom,
    #[error("you cannot challenge your own word")]
    SelfChallenge,
}

/// Single-slot vote state machine owned by a `Room`.
#[derive(Default)]
pub struct VoteManager {
    pending: Option<PendingVote>,
}

impl VoteManager {
    pub fn new() -> Self {
        VoteManager { pending: None }
    }

    pub fn pending(&self) -> Option<&PendingVote> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|v| !v.resolved)
    }

    /// Starts a challenge vote. `is_playing` and `history_last` come from
    /// the engine; `player_exists` checks the room's name index.
    #[allow(clippy::too_many_arguments)]
    pub fn start_challenge_vote(
        &mut self,
        challenger: &str,
        is_playing: bool,
        last_word: Option<(&str, &str, &str)>, // (word, hiragana, submitter)
        player_exists: bool,
    ) -> Result<&PendingVote, ChallengeVoteError> {
        if !is_playing {
            return Err(ChallengeVoteError::NotPlaying);
        }
        if self.has_pending() {
            return Err(ChallengeVoteError::VotePending);
        }
        let Some((word, hiragana, submitter)) = last_word else {
            return Err(ChallengeVoteError::HistoryEmpty);
        };
        if !player_exists {
            return Err(ChallengeVoteError::ChallengerNotInRoom);
        }
        if submitter == challenger {
            return Err(ChallengeVoteError::SelfChallenge);
        }

        let mut votes = HashMap::new();
        votes.insert(challenger.to_string(), false);

        self.pending = Some(PendingVote {
            kind: VoteKind::Challenge,
            word: word.to_string(),
            hiragana: hiragana.to_string(),
            player: submitter.to_string(),
            challenger: Some(challenger.to_string()),
            votes,
            reason: format!("「{word}」は存在しない単語かもしれません"),
            resolved: false,
        });

        Ok(self.pending.as_ref().unwrap())
    }

    /// Starts a genre vote. Called by the engine when a word otherwise
    /// passes but fails genre membership with >= 2 players in the room.
    pub fn start_genre_vote(&mut self, word: &str, hiragana: &str, submitter: &str, genre: &str) {
        let mut votes = HashMap::new();
        votes.insert(submitter.to_string(), true);

        self.pending = Some(PendingVote {
            kind: VoteKind::Genre,
            word: word.to_string(),
            hiragana: hiragana.to_string(),
            player: submitter.to_string(),
            challenger: None,
            votes,
            reason: format!("「{word}」はジャンル「{genre}」のリストにありません"),
            resolved: false,
        });
    }

    /// Records a ballot. No-op (returns `None`, meaning "not yet resolved
    /// and nothing changed") in every invalid case named by §4.5. Returns
    /// `Some(resolution)` once the ballot completes the vote.
    pub fn cast_vote(
        &mut self,
        name: &str,
        accept: bool,
        room_players: &[String],
    ) -> Option<VoteResolution> {
        let pending = self.pending.as_mut()?;
        if pending.resolved {
            return None;
        }
        if !room_players.iter().any(|p| p == name) {
            return None;
        }
        if pending.kind == VoteKind::Challenge && name == pending.player {
            return None;
        }

        pending.votes.insert(name.to_string(), accept);

        let eligible = pending.eligible_count(room_players);
        if pending.votes.len() >= eligible {
            self.force_resolve(room_players)
        } else {
            None
        }
    }

    /// Resolves whatever ballots exist right now, treating missing eligible
    /// voters as rejections. Used both by ballot-completion and by the
    /// 15s timeout path. A no-op if there's no pending vote or it's
    /// already resolved.
    pub fn force_resolve(&mut self, room_players: &[String]) -> Option<VoteResolution> {
        let pending = self.pending.as_mut()?;
        if pending.resolved {
            return None;
        }

        let eligible_names: Vec<&String> = room_players
            .iter()
            .filter(|name| !(pending.kind == VoteKind::Challenge && *name == &pending.player))
            .collect();

        let (mut accept, mut reject) = (0usize, 0usize);
        for name in &eligible_names {
            match pending.votes.get(name.as_str()) {
                Some(true) => accept += 1,
                _ => reject += 1,
            }
        }

        let accepted = accept > reject;
        let reverted = pending.kind == VoteKind::Challenge && !accepted;

        let resolution = VoteResolution {
            kind: pending.kind,
            word: pending.word.clone(),
            hiragana: pending.hiragana.clone(),
            player: pending.player.clone(),
            challenger: pending.challenger.clone(),
            accepted,
            reverted,
        };

        pending.resolved = true;
        self.pending = None;

        Some(resolution)
    }

    /// Succeeds only for the active challenger of a pending challenge vote.
    /// Clears the vote with no side effects on game state.
    pub fn withdraw_challenge(&mut self, name: &str) -> bool {
        let is_active_challenger = self
            .pending
            .as_ref()
            .is_some_and(|v| v.kind == VoteKind::Challenge && !v.resolved && v.challenger.as_deref() == Some(name));

        if is_active_challenger {
            self.pending = None;
        }
        is_active_challenger
    }

    /// Discards any pending vote unconditionally.
    pub fn clear(&mut self) {
        self.pending = None;
    }
}
