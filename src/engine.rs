//! Word-validation pipeline and turn bookkeeping (C6).
//!
//! The validation pipeline is kept free of I/O or broadcast concerns —
//! `Room` (C7) alone turns an outcome into outbound messages. This mirrors
//! the teacher's own separation of pure `Question` construction from the
//! side-effecting `Menu::handle_interactions` loop in `game.rs`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::kana::{self, first_char, is_japanese, last_char, to_hiragana};

/// Per-room configuration (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub name: String,
    #[serde(default)]
    pub min_len: u32,
    #[serde(default)]
    pub max_len: u32,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub time_limit: u64,
    #[serde(default)]
    pub allowed_rows: Vec<String>,
    #[serde(default)]
    pub no_dakuten: bool,
    #[serde(default)]
    pub max_lives: u32,
    #[serde(default)]
    pub max_players: u32,
    #[serde(default)]
    pub private: bool,
}

impl Settings {
    /// Applies the `0 = default` conventions named in §3.
    pub fn normalized(mut self) -> Self {
        if self.max_lives == 0 {
            self.max_lives = 3;
        }
        if self.max_players == 0 {
            self.max_players = 8;
        }
        self
    }
}

/// Per-player score and remaining lives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PlayerState {
    pub score: u32,
    pub lives: u32,
}

/// One accepted word in the game's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub word: String,
    pub player: String,
    pub timestamp: String,
}

/// Outcome of [`GameEngine::validate_and_submit`] (§4.6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Word accepted; engine state advanced.
    Ok,
    /// Hard rejection; no state change; submitter notified only.
    Rejected(String),
    /// Genre vote required; engine unchanged.
    Vote,
    /// Word not accepted, submitter loses one life; turn does not advance.
    Penalty(String),
}

/// `(eliminated, game_over, last_survivor)` per §4.6.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elimination {
    pub eliminated: bool,
    pub game_over: bool,
    pub last_survivor: Option<String>,
}

/// Holds the per-room gameplay state (§3, §4.6).
pub struct GameEngine {
    pub settings: Settings,
    pub turn_order: Vec<String>,
    pub turn_index: usize,
    pub current_word: String,
    pub history: Vec<HistoryEntry>,
    pub used_words: HashSet<String>,
    pub players: HashMap<String, PlayerState>,
}

impl GameEngine {
    /// `turn_order` is the already-seeded order (owner first, rest
    /// shuffled) — `Room::start_game` computes that ordering; the engine
    /// just initializes life/score bookkeeping for it.
    pub fn new(settings: Settings, turn_order: Vec<String>) -> Self {
        let max_lives = settings.max_lives.max(1);
        let players = turn_order
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    PlayerState {
                        score: 0,
                        lives: max_lives,
                    },
                )
            })
            .collect();

        GameEngine {
            settings,
            turn_order,
            turn_index: 0,
            current_word: String::new(),
            history: Vec::new(),
            used_words: HashSet::new(),
            players,
        }
    }

    pub fn current_player(&self) -> Option<&str> {
        self.turn_order.get(self.turn_index).map(String::as_str)
    }

    /// Inserts a newcomer mid-game at the end of the turn order with a
    /// full life count and score 0.
    pub fn add_player(&mut self, name: &str) {
        let max_lives = self.settings.max_lives.max(1);
        self.players.insert(
            name.to_string(),
            PlayerState {
                score: 0,
                lives: max_lives,
            },
        );
        self.turn_order.push(name.to_string());
    }

    /// Removes `name`'s record and splices them out of the turn order,
    /// resetting the cursor to 0 if it falls out of range.
    pub fn remove_player(&mut self, name: &str) {
        self.players.remove(name);
        if let Some(pos) = self.turn_order.iter().position(|n| n == name) {
            self.turn_order.remove(pos);
            if self.turn_index >= self.turn_order.len() {
                self.turn_index = 0;
            }
        }
    }

    fn bounds_ok(&self, word: &str) -> bool {
        let len = word.chars().count() as u32;
        (self.settings.min_len == 0 || len >= self.settings.min_len)
            && (self.settings.max_len == 0 || len <= self.settings.max_len)
    }

    /// Runs the 12-step pipeline from §4.6.1. `has_vote_pending` is
    /// supplied by the room, which consults the vote manager.
    pub fn validate_and_submit(
        &mut self,
        word: &str,
        player: &str,
        has_vote_pending: bool,
    ) -> SubmitOutcome {
        if has_vote_pending {
            return SubmitOutcome::Rejected("投票中です…".to_string());
        }

        match self.current_player() {
            Some(current) if current == player => {}
            Some(current) => {
                return SubmitOutcome::Rejected(format!("{current}さんの番です"));
            }
            None => return SubmitOutcome::Rejected("ゲームが開始されていません".to_string()),
        }

        if self.players.get(player).is_some_and(|p| p.lives == 0) {
            return SubmitOutcome::Rejected("あなたは脱落済みです".to_string());
        }

        if !is_japanese(word) {
            return SubmitOutcome::Rejected("ひらがな・カタカナのみ使用できます".to_string());
        }

        if !self.bounds_ok(word) {
            return SubmitOutcome::Rejected("文字数が条件を満たしていません".to_string());
        }

        let hiragana = to_hiragana(word);

        if !self.current_word.is_empty() {
            let expected = last_char(&to_hiragana(&self.current_word));
            let actual = first_char(&hiragana);
            if expected != actual {
                let expected_str = expected.map(|c| c.to_string()).unwrap_or_default();
                return SubmitOutcome::Rejected(format!("「{expected_str}」から始まる言葉を入力してください"));
            }
        }

        if self.used_words.contains(&hiragana) {
            return SubmitOutcome::Penalty("この言葉はすでに使われています".to_string());
        }

        if last_char(&hiragana) == Some('ん') {
            return SubmitOutcome::Penalty("「ん」で終わる言葉を使いました".to_string());
        }

        if self.settings.no_dakuten && kana::validate_no_dakuten(&hiragana).is_some() {
            return SubmitOutcome::Penalty("濁点・半濁点は使用できません".to_string());
        }

        if let Some((_, row)) = kana::validate_allowed_rows(&hiragana, &self.settings.allowed_rows) {
            return SubmitOutcome::Penalty(format!("「{row}」の言葉は使用できません"));
        }

        let genre_ok = crate::genre::DICTIONARY.is_word_in_genre(&hiragana, &self.settings.genre);
        if !genre_ok {
            if self.turn_order.len() >= 2 {
                return SubmitOutcome::Vote;
            }
            return SubmitOutcome::Rejected(format!(
                "ジャンル「{}」の言葉を入力してください",
                self.settings.genre
            ));
        }

        self.apply(word, player);
        SubmitOutcome::Ok
    }

    /// Records the word, advances history/score, and moves the turn
    /// cursor to the next alive player. Does not touch the timer — the
    /// room resets it after calling `apply`.
    pub fn apply(&mut self, word: &str, player: &str) {
        let hiragana = to_hiragana(word);
        self.used_words.insert(hiragana);
        self.current_word = word.to_string();
        self.history.push(HistoryEntry {
            word: word.to_string(),
            player: player.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        if let Some(p) = self.players.get_mut(player) {
            p.score += 1;
        }
        self.advance_turn();
    }

    /// Steps `turn_index` forward, skipping eliminated players. Stops
    /// (leaving `turn_index` unchanged) if the scan wraps back around
    /// without finding anyone alive.
    fn advance_turn(&mut self) {
        if self.turn_order.is_empty() {
            return;
        }
        let start = self.turn_index;
        let mut next = (start + 1) % self.turn_order.len();
        loop {
            if next == start {
                return;
            }
            let alive = self
                .players
                .get(&self.turn_order[next])
                .is_some_and(|p| p.lives > 0);
            if alive {
                self.turn_index = next;
                return;
            }
            next = (next + 1) % self.turn_order.len();
        }
    }

    /// Reverts the last accepted word (a challenge was upheld): drops the
    /// history entry, frees the hiragana form, rolls the turn back to the
    /// original submitter, and applies a life penalty to them.
    pub fn revert(&mut self, word: &str, submitter: &str) {
        if let Some(last) = self.history.last() {
            if last.word == word && last.player == submitter {
                self.history.pop();
            }
        }
        self.used_words.remove(&to_hiragana(word));

        if let Some(p) = self.players.get_mut(submitter) {
            p.score = p.score.saturating_sub(1);
            p.lives = p.lives.saturating_sub(1);
        }

        if let Some(pos) = self.turn_order.iter().position(|n| n == submitter) {
            self.turn_index = pos;
        }

        self.current_word = self
            .history
            .last()
            .map(|h| h.word.clone())
            .unwrap_or_default();
    }

    /// `(eliminated, game_over, last_survivor)` for `name`, given
    /// `total_players` (the room's player count at the time of the check).
    pub fn check_elimination(&self, name: &str, total_players: usize) -> Elimination {
        let eliminated = self.players.get(name).is_some_and(|p| p.lives == 0);

        let alive: Vec<&String> = self
            .turn_order
            .iter()
            .filter(|n| self.players.get(*n).is_some_and(|p| p.lives > 0))
            .collect();

        if total_players <= 1 {
            Elimination {
                eliminated,
                game_over: alive.is_empty(),
                last_survivor: None,
            }
        } else {
            let game_over = alive.len() <= 1;
            let last_survivor = if game_over {
                alive.first().map(|s| s.to_string())
            } else {
                None
            };
            Elimination {
                eliminated,
                game_over,
                last_survivor,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
        .normalized()
    }

    fn engine(players: &[&str]) -> GameEngine {
        GameEngine::new(settings(), players.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn wrong_turn_is_rejected() {
        let mut e = engine(&["alice", "bob"]);
        let outcome = e.validate_and_submit("しりとり", "bob", false);
        assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
    }

    #[test]
    fn valid_word_accepted_and_turn_advances() {
        let mut e = engine(&["alice", "bob"]);
        let outcome = e.validate_and_submit("しりとり", "alice", false);
        assert_eq!(outcome, SubmitOutcome::Ok);
        assert_eq!(e.current_player(), Some("bob"));
        assert_eq!(e.players["alice"].score, 1);
        assert_eq!(e.history.len(), 1);
    }

    #[test]
    fn ending_in_n_is_penalty_not_rejection() {
        let mut e = engine(&["alice", "bob"]);
        let outcome = e.validate_and_submit("あいうえん", "alice", false);
        assert!(matches!(outcome, SubmitOutcome::Penalty(_)));
        assert_eq!(e.current_player(), Some("alice"), "turn must not advance");
        assert_eq!(e.players["alice"].lives, 3, "room applies the life penalty, not the engine pipeline itself");
    }

    #[test]
    fn reused_word_is_penalty() {
        let mut e = engine(&["alice", "bob"]);
        e.used_words.insert("しりとり".to_string());
        let outcome = e.validate_and_submit("しりとり", "alice", false);
        assert!(matches!(outcome, SubmitOutcome::Penalty(_)));
    }

    #[test]
    fn chaining_mismatch_is_rejected() {
        let mut e = engine(&["alice", "bob"]);
        e.validate_and_submit("しりとり", "alice", false);
        let outcome = e.validate_and_submit("ねこ", "bob", false);
        assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
    }

    #[test]
    fn genre_vote_on_solo_is_rejected_not_vote() {
        let mut s = settings();
        s.genre = "動物".to_string();
        let mut e = GameEngine::new(s, vec!["alice".to_string()]);
        let outcome = e.validate_and_submit("りんご", "alice", false);
        assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
    }

    #[test]
    fn genre_mismatch_with_two_players_yields_vote() {
        let mut s = settings();
        s.genre = "動物".to_string();
        let mut e = GameEngine::new(s, vec!["alice".to_string(), "bob".to_string()]);
        let outcome = e.validate_and_submit("りんご", "alice", false);
        assert_eq!(outcome, SubmitOutcome::Vote);
    }

    #[test]
    fn revert_restores_prior_state() {
        let mut e = engine(&["alice", "bob", "charlie"]);
        e.validate_and_submit("しりとり", "alice", false);
        assert_eq!(e.players["alice"].score, 1);
        e.revert("しりとり", "alice");
        assert_eq!(e.players["alice"].score, 0);
        assert_eq!(e.players["alice"].lives, 2);
        assert_eq!(e.current_player(), Some("alice"));
        assert!(e.history.is_empty());
        assert!(e.used_words.is_empty());
        assert_eq!(e.current_word, "");
    }

    #[test]
    fn elimination_two_players_reports_last_survivor() {
        let mut e = engine(&["alice", "bob"]);
        e.players.get_mut("bob").unwrap().lives = 0;
        let result = e.check_elimination("bob", 2);
        assert!(result.eliminated);
        assert!(result.game_over);
        assert_eq!(result.last_survivor.as_deref(), Some("alice"));
    }

    #[test]
    fn elimination_solo_requires_no_one_alive() {
        let mut e = engine(&["alice"]);
        assert!(!e.check_elimination("alice", 1).game_over);
        e.players.get_mut("alice").unwrap().lives = 0;
        assert!(e.check_elimination("alice", 1).game_over);
    }

    #[test]
    fn add_and_remove_player_mid_game() {
        let mut e = engine(&["alice", "bob"]);
        e.add_player("charlie");
        assert_eq!(e.players["charlie"].lives, 3);
        assert_eq!(e.turn_order.last().map(String::as_str), Some("charlie"));

        e.turn_index = 2;
        e.remove_player("charlie");
        assert_eq!(e.turn_index, 0, "cursor resets when out of range");
    }
}
