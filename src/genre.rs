//! In-memory genre word lists (C2).
//!
//! Word lists are plain text, one hiragana word per line, compiled into the
//! binary via `include_str!` — the same technique the teacher uses for its
//! dictionary (`include_bytes!` of a JSONL file) and that the pack's
//! `lexi_wars::engine` uses for its `dictionary.json`.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// The literal string that means "no genre restriction" in Japanese.
pub const NO_GENRE: &str = "なし";

const ANIMALS: &str = include_str!("../assets/genres/animals.txt");
const FOOD: &str = include_str!("../assets/genres/food.txt");
const COUNTRIES: &str = include_str!("../assets/genres/countries.txt");

/// Process-wide singleton: parsed once on first use, read-only thereafter
/// (§9 "global mutable state"). The engine consults this on every word
/// submission, so re-parsing the embedded lists per call isn't an option.
pub static DICTIONARY: LazyLock<GenreDictionary> = LazyLock::new(GenreDictionary::load);

/// Read-only, process-wide genre dictionary. Built once at startup and
/// shared without synchronization thereafter (§9 "global mutable state").
pub struct GenreDictionary {
    genres: HashMap<String, HashSet<String>>,
}

impl GenreDictionary {
    /// Loads the built-in genre lists.
    pub fn load() -> Self {
        let mut genres = HashMap::new();
        genres.insert("動物".to_string(), parse_list(ANIMALS));
        genres.insert("食べ物".to_string(), parse_list(FOOD));
        genres.insert("国".to_string(), parse_list(COUNTRIES));
        GenreDictionary { genres }
    }

    /// True if `genre` imposes no restriction, or `hiragana` is a member of
    /// the named genre's word set. Unknown genres accept any word.
    pub fn is_word_in_genre(&self, hiragana: &str, genre: &str) -> bool {
        if genre.is_empty() || genre == NO_GENRE {
            return true;
        }

        match self.genres.get(genre) {
            Some(words) => words.contains(hiragana),
            None => true,
        }
    }

    /// The labels of every genre this dictionary knows about, for the
    /// `get_genres` response's informational listing.
    pub fn labels(&self) -> Vec<&str> {
        self.genres.keys().map(String::as_str).collect()
    }
}

fn parse_list(raw: &str) -> HashSet<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_nashi_accepts_anything() {
        let dict = GenreDictionary::load();
        assert!(dict.is_word_in_genre("でたらめ", ""));
        assert!(dict.is_word_in_genre("でたらめ", NO_GENRE));
    }

    #[test]
    fn unknown_genre_accepts_anything() {
        let dict = GenreDictionary::load();
        assert!(dict.is_word_in_genre("でたらめ", "未知のジャンル"));
    }

    #[test]
    fn known_genre_requires_membership() {
        let dict = GenreDictionary::load();
        assert!(dict.is_word_in_genre("いぬ", "動物"));
        assert!(!dict.is_word_in_genre("りんご", "動物"));
    }
}
