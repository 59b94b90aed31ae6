//! Kana normalization and the shiritori chaining rule.
//!
//! Everything here is pure and data-driven: const tables checked once by
//! unit tests, no runtime-built maps. This mirrors the teacher's own
//! `reading::HIRA_CHART`/`KATA_CHART` const-chart style in `game.rs`,
//! generalized to full row/dakuten coverage.

/// Small kana that normalize to a full-size counterpart for chaining purposes.
const SMALL_KANA: [(char, char); 8] = [
    ('ゃ', 'や'),
    ('ゅ', 'ゆ'),
    ('ょ', 'よ'),
    ('ぁ', 'あ'),
    ('ぃ', 'い'),
    ('ぅ', 'う'),
    ('ぇ', 'え'),
    ('ぉ', 'お'),
];

/// `っ` and `ゎ` normalize on their own, separate from the vowel-pair table
/// above because their full-size forms aren't simply "drop the smallness".
fn normalize_small(c: char) -> char {
    match c {
        'っ' => 'つ',
        'ゎ' => 'わ',
        _ => SMALL_KANA
            .iter()
            .find(|&&(small, _)| small == c)
            .map(|&(_, full)| full)
            .unwrap_or(c),
    }
}

/// Maps a hiragana rune to the vowel it carries, for resolving a trailing
/// long-vowel mark (`ー`) against the character it extends.
fn vowel_of(c: char) -> Option<char> {
    const ROWS: [(char, [char; 5]); 10] = [
        ('あ', ['あ', 'い', 'う', 'え', 'お']),
        ('か', ['か', 'き', 'く', 'け', 'こ']),
        ('さ', ['さ', 'し', 'す', 'せ', 'そ']),
        ('た', ['た', 'ち', 'つ', 'て', 'と']),
        ('な', ['な', 'に', 'ぬ', 'ね', 'の']),
        ('は', ['は', 'ひ', 'ふ', 'へ', 'ほ']),
        ('ま', ['ま', 'み', 'む', 'め', 'も']),
        ('や', ['や', 'ゆ', 'や', 'ゆ', 'よ']),
        ('ら', ['ら', 'り', 'る', 'れ', 'ろ']),
        ('わ', ['わ', 'い', 'う', 'え', 'を']),
    ];
    const VOWELS: [char; 5] = ['あ', 'い', 'う', 'え', 'お'];

    if c == 'ん' {
        return Some('ん');
    }

    let base = dakuten_base(c).unwrap_or(c);
    for (_, row) in ROWS {
        if let Some(idx) = row.iter().position(|&r| r == base) {
            // あ-dan is its own vowel, so the row member itself is the
            // answer (e.g. た -> た); every other dan resolves to the
            // column's vowel (e.g. ぎ -> い, こ -> お).
            return Some(if idx == 0 { base } else { VOWELS[idx] });
        }
    }
    None
}

/// Strips a dakuten/handakuten variant back to its base kana, if `c` is one.
fn dakuten_base(c: char) -> Option<char> {
    const PAIRS: &[(char, char)] = &[
        ('が', 'か'),
        ('ぎ', 'き'),
        ('ぐ', 'く'),
        ('げ', 'け'),
        ('ご', 'こ'),
        ('ざ', 'さ'),
        ('じ', 'し'),
        ('ず', 'す'),
        ('ぜ', 'せ'),
        ('ぞ', 'そ'),
        ('だ', 'た'),
        ('ぢ', 'ち'),
        ('づ', 'つ'),
        ('で', 'て'),
        ('ど', 'と'),
        ('ば', 'は'),
        ('び', 'ひ'),
        ('ぶ', 'ふ'),
        ('べ', 'へ'),
        ('ぼ', 'ほ'),
        ('ぱ', 'は'),
        ('ぴ', 'ひ'),
        ('ぷ', 'ふ'),
        ('ぺ', 'へ'),
        ('ぽ', 'ほ'),
    ];
    PAIRS
        .iter()
        .find(|&&(variant, _)| variant == c)
        .map(|&(_, base)| base)
}

/// Returns true iff `c` is a dakuten or handakuten variant.
fn is_dakuten(c: char) -> bool {
    dakuten_base(c).is_some()
}

/// Converts every katakana rune in `s` to its hiragana counterpart; other
/// runes (including hiragana, `ー`, and anything else) pass through
/// unchanged.
pub fn to_hiragana(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{30A1}'..='\u{30F6}' => {
                char::from_u32(c as u32 - 0x60).unwrap_or(c)
            }
            '\u{30FD}'..='\u{30FE}' => {
                // katakana iteration marks ヽヾ -> ゝゞ
                char::from_u32(c as u32 - 0x60).unwrap_or(c)
            }
            _ => c,
        })
        .collect()
}

fn is_hiragana_rune(c: char) -> bool {
    matches!(c, '\u{3041}'..='\u{309F}')
}

fn is_katakana_rune(c: char) -> bool {
    matches!(c, '\u{30A0}'..='\u{30FF}')
}

/// True iff `s` is non-empty and every rune is hiragana, katakana, or the
/// long-vowel mark `ー`.
pub fn is_japanese(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| is_hiragana_rune(c) || is_katakana_rune(c) || c == 'ー')
}

/// The first rune of a hiragana string, with small kana normalized to their
/// full-size counterparts. `h` is assumed to already be hiragana-normalized
/// (i.e. the output of [`to_hiragana`]).
pub fn first_char(h: &str) -> Option<char> {
    h.chars().next().map(normalize_small)
}

/// The last rune relevant to shiritori chaining: a trailing long-vowel mark
/// resolves to the vowel of the preceding kana (falling back to the mark
/// itself if that kana has no known vowel), otherwise the last rune is
/// returned after small-kana normalization.
pub fn last_char(h: &str) -> Option<char> {
    let mut chars: Vec<char> = h.chars().collect();
    let last = *chars.last()?;

    if last == 'ー' {
        chars.pop();
        if let Some(&prev) = chars.last() {
            return Some(vowel_of(prev).unwrap_or('ー'));
        }
        return Some('ー');
    }

    Some(normalize_small(last))
}

/// One of the ten traditional rows of the kana syllabary.
pub const ROW_LABELS: [&str; 10] = [
    "あ行", "か行", "さ行", "た行", "な行", "は行", "ま行", "や行", "ら行", "わ行",
];

/// Returns the row label that `c` belongs to, or `None` for `ー` (skipped by
/// the row validator) or any rune outside the kana block.
pub fn row_of(c: char) -> Option<&'static str> {
    if c == 'ー' {
        return None;
    }
    if c == 'ん' {
        return Some("わ行");
    }

    let base = dakuten_base(c).unwrap_or(c);
    let base = normalize_small(base);

    const MEMBERS: [(&str, &str); 10] = [
        ("あ行", "あいうえお"),
        ("か行", "かきくけこ"),
        ("さ行", "さしすせそ"),
        ("た行", "たちつてと"),
        ("な行", "なにぬねの"),
        ("は行", "はひふへほ"),
        ("ま行", "まみむめも"),
        ("や行", "やゆよ"),
        ("ら行", "らりるれろ"),
        ("わ行", "わをん"),
    ];

    for (label, members) in MEMBERS {
        if members.contains(base) {
            return Some(label);
        }
    }
    None
}

/// Returns the first rune of `h` that falls outside `allowed`, paired with
/// its row label. An empty `allowed` means every row is permitted (returns
/// `None` unconditionally).
pub fn validate_allowed_rows(h: &str, allowed: &[String]) -> Option<(char, &'static str)> {
    if allowed.is_empty() {
        return None;
    }

    for c in h.chars() {
        if let Some(row) = row_of(c) {
            if !allowed.iter().any(|a| a == row) {
                return Some((c, row));
            }
        }
    }
    None
}

/// Returns the first dakuten/handakuten rune in `h`, if any.
pub fn validate_no_dakuten(h: &str) -> Option<char> {
    h.chars().find(|&c| is_dakuten(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn katakana_roundtrip() {
        assert_eq!(to_hiragana("リンゴ"), "りんご");
        assert_eq!(to_hiragana(&to_hiragana("リンゴ")), to_hiragana("リンゴ"));
    }

    #[test]
    fn is_japanese_rejects_empty_and_latin() {
        assert!(!is_japanese(""));
        assert!(!is_japanese("abc"));
        assert!(is_japanese("りんご"));
        assert!(is_japanese("リンゴ"));
        assert!(is_japanese("らーめん"));
    }

    #[test]
    fn last_char_long_vowel_with_trailing_n() {
        assert_eq!(last_char("らーめん"), Some('ん'));
    }

    #[test]
    fn last_char_long_vowel_resolves_preceding_vowel() {
        assert_eq!(last_char("ぎたー"), Some('た'));
    }

    #[test]
    fn last_char_normalizes_small_kana() {
        assert_eq!(last_char("ちゃ"), Some('や'));
    }

    #[test]
    fn first_char_normalizes_small_tsu_and_wa() {
        assert_eq!(first_char("っち"), Some('つ'));
        assert_eq!(first_char("ゎに"), Some('わ'));
    }

    #[test]
    fn row_membership_groups_dakuten_with_base() {
        assert_eq!(row_of('が'), Some("か行"));
        assert_eq!(row_of('ぱ'), Some("は行"));
        assert_eq!(row_of('ん'), Some("わ行"));
        assert_eq!(row_of('ー'), None);
    }

    #[test]
    fn all_rows_covered() {
        for label in ROW_LABELS {
            assert!(
                "あいうえおかきくけこさしすせそたちつてとなにぬねのはひふへほまみむめもやゆよらりるれろわをん"
                    .chars()
                    .any(|c| row_of(c) == Some(label)),
                "no member found for {label}"
            );
        }
    }

    #[test]
    fn validate_allowed_rows_flags_first_offender() {
        let allowed = vec!["あ行".to_string(), "か行".to_string()];
        assert_eq!(validate_allowed_rows("あき", &allowed), None);
        assert_eq!(
            validate_allowed_rows("きた", &allowed),
            Some(('た', "た行"))
        );
    }

    #[test]
    fn validate_allowed_rows_empty_means_unrestricted() {
        assert_eq!(validate_allowed_rows("きょうと", &[]), None);
    }

    #[test]
    fn validate_no_dakuten_flags_first_voiced_rune() {
        assert_eq!(validate_no_dakuten("かきくけこ"), None);
        assert_eq!(validate_no_dakuten("がっこう"), Some('が'));
    }
}
