//! Token normalization policies
//!
//! Two policies coexist and are not interchangeable: the frequency policy
//! keeps digits and letters of every script, while the unique policy only
//! matches Latin and Cyrillic letters plus the apostrophe.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static UNIQUE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-zА-Яа-яІіЇїЄє']+").expect("valid unique-word regex"));

/// Which normalization to apply to raw text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPolicy {
    /// Split on whitespace, lower-case, strip everything but word characters
    Frequency,
    /// Lower-case, then match runs of Latin/Cyrillic letters and apostrophes
    Unique,
}

/// Tokenize `text` with the given policy. Empty input yields no tokens.
pub fn tokenize(text: &str, policy: TokenPolicy) -> Vec<String> {
    match policy {
        TokenPolicy::Frequency => frequency_tokens(text).collect(),
        TokenPolicy::Unique => unique_tokens(text),
    }
}

/// Letters and numerals of any script, plus `_`.
///
/// Combining marks and connector punctuation other than `_` are not word
/// characters.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Normalize one whitespace-free piece; `None` when nothing survives stripping.
pub fn normalize_piece(piece: &str) -> Option<String> {
    let cleaned: String = piece
        .to_lowercase()
        .chars()
        .filter(|c| is_word_char(*c))
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

pub fn frequency_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().filter_map(normalize_piece)
}

pub fn unique_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    UNIQUE_WORD
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}
