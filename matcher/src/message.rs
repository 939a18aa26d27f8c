//! Normalised views of feed messages and the matcher's verdict.

use serde::{Deserialize, Serialize};
use settle_types::RawChatMessage;

/// Longest language tag stripped from a feed username.
const MAX_LANGUAGE_PREFIX_CHARS: usize = 3;

/// A feed message with the language tag removed from its author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedChatMessage {
    /// Author exactly as reported, e.g. `"en/Alice"`.
    pub raw_username: String,
    /// Author with the language prefix stripped, e.g. `"Alice"`.
    pub username: String,
    pub text: String,
    pub timestamp: String,
}

/// Outcome of scanning one batch for a code.
///
/// `found == false` is an ordinary "not yet" answer, distinct from a failed
/// feed fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCodeMatch {
    pub found: bool,
    pub username: Option<String>,
    pub timestamp: Option<String>,
}

impl VerificationCodeMatch {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn hit(message: &ParsedChatMessage) -> Self {
        Self {
            found: true,
            username: Some(message.username.clone()),
            timestamp: Some(message.timestamp.clone()),
        }
    }

    /// Identity of the matched post, if any.
    pub fn key(&self) -> Option<MatchKey> {
        match (&self.username, &self.timestamp) {
            (Some(username), Some(timestamp)) if self.found => Some(MatchKey {
                username: username.clone(),
                timestamp: timestamp.clone(),
            }),
            _ => None,
        }
    }
}

/// Identifies one specific post: who posted it and when.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub username: String,
    pub timestamp: String,
}

impl MatchKey {
    pub fn of(message: &ParsedChatMessage) -> Self {
        Self {
            username: message.username.clone(),
            timestamp: message.timestamp.clone(),
        }
    }
}

/// Strip a `"<lang>/"` prefix of 1–3 characters from a feed username.
///
/// Usernames without such a prefix are returned unchanged.
pub fn normalize_username(raw: &str) -> &str {
    match raw.split_once('/') {
        Some((prefix, rest))
            if (1..=MAX_LANGUAGE_PREFIX_CHARS).contains(&prefix.chars().count()) =>
        {
            rest
        }
        _ => raw,
    }
}

pub fn parse_message(raw: &RawChatMessage) -> ParsedChatMessage {
    ParsedChatMessage {
        raw_username: raw.username.clone(),
        username: normalize_username(&raw.username).to_string(),
        text: raw.text.clone(),
        timestamp: raw.timestamp.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_short_language_prefixes() {
        assert_eq!(normalize_username("en/Alice"), "Alice");
        assert_eq!(normalize_username("d/Alice"), "Alice");
        assert_eq!(normalize_username("zho/Alice"), "Alice");
    }

    #[test]
    fn leaves_untagged_names_alone() {
        assert_eq!(normalize_username("Alice"), "Alice");
        assert_eq!(normalize_username("/Alice"), "/Alice");
        assert_eq!(normalize_username("guild/Alice"), "guild/Alice");
    }

    #[test]
    fn strips_only_the_first_segment() {
        assert_eq!(normalize_username("en/Al/ice"), "Al/ice");
    }

    #[test]
    fn parse_keeps_raw_author() {
        let parsed = parse_message(&RawChatMessage::new("de/Bob", "hallo", "1700000000"));
        assert_eq!(parsed.raw_username, "de/Bob");
        assert_eq!(parsed.username, "Bob");
        assert_eq!(parsed.text, "hallo");
    }

    #[test]
    fn miss_has_no_key() {
        assert_eq!(VerificationCodeMatch::not_found().key(), None);
    }
}
