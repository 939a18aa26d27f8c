//! Code search over a feed batch.

use std::collections::HashSet;
use std::time::Duration;

use settle_types::{RawChatMessage, Timestamp};

use crate::message::{parse_message, MatchKey, VerificationCodeMatch};

/// How old a matching post may be and still count as proof.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Exact comparison after trimming both sides. An empty code matches nothing.
pub fn text_matches_code(text: &str, code: &str) -> bool {
    let code = code.trim();
    !code.is_empty() && text.trim() == code
}

/// Whether a feed timestamp lies within `window` of `now`.
///
/// Posts dated slightly in the future (feed clock ahead of ours) are accepted
/// under the same bound. Unparseable timestamps are never fresh.
pub fn is_fresh(timestamp: &str, now: Timestamp, window: Duration) -> bool {
    let Ok(posted) = Timestamp::parse(timestamp) else {
        return false;
    };
    let window = window.as_secs();
    if posted <= now {
        posted.elapsed_since(now) <= window
    } else {
        posted.secs_until(now) <= window
    }
}

/// Scan the whole batch and return the first fresh, exact match.
///
/// No ordering of the feed is assumed.
pub fn find_verification_code(
    messages: &[RawChatMessage],
    code: &str,
    now: Timestamp,
    freshness_window: Duration,
) -> VerificationCodeMatch {
    find_verification_code_excluding(messages, code, now, freshness_window, &HashSet::new())
}

/// Like [`find_verification_code`], but skips posts listed in `excluded`.
///
/// The controller uses this to step past a post the authority already
/// rejected as the wrong character, so it cannot shadow a later correct one.
pub fn find_verification_code_excluding(
    messages: &[RawChatMessage],
    code: &str,
    now: Timestamp,
    freshness_window: Duration,
    excluded: &HashSet<MatchKey>,
) -> VerificationCodeMatch {
    messages
        .iter()
        .filter(|raw| text_matches_code(&raw.text, code))
        .filter(|raw| is_fresh(&raw.timestamp, now, freshness_window))
        .map(parse_message)
        .find(|parsed| !excluded.contains(&MatchKey::of(parsed)))
        .map(|parsed| VerificationCodeMatch::hit(&parsed))
        .unwrap_or_else(VerificationCodeMatch::not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_714_564_800;

    fn now() -> Timestamp {
        Timestamp::new(NOW)
    }

    fn msg(user: &str, text: &str, secs: u64) -> RawChatMessage {
        RawChatMessage::new(user, text, Timestamp::new(secs).to_rfc3339())
    }

    #[test]
    fn exact_fresh_post_is_found() {
        let batch = vec![msg("en/Alice", "7f3a", NOW)];
        let hit = find_verification_code(&batch, "7f3a", now(), DEFAULT_FRESHNESS_WINDOW);
        assert!(hit.found);
        assert_eq!(hit.username.as_deref(), Some("Alice"));
        assert_eq!(hit.timestamp, Some(Timestamp::new(NOW).to_rfc3339()));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let batch = vec![msg("en/Alice", "  7f3a\n", NOW)];
        assert!(find_verification_code(&batch, " 7f3a ", now(), DEFAULT_FRESHNESS_WINDOW).found);
    }

    #[test]
    fn substring_is_rejected() {
        let batch = vec![
            msg("en/Alice", "my code is 7f3a", NOW),
            msg("en/Alice", "7f3a7f3a", NOW),
            msg("en/Alice", "7F3A", NOW),
        ];
        let hit = find_verification_code(&batch, "7f3a", now(), DEFAULT_FRESHNESS_WINDOW);
        assert_eq!(hit, VerificationCodeMatch::not_found());
    }

    #[test]
    fn stale_post_is_rejected() {
        let batch = vec![msg("en/Alice", "7f3a", NOW - 301)];
        assert!(!find_verification_code(&batch, "7f3a", now(), DEFAULT_FRESHNESS_WINDOW).found);
    }

    #[test]
    fn post_at_window_edge_is_accepted() {
        let batch = vec![msg("en/Alice", "7f3a", NOW - 300)];
        assert!(find_verification_code(&batch, "7f3a", now(), DEFAULT_FRESHNESS_WINDOW).found);
    }

    #[test]
    fn small_future_skew_is_tolerated() {
        assert!(is_fresh(&Timestamp::new(NOW + 30).to_rfc3339(), now(), DEFAULT_FRESHNESS_WINDOW));
        assert!(!is_fresh(&Timestamp::new(NOW + 600).to_rfc3339(), now(), DEFAULT_FRESHNESS_WINDOW));
    }

    #[test]
    fn unparseable_timestamp_is_never_fresh() {
        let batch = vec![RawChatMessage::new("en/Alice", "7f3a", "soon")];
        assert!(!find_verification_code(&batch, "7f3a", now(), DEFAULT_FRESHNESS_WINDOW).found);
    }

    #[test]
    fn scans_past_stale_and_inexact_entries() {
        let batch = vec![
            msg("en/Mallory", "7f3a", NOW - 3_600),
            msg("en/Eve", "is it 7f3a?", NOW),
            msg("fr/Alice", "7f3a", NOW - 10),
            msg("en/Bob", "7f3a", NOW),
        ];
        let hit = find_verification_code(&batch, "7f3a", now(), DEFAULT_FRESHNESS_WINDOW);
        assert_eq!(hit.username.as_deref(), Some("Alice"));
    }

    #[test]
    fn excluded_post_is_skipped() {
        let batch = vec![msg("en/Bob", "7f3a", NOW - 20), msg("en/Alice", "7f3a", NOW)];
        let mut excluded = HashSet::new();
        excluded.insert(MatchKey {
            username: "Bob".into(),
            timestamp: Timestamp::new(NOW - 20).to_rfc3339(),
        });
        let hit = find_verification_code_excluding(
            &batch,
            "7f3a",
            now(),
            DEFAULT_FRESHNESS_WINDOW,
            &excluded,
        );
        assert_eq!(hit.username.as_deref(), Some("Alice"));
    }

    #[test]
    fn empty_code_never_matches() {
        let batch = vec![msg("en/Alice", "", NOW), msg("en/Alice", "   ", NOW)];
        assert!(!find_verification_code(&batch, "  ", now(), DEFAULT_FRESHNESS_WINDOW).found);
    }

    #[test]
    fn empty_batch_is_a_plain_miss() {
        let hit = find_verification_code(&[], "7f3a", now(), DEFAULT_FRESHNESS_WINDOW);
        assert_eq!(hit, VerificationCodeMatch::not_found());
    }
}
