//! Message matcher: decides whether a chat feed batch proves a code was posted.
//!
//! Pure functions only: callers pass the batch, the code, the current time and
//! the freshness window. Nothing here performs I/O or keeps state between calls.
//!
//! Two rules keep false positives out:
//! - **Exact match**: the trimmed message text must equal the trimmed code.
//!   A sentence that merely contains the code does not count.
//! - **Freshness**: the message must be dated within the window around `now`,
//!   so an old post of a previously-issued code cannot be replayed.

pub mod matcher;
pub mod message;

pub use matcher::{
    find_verification_code, find_verification_code_excluding, is_fresh, text_matches_code,
    DEFAULT_FRESHNESS_WINDOW,
};
pub use message::{
    normalize_username, parse_message, MatchKey, ParsedChatMessage, VerificationCodeMatch,
};
