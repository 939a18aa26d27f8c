//! Shared types for the character verification core.
//!
//! Everything here is plain data or a tiny seam: timestamps, the clock
//! abstraction the matcher and controller read "now" from, and the raw
//! record shape returned by the external chat feed.

pub mod clock;
pub mod error;
pub mod message;
pub mod time;

pub use clock::{Clock, SystemClock};
pub use error::TimestampError;
pub use message::RawChatMessage;
pub use time::Timestamp;
