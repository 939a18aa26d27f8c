//! Out-of-band character verification.
//!
//! Proves that the person at the dashboard controls an in-game character:
//! 1. **Challenge**: the authority issues a short code with an expiry.
//! 2. **Broadcast**: the user posts the code, verbatim, in the public chat feed
//!    as that character.
//! 3. **Poll**: the controller reads the feed on a fixed cadence, looking for a
//!    fresh exact post of the code.
//! 4. **Confirm**: the author of that post is sent to the authority, which rules
//!    whether it is the expected character.
//!
//! Polling cadence and code expiry run on separate timers. Polling backs off
//! after a maximum duration while the code stays redeemable until it expires.

pub mod config;
pub mod controller;
pub mod error;
pub mod session;

pub use config::VerificationConfig;
pub use controller::VerificationController;
pub use error::VerificationError;
pub use session::{FailureKind, SuggestedAction, VerificationSession, VerificationStatus};
