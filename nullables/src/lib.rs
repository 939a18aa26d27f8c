//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the verification flow (wall clock, chat feed,
//! authority) sits behind a trait. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record what was asked of them
//! - Never touch the network
//!
//! Usage: construct these and pass them to the controller in place of the
//! HTTP clients.

pub mod authority;
pub mod clock;
pub mod feed;

pub use authority::{NullAuthority, SubmittedMatch};
pub use clock::NullClock;
pub use feed::NullFeed;
