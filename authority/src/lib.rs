//! Verification authority client.
//!
//! The authority is the backend of record for challenges. It exposes three
//! operations and nothing else is assumed about it:
//! 1. **create** a challenge for an expected username, yielding a code and expiry
//! 2. **submit** the username seen posting the code, yielding a verdict
//! 3. **cancel** a challenge (advisory cleanup)
//!
//! Each call is a single remote request with no local caching.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AuthorityClient, HttpAuthorityClient};
pub use error::AuthorityError;
pub use types::{Challenge, MatchVerdict};
