//! Timestamp type used throughout the verification core.
//!
//! Timestamps are Unix epoch seconds (UTC). The chat feed and the authority
//! both speak RFC 3339 on the wire; conversion happens at the edges.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::TimestampError;

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the current system time as a `Timestamp`.
    ///
    /// A clock set before 1970 reads as the epoch.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Seconds from `now` until this timestamp, zero if already passed.
    pub fn secs_until(&self, now: Timestamp) -> u64 {
        self.0.saturating_sub(now.0)
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Parse an RFC 3339 string, e.g. `2024-05-01T12:00:00Z`.
    pub fn from_rfc3339(s: &str) -> Result<Self, TimestampError> {
        let parsed = DateTime::parse_from_rfc3339(s)
            .map_err(|_| TimestampError::Unrecognised(s.to_string()))?;
        let secs = u64::try_from(parsed.timestamp())
            .map_err(|_| TimestampError::BeforeEpoch(s.to_string()))?;
        Ok(Self(secs))
    }

    /// Lenient parse: RFC 3339, or decimal Unix seconds.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimestampError::Empty);
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u64>()
                .map(Self)
                .map_err(|_| TimestampError::Unrecognised(s.to_string()));
        }
        Self::from_rfc3339(s)
    }

    /// Format as RFC 3339 with second precision and a `Z` suffix.
    pub fn to_rfc3339(&self) -> String {
        let secs = i64::try_from(self.0).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp(secs, 0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
