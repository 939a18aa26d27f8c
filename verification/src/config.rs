//! Timer configuration for the polling controller.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::VerificationError;

/// Upper bound on every configured timer: one day.
pub const MAX_TIMER_SECS: u64 = 86_400;

/// Cadences and limits that drive a verification attempt.
///
/// Serialised in whole seconds so it can be embedded in a TOML file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Seconds between feed polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds between countdown updates.
    #[serde(default = "default_countdown_interval_secs")]
    pub countdown_interval_secs: u64,

    /// Polling backs off after this many seconds; the code may still be valid.
    #[serde(default = "default_max_poll_duration_secs")]
    pub max_poll_duration_secs: u64,

    /// Maximum age of a post that still counts as proof.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_countdown_interval_secs() -> u64 {
    1
}

fn default_max_poll_duration_secs() -> u64 {
    180
}

fn default_freshness_window_secs() -> u64 {
    300
}

// ── Impl ───────────────────────────────────────────────────────────────

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            countdown_interval_secs: default_countdown_interval_secs(),
            max_poll_duration_secs: default_max_poll_duration_secs(),
            freshness_window_secs: default_freshness_window_secs(),
        }
    }
}

impl VerificationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_secs(self.countdown_interval_secs)
    }

    pub fn max_poll_duration(&self) -> Duration {
        Duration::from_secs(self.max_poll_duration_secs)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    /// Every timer must lie in `1..=MAX_TIMER_SECS`.
    pub fn validate(&self) -> Result<(), VerificationError> {
        let timers = [
            ("poll_interval_secs", self.poll_interval_secs),
            ("countdown_interval_secs", self.countdown_interval_secs),
            ("max_poll_duration_secs", self.max_poll_duration_secs),
            ("freshness_window_secs", self.freshness_window_secs),
        ];
        for (name, value) in timers {
            if value == 0 {
                return Err(VerificationError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
            if value > MAX_TIMER_SECS {
                return Err(VerificationError::InvalidConfig(format!(
                    "{name} must be at most {MAX_TIMER_SECS} seconds"
                )));
            }
        }
        Ok(())
    }
}
