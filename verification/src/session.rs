//! The verification session aggregate.

use serde::{Deserialize, Serialize};
use settle_types::Timestamp;

/// Where a verification attempt stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// No attempt in progress.
    #[default]
    Idle,
    /// Waiting for the authority to issue a code.
    Pending,
    /// Code issued; the feed is being polled.
    Polling,
    /// Polling backed off; the code is still valid until it expires.
    PollingStopped,
    /// The authority confirmed the expected character posted the code.
    Verified,
    /// The authority refused the challenge or the match.
    Failed,
    /// The code expired before a confirmed post was seen.
    Expired,
    /// Someone else posted the code. Polling continues.
    UsernameMismatch,
}

impl VerificationStatus {
    /// Verified, failed and expired end the attempt; nothing polls after them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Failed | Self::Expired)
    }

    /// Whether the poll timer runs in this state.
    pub fn is_polling(&self) -> bool {
        matches!(self, Self::Polling | Self::UsernameMismatch)
    }

    /// Whether an issued code is still live (countdown running).
    pub fn has_live_code(&self) -> bool {
        matches!(
            self,
            Self::Polling | Self::PollingStopped | Self::UsernameMismatch
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Polling => "polling",
            Self::PollingStopped => "polling_stopped",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::UsernameMismatch => "username_mismatch",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which class of problem produced `VerificationSession::error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The authority would not issue a code (or the request was invalid).
    ChallengeRejected,
    /// The authority failed while judging a found post.
    MatchRejected,
    /// The code ran out.
    Expired,
    /// The code was posted by a different character.
    UsernameMismatch,
}

/// What a caller should offer the user next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Keep the current code; polling is still running.
    KeepWaiting,
    /// Resume polling with the same code.
    RetryPolling,
    /// Request a fresh code.
    StartOver,
}

impl FailureKind {
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Self::UsernameMismatch => SuggestedAction::KeepWaiting,
            Self::ChallengeRejected | Self::MatchRejected | Self::Expired => {
                SuggestedAction::StartOver
            }
        }
    }
}

/// A single verification attempt. Replaced wholesale on `start` and `cancel`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSession {
    pub status: VerificationStatus,
    /// Code to post. Set together with `verification_id`.
    pub code: Option<String>,
    pub verification_id: Option<String>,
    pub session_token: Option<String>,
    pub expected_username: Option<String>,
    pub external_entity_id: Option<String>,
    /// Set once, when the authority issues the code.
    pub expires_at: Option<Timestamp>,
    /// Human-readable reason, present in failed, expired and mismatch states.
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    /// Polls since the current polling run began.
    pub poll_count: u64,
    /// Who was actually seen posting the code.
    pub found_username: Option<String>,
    /// Entity the authority bound the verified session to.
    pub entity_id: Option<String>,
}

impl VerificationSession {
    /// A fresh attempt waiting on the authority.
    pub fn pending(expected_username: &str, external_entity_id: &str) -> Self {
        Self {
            status: VerificationStatus::Pending,
            expected_username: Some(expected_username.to_string()),
            external_entity_id: Some(external_entity_id.to_string()),
            ..Self::default()
        }
    }

    /// What the caller should offer next, given the current state.
    pub fn suggested_action(&self) -> Option<SuggestedAction> {
        match self.status {
            VerificationStatus::PollingStopped => Some(SuggestedAction::RetryPolling),
            _ => self.failure.map(|kind| kind.suggested_action()),
        }
    }

    pub(crate) fn fail(&mut self, kind: FailureKind, status: VerificationStatus, error: String) {
        self.status = status;
        self.failure = Some(kind);
        self.error = Some(error);
    }
}
