//! Results returned by the authority.

use serde::{Deserialize, Serialize};
use settle_types::Timestamp;

/// A freshly issued challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// The code the user must post verbatim.
    pub code: String,
    pub verification_id: String,
    pub session_token: Option<String>,
    pub expires_at: Timestamp,
}

/// The authority's ruling on a submitted match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchVerdict {
    pub verified: bool,
    /// Username the challenge was issued for.
    #[serde(default)]
    pub expected: Option<String>,
    /// Username that was submitted.
    #[serde(default)]
    pub found: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
}

impl MatchVerdict {
    /// A refusal that names both sides is a wrong-character post, which the
    /// user can recover from by posting again as the right character.
    pub fn is_username_mismatch(&self) -> bool {
        !self.verified && self.expected.is_some() && self.found.is_some()
    }
}
