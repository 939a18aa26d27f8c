//! Nullable authority: issues, judges and cancels challenges in memory.

use async_trait::async_trait;
use settle_authority::{AuthorityClient, AuthorityError, Challenge, MatchVerdict};
use settle_types::Clock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default lifetime of an issued code.
const DEFAULT_TTL_SECS: u64 = 300;

/// A `submit_match` call as the authority received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedMatch {
    pub verification_id: String,
    pub found_username: String,
}

struct IssuedChallenge {
    expected_username: String,
    entity_id: String,
}

/// An authority that behaves like the real one, minus the network.
///
/// A submitted username is verified iff it equals the username the
/// challenge was issued for; otherwise the verdict is a mismatch naming both,
/// unless [`NullAuthority::decline_matches`] asks for a bare refusal.
/// Failures and latency can be injected per operation.
pub struct NullAuthority {
    clock: Arc<dyn Clock>,
    code: Mutex<String>,
    ttl_secs: AtomicU64,
    issued: Mutex<HashMap<String, IssuedChallenge>>,
    created: AtomicUsize,
    submissions: Mutex<Vec<SubmittedMatch>>,
    cancellations: Mutex<Vec<(String, Option<String>)>>,
    create_error: Mutex<Option<AuthorityError>>,
    submit_error: Mutex<Option<AuthorityError>>,
    cancel_error: Mutex<Option<AuthorityError>>,
    create_delay: Mutex<Duration>,
    submit_delay: Mutex<Duration>,
    decline: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NullAuthority {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            code: Mutex::new("7f3a".to_string()),
            ttl_secs: AtomicU64::new(DEFAULT_TTL_SECS),
            issued: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            cancellations: Mutex::new(Vec::new()),
            create_error: Mutex::new(None),
            submit_error: Mutex::new(None),
            cancel_error: Mutex::new(None),
            create_delay: Mutex::new(Duration::ZERO),
            submit_delay: Mutex::new(Duration::ZERO),
            decline: AtomicBool::new(false),
        }
    }

    /// Code handed out by subsequent challenges.
    pub fn set_code(&self, code: &str) {
        *lock(&self.code) = code.to_string();
    }

    /// Lifetime of subsequent challenges, measured from the clock's `now`.
    pub fn set_ttl_secs(&self, secs: u64) {
        self.ttl_secs.store(secs, Ordering::SeqCst);
    }

    pub fn reject_challenges(&self, error: Option<AuthorityError>) {
        *lock(&self.create_error) = error;
    }

    pub fn fail_submissions(&self, error: Option<AuthorityError>) {
        *lock(&self.submit_error) = error;
    }

    pub fn fail_cancellations(&self, error: Option<AuthorityError>) {
        *lock(&self.cancel_error) = error;
    }

    /// Hold each `create_challenge` call for `delay` before answering.
    pub fn delay_challenges(&self, delay: Duration) {
        *lock(&self.create_delay) = delay;
    }

    /// Hold each `submit_match` call for `delay` before answering.
    pub fn delay_submissions(&self, delay: Duration) {
        *lock(&self.submit_delay) = delay;
    }

    /// Answer every submission with `verified: false` and no names.
    pub fn decline_matches(&self, decline: bool) {
        self.decline.store(decline, Ordering::SeqCst);
    }

    pub fn challenges_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<SubmittedMatch> {
        lock(&self.submissions).clone()
    }

    pub fn cancellations(&self) -> Vec<(String, Option<String>)> {
        lock(&self.cancellations).clone()
    }
}

#[async_trait]
impl AuthorityClient for NullAuthority {
    async fn create_challenge(
        &self,
        expected_username: &str,
        entity_id: &str,
    ) -> Result<Challenge, AuthorityError> {
        let delay = *lock(&self.create_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.create_error).clone() {
            return Err(error);
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let verification_id = format!("verif-{n}");
        lock(&self.issued).insert(
            verification_id.clone(),
            IssuedChallenge {
                expected_username: expected_username.to_string(),
                entity_id: entity_id.to_string(),
            },
        );

        Ok(Challenge {
            code: lock(&self.code).clone(),
            session_token: Some(format!("token-{n}")),
            expires_at: self
                .clock
                .now()
                .plus_secs(self.ttl_secs.load(Ordering::SeqCst)),
            verification_id,
        })
    }

    async fn submit_match(
        &self,
        verification_id: &str,
        found_username: &str,
    ) -> Result<MatchVerdict, AuthorityError> {
        lock(&self.submissions).push(SubmittedMatch {
            verification_id: verification_id.to_string(),
            found_username: found_username.to_string(),
        });

        let delay = *lock(&self.submit_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.submit_error).clone() {
            return Err(error);
        }

        if self.decline.load(Ordering::SeqCst) {
            return Ok(MatchVerdict::default());
        }

        let issued = lock(&self.issued);
        let challenge = issued
            .get(verification_id)
            .ok_or_else(|| AuthorityError::Rejected("Verification not found".to_string()))?;

        let verified = challenge.expected_username == found_username;
        Ok(MatchVerdict {
            verified,
            expected: Some(challenge.expected_username.clone()),
            found: Some(found_username.to_string()),
            session_token: verified.then(|| format!("session-{verification_id}")),
            entity_id: verified.then(|| challenge.entity_id.clone()),
        })
    }

    async fn cancel_challenge(
        &self,
        verification_id: &str,
        session_token: Option<&str>,
    ) -> Result<(), AuthorityError> {
        lock(&self.cancellations).push((
            verification_id.to_string(),
            session_token.map(str::to_string),
        ));
        if let Some(error) = lock(&self.cancel_error).clone() {
            return Err(error);
        }
        lock(&self.issued).remove(verification_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullClock;
    use settle_types::Timestamp;

    #[tokio::test]
    async fn verdict_follows_expected_username() {
        let authority = NullAuthority::new(Arc::new(NullClock::new(1_000)));
        let challenge = authority.create_challenge("Alice", "ent-1").await.unwrap();
        assert_eq!(challenge.expires_at, Timestamp::new(1_300));

        let wrong = authority
            .submit_match(&challenge.verification_id, "Bob")
            .await
            .unwrap();
        assert!(wrong.is_username_mismatch());

        let right = authority
            .submit_match(&challenge.verification_id, "Alice")
            .await
            .unwrap();
        assert!(right.verified);
        assert_eq!(right.entity_id.as_deref(), Some("ent-1"));
        assert_eq!(authority.submissions().len(), 2);
    }

    #[tokio::test]
    async fn declined_verdict_names_nobody() {
        let authority = NullAuthority::new(Arc::new(NullClock::new(0)));
        authority.decline_matches(true);
        let challenge = authority.create_challenge("Alice", "ent-1").await.unwrap();

        let verdict = authority
            .submit_match(&challenge.verification_id, "Alice")
            .await
            .unwrap();
        assert!(!verdict.verified);
        assert!(!verdict.is_username_mismatch());
        assert_eq!(verdict.expected, None);
    }

    #[tokio::test]
    async fn cancelled_challenge_is_forgotten() {
        let authority = NullAuthority::new(Arc::new(NullClock::new(0)));
        let challenge = authority.create_challenge("Alice", "ent-1").await.unwrap();
        authority
            .cancel_challenge(&challenge.verification_id, challenge.session_token.as_deref())
            .await
            .unwrap();
        assert!(matches!(
            authority.submit_match(&challenge.verification_id, "Alice").await,
            Err(AuthorityError::Rejected(_))
        ));
    }
}
