//! Polling controller: drives one verification attempt to completion.
//!
//! The controller owns the live [`VerificationSession`] and two timers:
//! - the **poll timer** reads the feed every `poll_interval`, looks for the
//!   code, and asks the authority to rule on any hit. It backs off after
//!   `max_poll_duration`.
//! - the **countdown** recomputes the seconds left on the code and moves the
//!   session to `expired` when they reach zero. It keeps running after the
//!   poll timer has backed off.
//!
//! Every asynchronous continuation captures the session *generation* it was
//! started under. `start`, `cancel`, terminal transitions and drop bump the
//! generation, so a late result from a superseded attempt is discarded
//! instead of written.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use settle_authority::AuthorityClient;
use settle_feed::FeedClient;
use settle_matcher::{find_verification_code_excluding, MatchKey};
use settle_types::Clock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::VerificationConfig;
use crate::error::VerificationError;
use crate::session::{FailureKind, VerificationSession, VerificationStatus};

const EXPIRED_MESSAGE: &str = "Verification code expired. Request a new code to try again.";
const DECLINED_MESSAGE: &str = "The verification authority declined the match.";
const UNUSABLE_EXPIRY_MESSAGE: &str =
    "The verification authority returned an unusable expiry time. Request a new code.";

/// Mutable bookkeeping that sits beside the session.
#[derive(Default)]
struct Control {
    generation: u64,
    /// Monotonic instant at which the live code expires.
    deadline: Option<Instant>,
    poll_task: Option<JoinHandle<()>>,
    countdown_task: Option<JoinHandle<()>>,
    /// Last `(expected_username, external_entity_id)` passed to `start`.
    last_request: Option<(String, String)>,
    /// Posts the authority already ruled to be the wrong character.
    rejected: HashSet<MatchKey>,
}

impl Control {
    fn stop_timers(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if let Some(task) = self.countdown_task.take() {
            task.abort();
        }
    }

    /// Invalidate everything in flight for the current attempt.
    fn retire(&mut self) {
        self.generation += 1;
        self.deadline = None;
        self.stop_timers();
    }
}

struct Shared {
    feed: Arc<dyn FeedClient>,
    authority: Arc<dyn AuthorityClient>,
    clock: Arc<dyn Clock>,
    config: VerificationConfig,
    session_tx: watch::Sender<VerificationSession>,
    countdown_tx: watch::Sender<u64>,
    control: Mutex<Control>,
}

/// Drives the verification state machine.
///
/// Only one attempt is live at a time; `start` replaces whatever came before.
pub struct VerificationController {
    shared: Arc<Shared>,
}

impl VerificationController {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        authority: Arc<dyn AuthorityClient>,
        clock: Arc<dyn Clock>,
        config: VerificationConfig,
    ) -> Result<Self, VerificationError> {
        config.validate()?;
        let (session_tx, _) = watch::channel(VerificationSession::default());
        let (countdown_tx, _) = watch::channel(0);
        Ok(Self {
            shared: Arc::new(Shared {
                feed,
                authority,
                clock,
                config,
                session_tx,
                countdown_tx,
                control: Mutex::new(Control::default()),
            }),
        })
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.shared.config
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> VerificationSession {
        self.shared.session_tx.borrow().clone()
    }

    pub fn status(&self) -> VerificationStatus {
        self.shared.session_tx.borrow().status
    }

    /// Receive every session change.
    pub fn subscribe(&self) -> watch::Receiver<VerificationSession> {
        self.shared.session_tx.subscribe()
    }

    /// Receive the countdown, in whole seconds, as it ticks.
    pub fn subscribe_countdown(&self) -> watch::Receiver<u64> {
        self.shared.countdown_tx.subscribe()
    }

    /// Seconds until the live code expires, rounded up. Zero without a live code.
    pub fn time_remaining(&self) -> u64 {
        self.shared
            .lock_control()
            .deadline
            .map(|deadline| ceil_secs(deadline.saturating_duration_since(Instant::now())))
            .unwrap_or(0)
    }

    pub fn is_poll_timer_active(&self) -> bool {
        is_running(&self.shared.lock_control().poll_task)
    }

    pub fn is_countdown_active(&self) -> bool {
        is_running(&self.shared.lock_control().countdown_task)
    }

    /// Begin a new attempt for `expected_username`.
    ///
    /// Returns `true` once the authority has issued a code and polling has
    /// begun. On failure the session is left in `failed` with the reason.
    pub async fn start(&self, expected_username: &str, external_entity_id: &str) -> bool {
        let username = expected_username.trim();
        let entity_id = external_entity_id.trim();

        let (generation, superseded) = {
            let mut control = self.shared.lock_control();
            let previous = self.shared.session_tx.borrow().clone();
            control.retire();
            control.rejected.clear();
            control.last_request = Some((username.to_string(), entity_id.to_string()));

            let mut session = VerificationSession::pending(username, entity_id);
            if username.is_empty() || entity_id.is_empty() {
                session.fail(
                    FailureKind::ChallengeRejected,
                    VerificationStatus::Failed,
                    "A username and a character id are required to start verification."
                        .to_string(),
                );
                self.shared.session_tx.send_replace(session);
                self.shared.countdown_tx.send_replace(0);
                return false;
            }
            self.shared.session_tx.send_replace(session);
            self.shared.countdown_tx.send_replace(0);

            let superseded = previous
                .verification_id
                .filter(|_| previous.status.has_live_code())
                .map(|id| (id, previous.session_token));
            (control.generation, superseded)
        };

        if let Some((verification_id, session_token)) = superseded {
            self.shared
                .cancel_remote(&verification_id, session_token.as_deref())
                .await;
        }

        tracing::info!(expected_username = %username, "requesting verification challenge");
        let challenge = match self
            .shared
            .authority
            .create_challenge(username, entity_id)
            .await
        {
            Ok(challenge) => challenge,
            Err(e) => {
                tracing::warn!(error = %e, "authority refused verification challenge");
                self.shared.transition(generation, false, |_, session| {
                    session.fail(
                        FailureKind::ChallengeRejected,
                        VerificationStatus::Failed,
                        e.to_string(),
                    );
                    true
                });
                return false;
            }
        };

        let remaining = challenge.expires_at.secs_until(self.shared.clock.now());
        let Some(deadline) = Instant::now().checked_add(Duration::from_secs(remaining)) else {
            tracing::warn!(
                verification_id = %challenge.verification_id,
                expires_at = %challenge.expires_at,
                "challenge expiry is out of range, discarding"
            );
            self.shared.transition(generation, false, |_, session| {
                session.fail(
                    FailureKind::ChallengeRejected,
                    VerificationStatus::Failed,
                    UNUSABLE_EXPIRY_MESSAGE.to_string(),
                );
                true
            });
            self.shared
                .cancel_remote(
                    &challenge.verification_id,
                    challenge.session_token.as_deref(),
                )
                .await;
            return false;
        };

        let activated = {
            let mut control = self.shared.lock_control();
            if control.generation != generation {
                false
            } else {
                control.deadline = Some(deadline);
                self.shared.session_tx.send_modify(|session| {
                    session.status = VerificationStatus::Polling;
                    session.code = Some(challenge.code.clone());
                    session.verification_id = Some(challenge.verification_id.clone());
                    session.session_token = challenge.session_token.clone();
                    session.expires_at = Some(challenge.expires_at);
                    session.poll_count = 0;
                });
                self.shared.countdown_tx.send_replace(remaining);
                control.poll_task = Some(spawn_poll_loop(&self.shared, generation));
                control.countdown_task =
                    Some(spawn_countdown(&self.shared, generation, deadline));
                true
            }
        };

        if !activated {
            tracing::info!(
                verification_id = %challenge.verification_id,
                "challenge arrived after the attempt was superseded, discarding"
            );
            self.shared
                .cancel_remote(
                    &challenge.verification_id,
                    challenge.session_token.as_deref(),
                )
                .await;
            return false;
        }

        tracing::info!(
            verification_id = %challenge.verification_id,
            expires_in_secs = remaining,
            "verification challenge issued, polling chat feed"
        );
        true
    }

    /// Abandon the current attempt and return to `idle`.
    ///
    /// Both timers stop immediately. The authority is told on a best-effort
    /// basis; a failed remote call does not prevent the local reset. A no-op
    /// when already idle.
    pub async fn cancel(&self) {
        let previous = {
            let mut control = self.shared.lock_control();
            let previous = self.shared.session_tx.borrow().clone();
            if previous.status == VerificationStatus::Idle {
                return;
            }
            control.retire();
            control.rejected.clear();
            self.shared
                .session_tx
                .send_replace(VerificationSession::default());
            self.shared.countdown_tx.send_replace(0);
            previous
        };

        tracing::info!(status = %previous.status, "verification cancelled");
        if let Some(verification_id) = previous.verification_id {
            self.shared
                .cancel_remote(&verification_id, previous.session_token.as_deref())
                .await;
        }
    }

    /// Resume polling after it backed off, keeping the same code.
    ///
    /// Returns `false` unless the session is `polling_stopped` and the code
    /// has not yet expired.
    pub fn retry_polling(&self) -> bool {
        let mut control = self.shared.lock_control();
        if self.shared.session_tx.borrow().status != VerificationStatus::PollingStopped {
            return false;
        }
        match control.deadline {
            Some(deadline) if Instant::now() < deadline => {}
            _ => return false,
        }

        let generation = control.generation;
        self.shared.session_tx.send_modify(|session| {
            session.status = VerificationStatus::Polling;
            session.poll_count = 0;
        });
        if let Some(task) = control.poll_task.take() {
            task.abort();
        }
        control.poll_task = Some(spawn_poll_loop(&self.shared, generation));
        tracing::info!("polling resumed");
        true
    }

    /// Start over with the username and entity id of the last attempt.
    ///
    /// Only allowed from `failed`, `expired` or `verified`.
    pub async fn retry_verification(&self) -> bool {
        let request = {
            let control = self.shared.lock_control();
            if !self.shared.session_tx.borrow().status.is_terminal() {
                return false;
            }
            control.last_request.clone()
        };
        match request {
            Some((username, entity_id)) => self.start(&username, &entity_id).await,
            None => false,
        }
    }
}

impl Drop for VerificationController {
    fn drop(&mut self) {
        self.shared.lock_control().retire();
    }
}

impl Shared {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the session if `generation` is still current.
    ///
    /// `f` returns whether it changed anything. A `terminal` transition that
    /// applies also retires the attempt, stopping both timers.
    fn transition(
        &self,
        generation: u64,
        terminal: bool,
        f: impl FnOnce(&mut Control, &mut VerificationSession) -> bool,
    ) -> bool {
        let mut control = self.lock_control();
        if control.generation != generation {
            return false;
        }
        let control_ref = &mut *control;
        let applied = self
            .session_tx
            .send_if_modified(|session| f(control_ref, session));
        if applied && terminal {
            control.retire();
            self.countdown_tx.send_replace(0);
        }
        applied
    }

    async fn cancel_remote(&self, verification_id: &str, session_token: Option<&str>) {
        match self
            .authority
            .cancel_challenge(verification_id, session_token)
            .await
        {
            Ok(()) => tracing::debug!(%verification_id, "challenge cancelled at authority"),
            Err(e) => tracing::warn!(
                %verification_id,
                error = %e,
                "failed to cancel challenge at authority, ignoring"
            ),
        }
    }

    /// One poll: fetch the feed, look for the code, and rule on any hit.
    async fn poll_once(&self, generation: u64) -> ControlFlow<()> {
        let (code, verification_id) = {
            let session = self.session_tx.borrow();
            match (&session.code, &session.verification_id) {
                (Some(code), Some(id)) if session.status.is_polling() => {
                    (code.clone(), id.clone())
                }
                _ => return ControlFlow::Break(()),
            }
        };

        let mut poll_count = 0;
        let counted = self.transition(generation, false, |_, session| {
            if !session.status.is_polling() {
                return false;
            }
            session.poll_count += 1;
            poll_count = session.poll_count;
            true
        });
        if !counted {
            return ControlFlow::Break(());
        }

        let messages = match self.feed.fetch_messages().await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(poll_count, error = %e, "chat feed fetch failed, will retry");
                return ControlFlow::Continue(());
            }
        };

        let excluded = self.lock_control().rejected.clone();
        let hit = find_verification_code_excluding(
            &messages,
            &code,
            self.clock.now(),
            self.config.freshness_window(),
            &excluded,
        );
        let Some(key) = hit.key() else {
            tracing::debug!(poll_count, batch = messages.len(), "code not found in feed");
            return ControlFlow::Continue(());
        };

        tracing::info!(
            %verification_id,
            found_username = %key.username,
            "code found in chat feed, submitting to authority"
        );
        let verdict = match self
            .authority
            .submit_match(&verification_id, &key.username)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(%verification_id, error = %e, "authority failed to rule on match");
                self.transition(generation, true, |_, session| {
                    if !session.status.is_polling() {
                        return false;
                    }
                    session.fail(
                        FailureKind::MatchRejected,
                        VerificationStatus::Failed,
                        e.to_string(),
                    );
                    true
                });
                return ControlFlow::Break(());
            }
        };

        if verdict.verified {
            let applied = self.transition(generation, true, |_, session| {
                if !session.status.is_polling() {
                    return false;
                }
                session.status = VerificationStatus::Verified;
                session.found_username = Some(key.username.clone());
                if let Some(token) = &verdict.session_token {
                    session.session_token = Some(token.clone());
                }
                session.entity_id = verdict.entity_id.clone();
                session.error = None;
                session.failure = None;
                true
            });
            if applied {
                tracing::info!(%verification_id, username = %key.username, "character verified");
            }
            return ControlFlow::Break(());
        }

        if verdict.is_username_mismatch() {
            let expected = verdict.expected.clone().unwrap_or_default();
            let found = verdict.found.clone().unwrap_or_else(|| key.username.clone());
            let message = format!(
                "Username mismatch: the code was posted by \"{found}\" but this verification \
                 is for \"{expected}\". Post the code again as {expected}."
            );
            self.transition(generation, false, |control, session| {
                if !session.status.is_polling() {
                    return false;
                }
                control.rejected.insert(key.clone());
                session.found_username = Some(found.clone());
                session.fail(
                    FailureKind::UsernameMismatch,
                    VerificationStatus::UsernameMismatch,
                    message.clone(),
                );
                true
            });
            tracing::info!(%expected, %found, "code posted by the wrong character, still polling");
            return ControlFlow::Continue(());
        }

        self.transition(generation, true, |_, session| {
            if !session.status.is_polling() {
                return false;
            }
            session.found_username = Some(key.username.clone());
            session.fail(
                FailureKind::MatchRejected,
                VerificationStatus::Failed,
                DECLINED_MESSAGE.to_string(),
            );
            true
        });
        ControlFlow::Break(())
    }

    /// Polling ran for its maximum duration; back off but keep the code.
    fn stop_polling(&self, generation: u64) {
        let stopped = self.transition(generation, false, |control, session| {
            if !session.status.is_polling() {
                return false;
            }
            // Detach rather than abort: this runs on the poll task itself.
            control.poll_task = None;
            session.status = VerificationStatus::PollingStopped;
            session.error = None;
            session.failure = None;
            true
        });
        if stopped {
            tracing::info!("maximum polling duration reached, polling stopped");
        }
    }

    fn expire(&self, generation: u64) {
        let expired = self.transition(generation, true, |_, session| {
            if !session.status.has_live_code() {
                return false;
            }
            session.fail(
                FailureKind::Expired,
                VerificationStatus::Expired,
                EXPIRED_MESSAGE.to_string(),
            );
            true
        });
        if expired {
            tracing::info!("verification code expired");
        }
    }

    fn publish_remaining(&self, generation: u64, secs: u64) -> bool {
        let control = self.lock_control();
        if control.generation != generation {
            return false;
        }
        self.countdown_tx.send_if_modified(|current| {
            let changed = *current != secs;
            *current = secs;
            changed
        });
        true
    }
}

fn spawn_poll_loop(shared: &Arc<Shared>, generation: u64) -> JoinHandle<()> {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        // `None` only if the clock cannot represent the limit; poll until expiry.
        let stop_at = Instant::now().checked_add(shared.config.max_poll_duration());
        let mut interval = tokio::time::interval(shared.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = sleep_until_opt(stop_at) => {
                    shared.stop_polling(generation);
                    break;
                }
                _ = interval.tick() => {
                    if shared.poll_once(generation).await.is_break() {
                        break;
                    }
                }
            }
        }
    })
}

fn spawn_countdown(shared: &Arc<Shared>, generation: u64, deadline: Instant) -> JoinHandle<()> {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(shared.config.countdown_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => {
                    shared.expire(generation);
                    break;
                }
                _ = interval.tick() => {
                    let remaining = ceil_secs(deadline.saturating_duration_since(Instant::now()));
                    if !shared.publish_remaining(generation, remaining) {
                        break;
                    }
                }
            }
        }
    })
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn is_running(task: &Option<JoinHandle<()>>) -> bool {
    task.as_ref().is_some_and(|task| !task.is_finished())
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
