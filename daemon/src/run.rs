//! Drives one verification attempt and reports progress to the terminal.

use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;

use settle_utils::{format_countdown, format_duration};
use settle_verification::{VerificationController, VerificationSession, VerificationStatus};

const COUNTDOWN_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Verified,
    /// Failed or expired.
    Failed,
    /// Interrupted by a signal; the attempt was cancelled.
    Interrupted,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Verified => ExitCode::SUCCESS,
            Self::Failed => ExitCode::from(1),
            Self::Interrupted => ExitCode::from(130),
        }
    }
}

/// Start a verification for `username` and follow it to a terminal state.
///
/// With `retry_polling`, polling is resumed automatically every time it backs
/// off, until the code expires. When `interrupt` resolves the attempt is
/// cancelled and the run ends.
pub async fn drive(
    controller: &VerificationController,
    username: &str,
    entity_id: &str,
    retry_polling: bool,
    interrupt: impl Future<Output = ()>,
) -> Outcome {
    tokio::pin!(interrupt);
    let mut sessions = controller.subscribe();

    let started = tokio::select! {
        started = controller.start(username, entity_id) => started,
        () = &mut interrupt => {
            controller.cancel().await;
            return Outcome::Interrupted;
        }
    };
    if !started {
        let session = controller.session();
        tracing::error!(
            error = session.error.as_deref().unwrap_or("unknown error"),
            "could not start verification"
        );
        return Outcome::Failed;
    }

    let session = sessions.borrow_and_update().clone();
    announce(&session, username, controller.time_remaining());
    let mut last_status = session.status;
    if let Some(outcome) = settle(controller, &session, retry_polling) {
        log_transition(&session);
        return outcome;
    }

    let mut countdown_log = tokio::time::interval(COUNTDOWN_LOG_INTERVAL);
    countdown_log.tick().await;

    loop {
        tokio::select! {
            () = &mut interrupt => {
                controller.cancel().await;
                return Outcome::Interrupted;
            }
            changed = sessions.changed() => {
                if changed.is_err() {
                    return Outcome::Failed;
                }
                let session = sessions.borrow_and_update().clone();
                if session.status != last_status {
                    log_transition(&session);
                    last_status = session.status;
                }
                if let Some(outcome) = settle(controller, &session, retry_polling) {
                    return outcome;
                }
            }
            _ = countdown_log.tick() => {
                tracing::info!(
                    status = %last_status,
                    remaining = %format_countdown(controller.time_remaining()),
                    "waiting for the code in chat"
                );
            }
        }
    }
}

/// React to `session`; `Some` once the run is over.
fn settle(
    controller: &VerificationController,
    session: &VerificationSession,
    retry_polling: bool,
) -> Option<Outcome> {
    match session.status {
        VerificationStatus::Verified => Some(Outcome::Verified),
        VerificationStatus::Failed | VerificationStatus::Expired => Some(Outcome::Failed),
        VerificationStatus::PollingStopped if retry_polling => {
            if controller.retry_polling() {
                tracing::info!("resuming polling automatically");
            }
            None
        }
        _ => None,
    }
}

fn announce(session: &VerificationSession, username: &str, remaining_secs: u64) {
    let code = session.code.as_deref().unwrap_or_default();
    println!("Post this exact message in chat as {username}: {code}");
    if let Some(expires_at) = session.expires_at {
        tracing::info!(
            verification_id = session.verification_id.as_deref().unwrap_or_default(),
            expires_at = %expires_at.to_rfc3339(),
            expires_in = %format_duration(remaining_secs),
            "verification code issued"
        );
    }
}

fn log_transition(session: &VerificationSession) {
    match (&session.error, session.suggested_action()) {
        (Some(error), action) => tracing::warn!(
            status = %session.status,
            suggested_action = ?action,
            %error,
            "verification status changed"
        ),
        (None, _) => tracing::info!(
            status = %session.status,
            found_username = session.found_username.as_deref().unwrap_or_default(),
            "verification status changed"
        ),
    }
}
