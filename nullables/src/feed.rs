//! Nullable chat feed: serves a scripted batch without any network.

use async_trait::async_trait;
use settle_feed::{FeedClient, FeedError};
use settle_types::RawChatMessage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// A feed that returns whatever batch the test last configured.
///
/// Queued failures are served first, one per fetch.
#[derive(Default)]
pub struct NullFeed {
    messages: Mutex<Vec<RawChatMessage>>,
    failures: Mutex<VecDeque<FeedError>>,
    calls: AtomicUsize,
}

impl NullFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<RawChatMessage>) -> Self {
        let feed = Self::new();
        feed.set_messages(messages);
        feed
    }

    /// Replace the batch returned by subsequent fetches.
    pub fn set_messages(&self, messages: Vec<RawChatMessage>) {
        *self.messages.lock().unwrap_or_else(PoisonError::into_inner) = messages;
    }

    /// Append one message to the current batch.
    pub fn push_message(&self, message: RawChatMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Make the next `count` fetches fail with a transport error.
    pub fn fail_next(&self, count: usize, reason: &str) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..count {
            failures.push_back(FeedError::Unreachable(reason.to_string()));
        }
    }

    /// Number of fetches made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedClient for NullFeed {
    async fn fetch_messages(&self) -> Result<Vec<RawChatMessage>, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Err(failure);
        }
        Ok(self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
