//! HTTP client for the external chat feed.

use crate::error::FeedError;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use serde::Deserialize;
use settle_types::RawChatMessage;
use std::time::Duration;

/// Default timeout for a feed fetch.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of the most recent chat messages.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch the latest batch from the live feed.
    async fn fetch_messages(&self) -> Result<Vec<RawChatMessage>, FeedError>;
}

/// Feed responses come either as a bare array or wrapped in `{"messages": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedPayload {
    List(Vec<RawChatMessage>),
    Wrapped { messages: Vec<RawChatMessage> },
}

impl FeedPayload {
    fn into_messages(self) -> Vec<RawChatMessage> {
        match self {
            FeedPayload::List(messages) | FeedPayload::Wrapped { messages } => messages,
        }
    }
}

/// Reads the chat feed over HTTP.
///
/// Sends `GET {feed_url}` with caching disabled and parses the JSON body.
pub struct HttpFeedClient {
    /// HTTP client (reusable connection pool).
    http_client: reqwest::Client,
    feed_url: String,
}

impl HttpFeedClient {
    /// Create a client with default timeout settings.
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self::with_timeout(feed_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(feed_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            feed_url: feed_url.into(),
        }
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_messages(&self) -> Result<Vec<RawChatMessage>, FeedError> {
        let response = self
            .http_client
            .get(&self.feed_url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FeedError::Unreachable(format!("request timed out: {e}"))
                } else if e.is_connect() {
                    FeedError::Unreachable(format!("connection failed: {e}"))
                } else {
                    FeedError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(FeedError::RequestFailed(format!(
                "HTTP status {}",
                response.status()
            )));
        }

        let payload: FeedPayload = response.json().await.map_err(|e| {
            FeedError::InvalidResponse(format!("failed to parse feed response: {e}"))
        })?;
        let messages = payload.into_messages();
        tracing::trace!(count = messages.len(), "fetched chat feed batch");
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn parses_bare_array() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/chat").header("cache-control", "no-cache");
                then.status(200).json_body(json!([
                    {"username": "en/Alice", "text": "7f3a", "timestamp": "2024-05-01T12:00:00Z"},
                    {"username": "de/Bob", "text": "hallo", "timestamp": "2024-05-01T12:00:05Z"}
                ]));
            })
            .await;

        let client = HttpFeedClient::new(server.url("/chat"));
        let messages = client.fetch_messages().await.unwrap();
        mock.assert_async().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            RawChatMessage::new("en/Alice", "7f3a", "2024-05-01T12:00:00Z")
        );
    }

    #[tokio::test]
    async fn parses_wrapped_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/chat");
                then.status(200).json_body(json!({
                    "messages": [{"username": "Alice", "text": "7f3a", "timestamp": "1714564800"}]
                }));
            })
            .await;

        let client = HttpFeedClient::new(server.url("/chat"));
        let messages = client.fetch_messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].username, "Alice");
    }

    #[tokio::test]
    async fn numeric_timestamp_does_not_poison_the_batch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/chat");
                then.status(200).json_body(json!([
                    {"username": "en/Alice", "text": "7f3a", "timestamp": 1_714_564_800u64},
                    {"username": "de/Bob", "text": "hallo", "timestamp": "2024-05-01T12:00:05Z"}
                ]));
            })
            .await;

        let client = HttpFeedClient::new(server.url("/chat"));
        let messages = client.fetch_messages().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].timestamp, "1714564800");
        assert_eq!(messages[1].timestamp, "2024-05-01T12:00:05Z");
    }

    #[tokio::test]
    async fn every_call_hits_the_feed() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/chat");
                then.status(200).json_body(json!([]));
            })
            .await;

        let client = HttpFeedClient::new(server.url("/chat"));
        client.fetch_messages().await.unwrap();
        client.fetch_messages().await.unwrap();
        client.fetch_messages().await.unwrap();
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn server_error_is_request_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/chat");
                then.status(503).body("maintenance");
            })
            .await;

        let client = HttpFeedClient::new(server.url("/chat"));
        let err = client.fetch_messages().await.unwrap_err();
        assert!(matches!(err, FeedError::RequestFailed(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/chat");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let client = HttpFeedClient::new(server.url("/chat"));
        let err = client.fetch_messages().await.unwrap_err();
        assert!(matches!(err, FeedError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let client = HttpFeedClient::with_timeout("http://127.0.0.1:9/chat", Duration::from_secs(2));
        let err = client.fetch_messages().await.unwrap_err();
        assert!(matches!(err, FeedError::Unreachable(_)));
    }
}
