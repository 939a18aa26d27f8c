//! HTTP client for the verification authority.

use crate::error::AuthorityError;
use crate::types::{Challenge, MatchVerdict};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use settle_types::Timestamp;
use std::time::Duration;

/// Default timeout for authority requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The three remote operations the verification flow depends on.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Issue a new challenge for `expected_username`.
    async fn create_challenge(
        &self,
        expected_username: &str,
        entity_id: &str,
    ) -> Result<Challenge, AuthorityError>;

    /// Ask the authority whether `found_username` satisfies the challenge.
    async fn submit_match(
        &self,
        verification_id: &str,
        found_username: &str,
    ) -> Result<MatchVerdict, AuthorityError>;

    /// Withdraw a challenge. Callers treat failure as advisory.
    async fn cancel_challenge(
        &self,
        verification_id: &str,
        session_token: Option<&str>,
    ) -> Result<(), AuthorityError>;
}

#[derive(Serialize)]
struct CreateChallengeBody<'a> {
    expected_username: &'a str,
    entity_id: &'a str,
}

#[derive(Serialize)]
struct SubmitMatchBody<'a> {
    found_username: &'a str,
}

#[derive(Serialize)]
struct CancelBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<&'a str>,
}

/// Expiry arrives either as RFC 3339 text or as Unix seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Secs(u64),
    Text(String),
}

#[derive(Deserialize)]
struct ChallengeResponse {
    code: String,
    verification_id: String,
    #[serde(default)]
    session_token: Option<String>,
    expires_at: WireTimestamp,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Talks to the authority's REST endpoints.
///
/// - `POST {base}/challenges`
/// - `POST {base}/challenges/{id}/match`
/// - `POST {base}/challenges/{id}/cancel`
pub struct HttpAuthorityClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAuthorityClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Send `Authorization: Bearer <key>` on every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// `{base}/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, AuthorityError> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            AuthorityError::RequestFailed(format!("invalid authority url {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                AuthorityError::RequestFailed(format!(
                    "authority url {} cannot take a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<reqwest::Response, AuthorityError> {
        let url = self.endpoint(segments)?;
        let mut request = self.http_client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AuthorityError::Unreachable(format!("request timed out: {e}"))
            } else if e.is_connect() {
                AuthorityError::Unreachable(format!("connection failed: {e}"))
            } else {
                AuthorityError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(ErrorBody {
                error: Some(message),
                ..
            })
            | Ok(ErrorBody {
                message: Some(message),
                ..
            }) => Err(AuthorityError::Rejected(message)),
            _ => Err(AuthorityError::RequestFailed(format!("HTTP status {status}"))),
        }
    }

    async fn post_json<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<R, AuthorityError> {
        self.post(segments, body)
            .await?
            .json()
            .await
            .map_err(|e| AuthorityError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    async fn create_challenge(
        &self,
        expected_username: &str,
        entity_id: &str,
    ) -> Result<Challenge, AuthorityError> {
        let body = CreateChallengeBody {
            expected_username,
            entity_id,
        };
        let response: ChallengeResponse = self.post_json(&["challenges"], &body).await?;

        let expires_at = match response.expires_at {
            WireTimestamp::Secs(secs) => Timestamp::new(secs),
            WireTimestamp::Text(text) => Timestamp::parse(&text)
                .map_err(|e| AuthorityError::InvalidResponse(format!("expires_at: {e}")))?,
        };
        if response.code.trim().is_empty() || response.verification_id.is_empty() {
            return Err(AuthorityError::InvalidResponse(
                "challenge is missing its code or verification id".to_string(),
            ));
        }

        tracing::debug!(
            verification_id = %response.verification_id,
            expires_at = %expires_at,
            "challenge issued"
        );
        Ok(Challenge {
            code: response.code,
            verification_id: response.verification_id,
            session_token: response.session_token,
            expires_at,
        })
    }

    async fn submit_match(
        &self,
        verification_id: &str,
        found_username: &str,
    ) -> Result<MatchVerdict, AuthorityError> {
        let body = SubmitMatchBody { found_username };
        self.post_json(&["challenges", verification_id, "match"], &body)
            .await
    }

    async fn cancel_challenge(
        &self,
        verification_id: &str,
        session_token: Option<&str>,
    ) -> Result<(), AuthorityError> {
        let body = CancelBody { session_token };
        self.post(&["challenges", verification_id, "cancel"], &body)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_challenge_parses_rfc3339_expiry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/challenges")
                    .header("authorization", "Bearer secret")
                    .json_body(json!({"expected_username": "Alice", "entity_id": "ent-1"}));
                then.status(200).json_body(json!({
                    "code": "7f3a",
                    "verification_id": "v-1",
                    "session_token": "tok",
                    "expires_at": "2024-05-01T12:05:00Z"
                }));
            })
            .await;

        let client = HttpAuthorityClient::new(server.base_url()).with_api_key("secret");
        let challenge = client.create_challenge("Alice", "ent-1").await.unwrap();
        mock.assert_async().await;
        assert_eq!(challenge.code, "7f3a");
        assert_eq!(challenge.verification_id, "v-1");
        assert_eq!(challenge.session_token.as_deref(), Some("tok"));
        assert_eq!(challenge.expires_at, Timestamp::new(1_714_565_100));
    }

    #[tokio::test]
    async fn create_challenge_accepts_numeric_expiry() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/challenges");
                then.status(201).json_body(json!({
                    "code": "7f3a",
                    "verification_id": "v-1",
                    "expires_at": 1_714_565_100u64
                }));
            })
            .await;

        let client = HttpAuthorityClient::new(format!("{}/", server.base_url()));
        let challenge = client.create_challenge("Alice", "ent-1").await.unwrap();
        assert_eq!(challenge.session_token, None);
        assert_eq!(challenge.expires_at, Timestamp::new(1_714_565_100));
    }

    #[tokio::test]
    async fn rejection_carries_authority_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/challenges");
                then.status(429)
                    .json_body(json!({"error": "Too many verification attempts"}));
            })
            .await;

        let client = HttpAuthorityClient::new(server.base_url());
        let err = client.create_challenge("Alice", "ent-1").await.unwrap_err();
        assert_eq!(
            err,
            AuthorityError::Rejected("Too many verification attempts".to_string())
        );
        assert_eq!(err.to_string(), "Too many verification attempts");
    }

    #[tokio::test]
    async fn bare_error_status_is_request_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/challenges/v-1/match");
                then.status(500).body("boom");
            })
            .await;

        let client = HttpAuthorityClient::new(server.base_url());
        let err = client.submit_match("v-1", "Alice").await.unwrap_err();
        assert!(matches!(err, AuthorityError::RequestFailed(ref m) if m.contains("500")));
    }

    #[tokio::test]
    async fn submit_match_reports_mismatch() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/challenges/v-1/match")
                    .json_body(json!({"found_username": "Bob"}));
                then.status(200).json_body(json!({
                    "verified": false,
                    "expected": "Alice",
                    "found": "Bob"
                }));
            })
            .await;

        let client = HttpAuthorityClient::new(server.base_url());
        let verdict = client.submit_match("v-1", "Bob").await.unwrap();
        mock.assert_async().await;
        assert!(verdict.is_username_mismatch());
        assert_eq!(verdict.found.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn submit_match_returns_session_details() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/challenges/v-1/match");
                then.status(200).json_body(json!({
                    "verified": true,
                    "expected": "Alice",
                    "found": "Alice",
                    "session_token": "tok-2",
                    "entity_id": "ent-1"
                }));
            })
            .await;

        let client = HttpAuthorityClient::new(server.base_url());
        let verdict = client.submit_match("v-1", "Alice").await.unwrap();
        assert!(verdict.verified);
        assert_eq!(verdict.session_token.as_deref(), Some("tok-2"));
        assert_eq!(verdict.entity_id.as_deref(), Some("ent-1"));
    }

    #[tokio::test]
    async fn cancel_forwards_session_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/challenges/v-1/cancel")
                    .json_body(json!({"session_token": "tok"}));
                then.status(204);
            })
            .await;

        let client = HttpAuthorityClient::new(server.base_url());
        client.cancel_challenge("v-1", Some("tok")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_challenge_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/challenges");
                then.status(200).json_body(json!({"code": "7f3a"}));
            })
            .await;

        let client = HttpAuthorityClient::new(server.base_url());
        let err = client.create_challenge("Alice", "ent-1").await.unwrap_err();
        assert!(matches!(err, AuthorityError::InvalidResponse(_)));
    }

    #[test]
    fn endpoint_percent_encodes_verification_id() {
        let client = HttpAuthorityClient::new("http://127.0.0.1:9");
        let url = client
            .endpoint(&["challenges", "v/1 ?x", "match"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/challenges/v%2F1%20%3Fx/match"
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let client = HttpAuthorityClient::new("https://auth.example/api/v2/");
        let url = client.endpoint(&["challenges", "v-1", "cancel"]).unwrap();
        assert_eq!(url.as_str(), "https://auth.example/api/v2/challenges/v-1/cancel");
    }

    #[tokio::test]
    async fn unparseable_base_url_is_request_failed() {
        let client = HttpAuthorityClient::new("not a url");
        let err = client.cancel_challenge("v-1", None).await.unwrap_err();
        assert!(matches!(err, AuthorityError::RequestFailed(_)));
    }
}
