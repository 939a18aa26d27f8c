use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("chat feed request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response from chat feed: {0}")]
    InvalidResponse(String),

    #[error("chat feed unreachable: {0}")]
    Unreachable(String),
}
