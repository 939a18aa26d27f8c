use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthorityError {
    /// The authority answered and refused; the message is its own.
    #[error("{0}")]
    Rejected(String),

    #[error("authority request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response from authority: {0}")]
    InvalidResponse(String),

    #[error("authority unreachable: {0}")]
    Unreachable(String),
}
