use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp is empty")]
    Empty,

    #[error("unrecognised timestamp format: {0}")]
    Unrecognised(String),

    #[error("timestamp {0} is before the Unix epoch")]
    BeforeEpoch(String),
}
