use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("invalid verification config: {0}")]
    InvalidConfig(String),
}
