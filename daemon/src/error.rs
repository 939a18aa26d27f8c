use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("failed to serialise config: {0}")]
    Serialize(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
