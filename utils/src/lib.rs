//! Shared utilities for the verification workspace.

pub mod logging;
pub mod time;

pub use logging::{init_logging, LogFormat, UnknownLogFormat};
pub use time::{format_countdown, format_duration};
