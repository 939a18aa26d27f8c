//! Chat feed client.
//!
//! The feed is an independently operated, publicly readable message stream.
//! This crate only reads the latest batch from it:
//! - no caching, every call hits the live endpoint
//! - no retries, the polling controller decides what a failure means
//! - no ordering or pagination assumptions

pub mod client;
pub mod error;

pub use client::{FeedClient, HttpFeedClient};
pub use error::FeedError;
