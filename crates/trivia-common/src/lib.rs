//! # Trivia Common
//!
//! Shared plumbing for the SDA Trivia workspace.
//!
//! ## Features
//!
//! - Logging configuration and subscriber setup
//! - Retry with exponential backoff (used for worker install attempts)

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, RetryConfig};
