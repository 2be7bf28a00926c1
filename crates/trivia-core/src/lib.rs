//! SDA Trivia Core Library
//!
//! Shared types, errors, and configuration for the trivia worker and
//! leaderboard crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{LeaderboardRules, LoggingSettings, RetrySettings, TriviaConfig, WorkerConfig};
pub use error::{TriviaError, TriviaResult};
pub use types::{CallerIdentity, Uid};
