//! # Trivia Leaderboard
//!
//! Server side of the score submission call.
//!
//! ```text
//! caller ──► unauthenticated? ──► sanitize ──► validate ──► merge-upsert
//!                  │                              │             │
//!                  ▼                              ▼             ▼
//!          unauthenticated           invalid-argument      { ok: true }
//!                                 / failed-precondition
//! ```
//!
//! Validation is fail-fast and nothing is written on any rejection. Records
//! are keyed by the caller's uid, so a caller can only overwrite their own
//! entry.

pub mod error;
pub mod service;
pub mod store;
pub mod submission;
pub mod validator;

pub use error::{ErrorCode, SubmissionError};
pub use service::{Clock, FixedClock, Leaderboard, LeaderboardEntry, SubmitResponse, SystemClock};
pub use store::{Document, LeaderboardStore, MemoryStore, SqliteStore};
pub use submission::{coerce_int, RawSubmission, ScoreSubmission};
pub use validator::{ScoreValidator, ValidSubmission};
