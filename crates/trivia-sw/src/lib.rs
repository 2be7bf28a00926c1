//! # Trivia Offline Worker
//!
//! The service worker behind the SDA Trivia Challenge, modelled as an
//! explicit state object with injectable network I/O.
//!
//! ## Features
//!
//! - **Cache generations**: one versioned cache per deploy, populated in
//!   full at install and purged of older versions at activate
//! - **Navigation fallback**: network-first page loads that fall back to
//!   the exact page, the menu, the game page, then `/`
//! - **Asset serving**: cache-first with a network fallback
//! - **Messaging**: ping/ack and prayer-reminder notification routing
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker ── dispatch(WorkerEvent)
//!     ├── install / activate ── lifecycle ── CacheStorage
//!     ├── fetch ── FetchInterceptor ── FallbackChain
//!     │                 └── Network (reqwest | static)
//!     └── message / notificationclick ── Messenger ── Clients
//! ```

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod fetch;
pub mod lifecycle;
pub mod messenger;
pub mod network;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheStorage};
pub use clients::{Client, ClientId, ClientMatchOptions, ClientType, Clients};
pub use fetch::{
    FallbackChain, FallbackStep, FetchInterceptor, FetchRequest, FetchResponse, RequestMode,
    ResponseSource,
};
pub use lifecycle::{ActivationReport, GenerationManifest, InstallReport};
pub use messenger::{
    ClickOutcome, ClickRoute, MessageEvent, MessageOutcome, Messenger, Notification,
    NotificationClickEvent, NotificationMessage, NotificationPayload, ReminderAction,
    WorkerMessage, PRAYER_REMINDER,
};
pub use network::{Network, NetworkError, ReqwestNetwork, StaticNetwork};
pub use worker::{EventOutcome, ServiceWorker, ServiceWorkerId, ServiceWorkerState, StateChange, WorkerEvent};

/// Errors that can occur in worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    /// A manifest asset could not be cached; nothing from the attempt was stored.
    #[error("Install failed at {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    /// Offline and no fallback page cached.
    #[error("Navigation failed, nothing cached for {0}")]
    NavigationFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
