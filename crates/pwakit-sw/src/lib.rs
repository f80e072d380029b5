//! # PwaKit Service Worker
//!
//! Offline-resilience worker for the task tracker PWA.
//!
//! ## Features
//!
//! - **Cache generations**: a pre-seeded static generation and a lazily
//!   filled dynamic generation, optionally persisted to SQLite
//! - **Lifecycle**: install (seed), activate (reap superseded generations)
//! - **Fetch interception**: cache-first with network fallback
//! - **Failure broadcast**: `UNRECOVERABLE_STATE` messages to every client
//! - **Push**: notifications with `open`/`close` actions and click routing
//!
//! ## Architecture
//!
//! ```text
//! WorkerHandle ──(event + completion)──► WorkerRuntime
//!                                          │
//!   lifecycle queue, one at a time         ├── Install  → InstallManager
//!                                          ├── Activate → ActivationReaper
//!   JoinSet, concurrent                    ├── Fetch    → FetchInterceptor
//!                                          ├── Push     → PushDispatcher
//!                                          └── Click    → NotificationClickRouter
//!
//! WorkerContext (the only state a handler sees)
//!     ├── CacheStorage ── Cache (one per generation) ── request key → CacheEntry
//!     ├── Network
//!     ├── Clients ──────── WorkerMessage ──► foreground pages
//!     ├── NotificationCenter
//!     └── FailureNotifier
//! ```

use thiserror::Error;

pub mod activate;
pub mod cache;
pub mod clients;
pub mod config;
pub mod events;
pub mod fetch;
pub mod install;
pub mod lifecycle;
pub mod message;
pub mod net;
pub mod notifier;
pub mod persist;
pub mod push;
pub mod runtime;

pub use activate::ActivationReaper;
pub use cache::{Cache, CacheEntry, CacheStorage};
pub use clients::{Client, ClientConnection, ClientId, ClientType, Clients, WindowRequest};
pub use config::{NotificationConfig, RenotifyPolicy, WorkerConfig};
pub use events::{EventHandler, EventKind, EventOutcome, HandlerTable, WorkerEvent};
pub use fetch::{FetchDisposition, FetchInterceptor};
pub use install::{InstallManager, InstallOutcome};
pub use lifecycle::ServiceWorkerState;
pub use message::{FailureKind, FailureSignal, WorkerMessage};
pub use net::{HttpNetwork, Network, Request, RequestMode, Response, ResponseType};
pub use notifier::FailureNotifier;
pub use push::{
    MemoryNotificationCenter, Notification, NotificationAction, NotificationCenter,
    NotificationClickEvent, NotificationClickRouter, NotificationId, NotificationOptions,
    PushDispatcher, PushEvent, PushPayload,
};
pub use runtime::{WorkerContext, WorkerHandle, WorkerRuntime};

// ==================== Errors ====================

/// Errors that can occur in worker operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<rusqlite::Error> for WorkerError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
