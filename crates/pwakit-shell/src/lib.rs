//! # PwaKit Shell
//!
//! The foreground half of the offline worker. A page registers the worker
//! once the document has loaded and then listens on its client channel for
//! unrecoverable-state broadcasts, answering each with a reload prompt.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Page                        │
//! │  ServiceWorkerContainer    RecoveryListener  │
//! │   register_on_load()  ───►  run(messages)    │
//! └────────┬───────────────────────▲─────────────┘
//!          │ spawn/install/activate│ UNRECOVERABLE_STATE
//! ┌────────▼───────────────────────┴─────────────┐
//! │          pwakit-sw WorkerRuntime             │
//! └──────────────────────────────────────────────┘
//! ```

pub mod container;
pub mod recovery;

pub use container::{ServiceWorkerContainer, ServiceWorkerRegistration};
pub use recovery::{
    Prompt, RecoveryListener, RecoveryOutcome, RecoveryState, Reloader, RELOAD_PROMPT,
};

use pwakit_sw::WorkerError;
use thiserror::Error;

// ==================== Errors ====================

/// Errors raised on the page side.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShellError {
    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Worker message channel closed")]
    Channel,
}

impl From<WorkerError> for ShellError {
    fn from(e: WorkerError) -> Self {
        ShellError::Registration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
