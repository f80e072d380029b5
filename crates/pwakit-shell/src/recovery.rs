//! Reload-on-failure recovery for the foreground page.
//!
//! The only recovery there is: ask the user, and on confirmation reload the
//! whole page. Declining leaves the page running degraded until the next
//! failure signal prompts again.

use pwakit_sw::WorkerMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{Result, ShellError};

/// Text of the blocking reload confirmation.
pub const RELOAD_PROMPT: &str =
    "An error occurred that requires a page reload to fix. Would you like to reload now?";

/// A blocking yes/no confirmation shown to the user.
pub trait Prompt {
    fn confirm(&mut self, message: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Prompt for F {
    fn confirm(&mut self, message: &str) -> bool {
        self(message)
    }
}

/// Full reload of the page, re-fetching its documents and reconnecting the
/// worker.
pub trait Reloader {
    fn reload(&mut self);
}

impl<F: FnMut()> Reloader for F {
    fn reload(&mut self) {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryState {
    #[default]
    Normal,
    /// A failure was signalled and a reload was confirmed or is being asked.
    PendingReload,
}

/// What one message led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Not a failure signal, or a reload is already underway.
    Ignored,
    Reloaded,
    Declined,
}

pub struct RecoveryListener<P, R> {
    prompt: P,
    reloader: R,
    state: RecoveryState,
}

impl<P: Prompt, R: Reloader> RecoveryListener<P, R> {
    pub fn new(prompt: P, reloader: R) -> Self {
        Self {
            prompt,
            reloader,
            state: RecoveryState::Normal,
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// React to one worker message.
    pub fn handle(&mut self, message: &WorkerMessage) -> RecoveryOutcome {
        if self.state == RecoveryState::PendingReload {
            debug!(?message, "Reload already underway");
            return RecoveryOutcome::Ignored;
        }

        match message {
            WorkerMessage::UnrecoverableState { reason } => {
                warn!(reason = %reason, "Worker reported an unrecoverable state");
                self.state = RecoveryState::PendingReload;

                if self.prompt.confirm(RELOAD_PROMPT) {
                    info!("Reloading page");
                    self.reloader.reload();
                    RecoveryOutcome::Reloaded
                } else {
                    info!("Reload declined; continuing degraded");
                    self.state = RecoveryState::Normal;
                    RecoveryOutcome::Declined
                }
            }
        }
    }

    /// React to a raw message off the wire. Unknown message types are ignored.
    pub fn handle_json(&mut self, json: &str) -> RecoveryOutcome {
        match WorkerMessage::from_json(json) {
            Ok(message) => self.handle(&message),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized worker message");
                RecoveryOutcome::Ignored
            }
        }
    }

    /// Listen until the page reloads.
    ///
    /// Returns [`ShellError::Channel`] if the worker side goes away first.
    pub async fn run(
        &mut self,
        mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
    ) -> Result<RecoveryOutcome> {
        while let Some(message) = messages.recv().await {
            if self.handle(&message) == RecoveryOutcome::Reloaded {
                return Ok(RecoveryOutcome::Reloaded);
            }
        }
        debug!("Worker message channel closed");
        Err(ShellError::Channel)
    }
}
