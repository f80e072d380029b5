//! Worker → client messages.

use serde::{Deserialize, Serialize};

/// Messages the worker posts to foreground clients.
///
/// Serialized as a tagged object, e.g.
/// `{"type":"UNRECOVERABLE_STATE","reason":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// The page cannot recover without a full reload.
    UnrecoverableState { reason: String },
}

impl WorkerMessage {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Kind of a failure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Unrecoverable,
}

/// A failure raised inside the worker, alive only while it is broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSignal {
    pub kind: FailureKind,
    pub reason: String,
}

impl FailureSignal {
    pub fn unrecoverable(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Unrecoverable,
            reason: reason.into(),
        }
    }

    /// Wire message for this signal.
    pub fn message(&self) -> WorkerMessage {
        match self.kind {
            FailureKind::Unrecoverable => WorkerMessage::UnrecoverableState {
                reason: self.reason.clone(),
            },
        }
    }
}
