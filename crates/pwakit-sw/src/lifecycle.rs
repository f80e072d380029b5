//! Worker lifecycle states.

use serde::{Deserialize, Serialize};

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Script evaluated, nothing run yet.
    #[default]
    Parsed,
    /// Install event in progress.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activate event in progress.
    Activating,
    /// Active and intercepting fetches.
    Activated,
    /// Replaced, failed to install, or shut down.
    Redundant,
}

impl ServiceWorkerState {
    pub fn is_active(self) -> bool {
        self == Self::Activated
    }

    pub fn is_redundant(self) -> bool {
        self == Self::Redundant
    }

    /// States from which `next` may be entered.
    pub fn can_enter(self, next: ServiceWorkerState) -> bool {
        use ServiceWorkerState::*;
        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Activated)
                | (_, Redundant)
        )
    }
}
