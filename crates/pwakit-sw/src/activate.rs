//! Activate phase: reap superseded cache generations.

use async_trait::async_trait;
use tracing::info;

use crate::events::{unexpected, EventHandler, EventOutcome, WorkerEvent};
use crate::runtime::WorkerContext;
use crate::Result;

/// Deletes every generation that is not current.
///
/// This is the only eviction there is: generations go away whole when a new
/// worker version with new generation names activates.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivationReaper;

impl ActivationReaper {
    /// Returns the deleted generation names.
    pub async fn activate(ctx: &WorkerContext) -> Result<Vec<String>> {
        let current = ctx.config.current_generations();
        let deleted = ctx.caches.retain(&current).await?;
        for name in &deleted {
            info!(generation = %name, "Deleted old cache");
        }

        for name in current {
            ctx.caches.open(name).await?;
        }
        Ok(deleted)
    }
}

#[async_trait]
impl EventHandler for ActivationReaper {
    async fn handle(&self, ctx: &WorkerContext, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Activate => Ok(EventOutcome::Activated {
                deleted: Self::activate(ctx).await?,
            }),
            other => Err(unexpected("activate", &other)),
        }
    }
}
