//! Install phase: seed the static generation from the precache manifest.

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{error, info};

use crate::events::{unexpected, EventHandler, EventOutcome, WorkerEvent};
use crate::net::{Request, Response};
use crate::runtime::WorkerContext;
use crate::{Result, WorkerError};

/// Result of an install phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Every manifest entry was stored.
    Seeded { entries: usize },
    /// Seeding failed and was broadcast; the worker installed anyway.
    Degraded { reason: String },
}

impl InstallOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Seeds the static generation. Degrades and notifies instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstallManager;

impl InstallManager {
    pub async fn install(ctx: &WorkerContext) -> Result<InstallOutcome> {
        match Self::seed(ctx).await {
            Ok(entries) => {
                info!(
                    generation = %ctx.config.static_cache,
                    entries,
                    "Static assets cached"
                );
                Ok(InstallOutcome::Seeded { entries })
            }
            Err(e) => {
                error!(error = %e, "Cache installation failed");
                let reason = format!("Failed to install cache: {}", e);
                ctx.notifier.notify(reason.clone()).await;
                Ok(InstallOutcome::Degraded { reason })
            }
        }
    }

    /// Fetch the whole manifest, then commit it in one write.
    async fn seed(ctx: &WorkerContext) -> Result<usize> {
        let generation = &ctx.config.static_cache;
        ctx.caches.open(generation).await?;
        info!(generation = %generation, "Caching static assets");

        let requests = ctx
            .config
            .precache
            .iter()
            .map(|path| ctx.config.resolve(path).map(Request::get))
            .collect::<Result<Vec<_>>>()?;

        let fetches = requests.into_iter().map(|request| fetch_ok(ctx, request));
        let fetched = try_join_all(fetches).await?;
        ctx.caches.put_all(generation, &fetched).await
    }
}

async fn fetch_ok(ctx: &WorkerContext, request: Request) -> Result<(Request, Response)> {
    let response = ctx.network.fetch(request.clone()).await?;
    if !response.ok() {
        return Err(WorkerError::Network(format!(
            "{} responded with status {}",
            request.url, response.status
        )));
    }
    Ok((request, response))
}

#[async_trait]
impl EventHandler for InstallManager {
    async fn handle(&self, ctx: &WorkerContext, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => Ok(EventOutcome::Installed(Self::install(ctx).await?)),
            other => Err(unexpected("install", &other)),
        }
    }
}
