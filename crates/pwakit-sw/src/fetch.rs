//! Fetch interception: cache-first with network fallback.

use async_trait::async_trait;
use tracing::{debug, error, trace, warn};

use crate::events::{unexpected, EventHandler, EventOutcome, WorkerEvent};
use crate::net::{Request, Response};
use crate::runtime::WorkerContext;
use crate::Result;

/// What the worker did with an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchDisposition {
    /// Not handled; the host performs the request as if no worker existed.
    PassThrough(Request),
    /// Answered by the worker, from cache or network.
    Respond(Response),
}

/// Cache-first read path for GET requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchInterceptor;

impl FetchInterceptor {
    pub async fn intercept(ctx: &WorkerContext, request: Request) -> Result<FetchDisposition> {
        // Offline writes are unsupported; mutating requests go straight out.
        if !request.is_get() {
            trace!(url = %request.url, method = %request.method, "Not intercepting");
            return Ok(FetchDisposition::PassThrough(request));
        }

        if let Some(cached) = ctx.caches.match_request(&request).await {
            debug!(url = %request.url, "Serving from cache");
            return Ok(FetchDisposition::Respond(cached));
        }

        match ctx.network.fetch(request.clone()).await {
            Ok(response) => {
                if response.is_cacheable() {
                    let generation = &ctx.config.dynamic_cache;
                    if let Err(e) = ctx.caches.put(generation, &request, &response).await {
                        warn!(url = %request.url, error = %e, "Failed to cache response");
                    }
                }
                Ok(FetchDisposition::Respond(response))
            }
            Err(e) => {
                error!(url = %request.url, error = %e, "Fetch failed");
                if ctx.config.is_critical(&request.url) {
                    ctx.notifier
                        .notify(format!("Failed to fetch critical asset: {}", request.url))
                        .await;
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventHandler for FetchInterceptor {
    async fn handle(&self, ctx: &WorkerContext, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetched(
                Self::intercept(ctx, request).await?,
            )),
            other => Err(unexpected("fetch", &other)),
        }
    }
}
