//! The worker process: an event loop over host-dispatched events.
//!
//! Every dispatched event is an extendable event: the caller's future stays
//! pending until the handler's work is done. Install and activate run one at
//! a time, in arrival order, as their own task; fetch, push and click events
//! each get their own task and may interleave with them and with each other.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cache::CacheStorage;
use crate::clients::{Clients, WindowRequest};
use crate::config::WorkerConfig;
use crate::events::{EventHandler, EventKind, EventOutcome, HandlerTable, WorkerEvent};
use crate::fetch::FetchDisposition;
use crate::install::InstallOutcome;
use crate::lifecycle::ServiceWorkerState;
use crate::net::{Network, Request, Response};
use crate::notifier::FailureNotifier;
use crate::push::{Notification, NotificationCenter, NotificationClickEvent, PushEvent};
use crate::{Result, WorkerError};

// ==================== Context ====================

/// Everything a handler may touch.
pub struct WorkerContext {
    pub config: Arc<WorkerConfig>,
    pub caches: Arc<CacheStorage>,
    pub network: Arc<dyn Network>,
    pub clients: Arc<Clients>,
    pub notifications: Arc<dyn NotificationCenter>,
    pub notifier: FailureNotifier,
}

impl WorkerContext {
    pub fn new(
        config: WorkerConfig,
        caches: Arc<CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<Clients>,
        notifications: Arc<dyn NotificationCenter>,
    ) -> Self {
        let notifier = FailureNotifier::new(Arc::clone(&clients), config.renotify);
        Self {
            config: Arc::new(config),
            caches,
            network,
            clients,
            notifications,
            notifier,
        }
    }
}

// ==================== Runtime ====================

type Completion = oneshot::Sender<Result<EventOutcome>>;

enum Command {
    Dispatch { event: WorkerEvent, done: Completion },
    State(oneshot::Sender<ServiceWorkerState>),
    Shutdown(oneshot::Sender<()>),
}

/// A finished install or activate, reported back to the loop so the state
/// changes before the caller is released.
struct LifecycleRun {
    kind: EventKind,
    result: Result<EventOutcome>,
    done: Completion,
}

/// States a lifecycle event enters while running and after it.
fn phases(kind: EventKind) -> (ServiceWorkerState, ServiceWorkerState) {
    match kind {
        EventKind::Install => (ServiceWorkerState::Installing, ServiceWorkerState::Installed),
        _ => (ServiceWorkerState::Activating, ServiceWorkerState::Activated),
    }
}

/// One worker version.
pub struct WorkerRuntime {
    ctx: Arc<WorkerContext>,
    handlers: Arc<HandlerTable>,
    state: ServiceWorkerState,
    queued: VecDeque<(WorkerEvent, Completion)>,
}

impl WorkerRuntime {
    /// Runtime with the standard handlers.
    pub fn new(ctx: WorkerContext) -> Self {
        Self::with_handlers(ctx, HandlerTable::default())
    }

    pub fn with_handlers(ctx: WorkerContext, handlers: HandlerTable) -> Self {
        Self {
            ctx: Arc::new(ctx),
            handlers: Arc::new(handlers),
            state: ServiceWorkerState::Parsed,
            queued: VecDeque::new(),
        }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Start the event loop on the current tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let network = Arc::clone(&self.ctx.network);
        info!(
            static_cache = %self.ctx.config.static_cache,
            dynamic_cache = %self.ctx.config.dynamic_cache,
            "Worker started"
        );
        tokio::spawn(self.run(rx));
        WorkerHandle { tx, network }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut tasks = JoinSet::new();
        let mut lifecycle = JoinSet::new();
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Dispatch { event, done }) if event.kind().is_lifecycle() => {
                        self.queued.push_back((event, done));
                        self.start_lifecycle(&mut lifecycle);
                    }
                    Some(Command::Dispatch { event, done }) => {
                        self.dispatch(event, done, &mut tasks);
                    }
                    Some(Command::State(reply)) => {
                        let _ = reply.send(self.state);
                    }
                    Some(Command::Shutdown(reply)) => {
                        self.drain(&mut tasks, &mut lifecycle).await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.drain(&mut tasks, &mut lifecycle).await;
                        break;
                    }
                },
                Some(joined) = lifecycle.join_next(), if !lifecycle.is_empty() => {
                    self.finish_lifecycle(joined);
                    self.start_lifecycle(&mut lifecycle);
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Event task aborted");
                    }
                }
            }
        }
        debug!("Worker event loop stopped");
    }

    /// Wait for in-flight fetch, push and click events. Queued lifecycle
    /// events are dropped and a running one is cancelled.
    async fn drain(&mut self, tasks: &mut JoinSet<()>, lifecycle: &mut JoinSet<LifecycleRun>) {
        self.queued.clear();
        lifecycle.abort_all();
        while let Some(joined) = lifecycle.join_next().await {
            match joined {
                Err(e) if e.is_cancelled() => warn!("Lifecycle event cancelled by shutdown"),
                joined => self.finish_lifecycle(joined),
            }
        }
        while tasks.join_next().await.is_some() {}
        self.state = ServiceWorkerState::Redundant;
        info!("Worker is redundant");
    }

    fn dispatch(&mut self, event: WorkerEvent, done: Completion, tasks: &mut JoinSet<()>) {
        let kind = event.kind();
        if kind == EventKind::Fetch && !self.state.is_active() {
            debug!(state = ?self.state, "Worker not active; fetch is not intercepted");
            let _ = done.send(Ok(EventOutcome::unhandled(event)));
            return;
        }

        let ctx = Arc::clone(&self.ctx);
        let handler = self.handlers.get(kind);
        let span = info_span!("worker_event", kind = %kind);
        tasks.spawn(
            async move {
                let result = handle(&ctx, handler, event).await;
                let _ = done.send(result);
            }
            .instrument(span),
        );
    }

    /// Start the next queued lifecycle event unless one is already running.
    fn start_lifecycle(&mut self, lifecycle: &mut JoinSet<LifecycleRun>) {
        if !lifecycle.is_empty() {
            return;
        }
        while let Some((event, done)) = self.queued.pop_front() {
            let kind = event.kind();
            let (entering, _) = phases(kind);
            if !self.state.can_enter(entering) {
                let _ = done.send(Err(WorkerError::State(format!(
                    "cannot {} while {:?}",
                    kind, self.state
                ))));
                continue;
            }

            self.state = entering;
            let ctx = Arc::clone(&self.ctx);
            let handler = self.handlers.get(kind);
            let span = info_span!("worker_event", kind = %kind);
            lifecycle.spawn(
                async move {
                    let result = handle(&ctx, handler, event).await;
                    LifecycleRun { kind, result, done }
                }
                .instrument(span),
            );
            return;
        }
    }

    fn finish_lifecycle(&mut self, joined: std::result::Result<LifecycleRun, JoinError>) {
        let run = match joined {
            Ok(run) => run,
            Err(e) => {
                // The completion went down with the task; its caller sees a
                // terminated worker.
                error!(error = %e, "Lifecycle task aborted");
                self.state = ServiceWorkerState::Redundant;
                return;
            }
        };

        let (_, entered) = phases(run.kind);
        self.state = match (&run.result, run.kind) {
            // A failed install leaves nothing to activate.
            (Err(_), EventKind::Install) => ServiceWorkerState::Redundant,
            _ => entered,
        };
        info!(state = ?self.state, "Lifecycle phase complete");
        let _ = run.done.send(run.result);
    }
}

async fn handle(
    ctx: &WorkerContext,
    handler: Option<Arc<dyn EventHandler>>,
    event: WorkerEvent,
) -> Result<EventOutcome> {
    let Some(handler) = handler else {
        return Ok(EventOutcome::unhandled(event));
    };
    let result = handler.handle(ctx, event).await;
    if let Err(ref e) = result {
        warn!(error = %e, "Event handler failed");
    }
    result
}

// ==================== Handle ====================

/// Host-side handle for dispatching events to a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Command>,
    network: Arc<dyn Network>,
}

fn terminated() -> WorkerError {
    WorkerError::State("worker terminated".to_string())
}

fn mismatched(outcome: EventOutcome) -> WorkerError {
    WorkerError::State(format!("handler produced mismatched outcome {:?}", outcome))
}

impl WorkerHandle {
    /// Dispatch an event and wait until its handler has finished.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        let (done, pending) = oneshot::channel();
        self.tx
            .send(Command::Dispatch { event, done })
            .map_err(|_| terminated())?;
        pending.await.map_err(|_| terminated())?
    }

    pub async fn install(&self) -> Result<InstallOutcome> {
        match self.dispatch(WorkerEvent::Install).await? {
            EventOutcome::Installed(outcome) => Ok(outcome),
            other => Err(mismatched(other)),
        }
    }

    /// Activate; returns the generations that were deleted.
    pub async fn activate(&self) -> Result<Vec<String>> {
        match self.dispatch(WorkerEvent::Activate).await? {
            EventOutcome::Activated { deleted } => Ok(deleted),
            other => Err(mismatched(other)),
        }
    }

    /// Issue a request through the worker.
    ///
    /// Requests the worker passes through are sent to the network directly.
    pub async fn fetch(&self, request: Request) -> Result<Response> {
        match self.dispatch(WorkerEvent::Fetch(request)).await? {
            EventOutcome::Fetched(FetchDisposition::Respond(response)) => Ok(response),
            EventOutcome::Fetched(FetchDisposition::PassThrough(request)) => {
                self.network.fetch(request).await
            }
            other => Err(mismatched(other)),
        }
    }

    pub async fn push(&self, event: PushEvent) -> Result<Option<Notification>> {
        match self.dispatch(WorkerEvent::Push(event)).await? {
            EventOutcome::Pushed(notification) => Ok(notification),
            other => Err(mismatched(other)),
        }
    }

    pub async fn notification_click(
        &self,
        event: NotificationClickEvent,
    ) -> Result<Option<WindowRequest>> {
        match self.dispatch(WorkerEvent::NotificationClick(event)).await? {
            EventOutcome::Clicked(request) => Ok(request),
            other => Err(mismatched(other)),
        }
    }

    pub async fn state(&self) -> Result<ServiceWorkerState> {
        let (reply, state) = oneshot::channel();
        self.tx
            .send(Command::State(reply))
            .map_err(|_| terminated())?;
        state.await.map_err(|_| terminated())
    }

    /// Wait for in-flight events, then stop the worker.
    pub async fn shutdown(&self) {
        let (reply, stopped) = oneshot::channel();
        if self.tx.send(Command::Shutdown(reply)).is_ok() {
            let _ = stopped.await;
        }
    }
}
