//! Worker events and the handler table.

use async_trait::async_trait;
use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::activate::ActivationReaper;
use crate::clients::WindowRequest;
use crate::fetch::{FetchDisposition, FetchInterceptor};
use crate::install::{InstallManager, InstallOutcome};
use crate::net::Request;
use crate::push::{
    Notification, NotificationClickEvent, NotificationClickRouter, PushDispatcher, PushEvent,
};
use crate::runtime::WorkerContext;
use crate::{Result, WorkerError};

/// Event kinds the host dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Push,
    NotificationClick,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Install,
        EventKind::Activate,
        EventKind::Fetch,
        EventKind::Push,
        EventKind::NotificationClick,
    ];

    /// Install and activate run one at a time, in order.
    pub fn is_lifecycle(self) -> bool {
        matches!(self, EventKind::Install | EventKind::Activate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Push => "push",
            EventKind::NotificationClick => "notificationclick",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event with its payload.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Push(PushEvent),
    NotificationClick(NotificationClickEvent),
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install => EventKind::Install,
            WorkerEvent::Activate => EventKind::Activate,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Push(_) => EventKind::Push,
            WorkerEvent::NotificationClick(_) => EventKind::NotificationClick,
        }
    }
}

/// What a handled event produced.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallOutcome),
    Activated { deleted: Vec<String> },
    Fetched(FetchDisposition),
    Pushed(Option<Notification>),
    Clicked(Option<WindowRequest>),
}

impl EventOutcome {
    /// Platform default when no handler is registered for the event.
    pub fn unhandled(event: WorkerEvent) -> Self {
        match event {
            WorkerEvent::Install => EventOutcome::Installed(InstallOutcome::Seeded { entries: 0 }),
            WorkerEvent::Activate => EventOutcome::Activated { deleted: Vec::new() },
            WorkerEvent::Fetch(request) => {
                EventOutcome::Fetched(FetchDisposition::PassThrough(request))
            }
            WorkerEvent::Push(_) => EventOutcome::Pushed(None),
            WorkerEvent::NotificationClick(_) => EventOutcome::Clicked(None),
        }
    }
}

/// Handles one kind of event.
///
/// Handlers keep no state of their own between events; everything durable
/// lives in the context's cache storage.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: &WorkerContext, event: WorkerEvent) -> Result<EventOutcome>;
}

pub(crate) fn unexpected(handler: &str, event: &WorkerEvent) -> WorkerError {
    WorkerError::State(format!(
        "{} handler received a {} event",
        handler,
        event.kind()
    ))
}

/// Handlers keyed by event kind.
#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerTable {
    /// A table with no handlers; every event gets the platform default.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `kind`, returning the one it replaces.
    pub fn register(
        &mut self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
    ) -> Option<Arc<dyn EventHandler>> {
        self.handlers.insert(kind, handler)
    }

    pub fn remove(&mut self, kind: EventKind) -> Option<Arc<dyn EventHandler>> {
        self.handlers.remove(&kind)
    }

    pub fn get(&self, kind: EventKind) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.register(EventKind::Install, Arc::new(InstallManager));
        table.register(EventKind::Activate, Arc::new(ActivationReaper));
        table.register(EventKind::Fetch, Arc::new(FetchInterceptor));
        table.register(EventKind::Push, Arc::new(PushDispatcher));
        table.register(EventKind::NotificationClick, Arc::new(NotificationClickRouter));
        table
    }
}
