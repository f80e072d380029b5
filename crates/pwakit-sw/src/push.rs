//! Push delivery and notification clicks.
//!
//! Push events arrive whether or not a page is open. The payload becomes a
//! platform notification carrying the target URL as data; clicking it routes
//! to a window at that URL.

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clients::WindowRequest;
use crate::config::NotificationConfig;
use crate::events::{unexpected, EventHandler, EventOutcome, WorkerEvent};
use crate::runtime::WorkerContext;
use crate::{Result, WorkerError};

// ==================== Payloads ====================

/// JSON body of a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub url: String,
}

/// A push event; `data` is absent for payload-less pushes.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    pub data: Option<Bytes>,
}

impl PushEvent {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    pub fn from_payload(payload: &PushPayload) -> Result<Self> {
        Ok(Self::new(serde_json::to_vec(payload)?))
    }

    /// Parse the data as JSON; `None` when there is no data.
    pub fn json<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.data {
            Some(ref data) => Ok(Some(serde_json::from_slice(data)?)),
            None => Ok(None),
        }
    }
}

// ==================== Notifications ====================

/// Unique identifier for a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Data attached to a notification until it is clicked or dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl NotificationOptions {
    pub fn from_payload(payload: &PushPayload, config: &NotificationConfig) -> Self {
        Self {
            body: payload.body.clone(),
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibrate: config.vibrate.clone(),
            data: NotificationData {
                url: payload.url.clone(),
            },
            actions: config
                .actions
                .iter()
                .map(|a| NotificationAction {
                    action: a.action.clone(),
                    title: a.title.clone(),
                })
                .collect(),
        }
    }
}

/// A displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub options: NotificationOptions,
}

impl Notification {
    /// Target URL attached as data.
    pub fn url(&self) -> &str {
        &self.options.data.url
    }
}

/// The platform's notification surface.
#[async_trait]
pub trait NotificationCenter: Send + Sync {
    async fn show(&self, title: &str, options: NotificationOptions) -> Result<Notification>;

    async fn close(&self, id: NotificationId) -> Result<()>;
}

/// Notification center that keeps displayed notifications in memory.
#[derive(Debug, Default)]
pub struct MemoryNotificationCenter {
    shown: RwLock<HashMap<NotificationId, Notification>>,
}

impl MemoryNotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications currently on screen.
    pub async fn displayed(&self) -> Vec<Notification> {
        self.shown.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: NotificationId) -> Option<Notification> {
        self.shown.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl NotificationCenter for MemoryNotificationCenter {
    async fn show(&self, title: &str, options: NotificationOptions) -> Result<Notification> {
        let notification = Notification {
            id: NotificationId::new(),
            title: title.to_string(),
            options,
        };
        self.shown
            .write()
            .await
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn close(&self, id: NotificationId) -> Result<()> {
        self.shown.write().await.remove(&id);
        Ok(())
    }
}

// ==================== Push Dispatcher ====================

/// Renders push payloads as notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct PushDispatcher;

impl PushDispatcher {
    /// Show the notification for `event`; payload-less pushes show nothing.
    pub async fn dispatch(ctx: &WorkerContext, event: &PushEvent) -> Result<Option<Notification>> {
        let payload = match event.json::<PushPayload>() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("Push without payload");
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "Malformed push payload");
                return Err(e);
            }
        };

        let options = NotificationOptions::from_payload(&payload, &ctx.config.notification);
        let notification = ctx.notifications.show(&payload.title, options).await?;
        info!(
            id = ?notification.id,
            title = %notification.title,
            url = %notification.url(),
            "Notification shown"
        );
        Ok(Some(notification))
    }
}

#[async_trait]
impl EventHandler for PushDispatcher {
    async fn handle(&self, ctx: &WorkerContext, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Push(push) => Ok(EventOutcome::Pushed(Self::dispatch(ctx, &push).await?)),
            other => Err(unexpected("push", &other)),
        }
    }
}

// ==================== Notification Click ====================

/// A click on a notification or one of its action buttons.
#[derive(Debug, Clone)]
pub struct NotificationClickEvent {
    pub notification: Notification,
    /// Clicked action; `None` for the notification body.
    pub action: Option<String>,
}

impl NotificationClickEvent {
    pub fn body(notification: Notification) -> Self {
        Self {
            notification,
            action: None,
        }
    }

    pub fn action(notification: Notification, action: &str) -> Self {
        Self {
            notification,
            action: Some(action.to_string()),
        }
    }
}

/// Routes notification clicks to windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationClickRouter;

impl NotificationClickRouter {
    /// Close the notification; `open` or a body click then opens or focuses
    /// a window at the attached URL. Any other action only dismisses.
    pub async fn route(
        ctx: &WorkerContext,
        event: &NotificationClickEvent,
    ) -> Result<Option<WindowRequest>> {
        let notification = &event.notification;
        if let Err(e) = ctx.notifications.close(notification.id).await {
            warn!(id = ?notification.id, error = %e, "Failed to close notification");
        }

        match event.action.as_deref() {
            None | Some("") | Some("open") => {
                let url = ctx.config.resolve(notification.url())?;
                let request = ctx.clients.open_or_focus(url).await.map_err(|e| {
                    WorkerError::Notification(format!("cannot open {}: {}", notification.url(), e))
                })?;
                Ok(Some(request))
            }
            Some(action) => {
                debug!(action, "Notification dismissed");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl EventHandler for NotificationClickRouter {
    async fn handle(&self, ctx: &WorkerContext, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::NotificationClick(click) => {
                Ok(EventOutcome::Clicked(Self::route(ctx, &click).await?))
            }
            other => Err(unexpected("notificationclick", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> PushPayload {
        PushPayload {
            title: "T".to_string(),
            body: "B".to_string(),
            url: "/dashboard".to_string(),
        }
    }

    #[test]
    fn test_push_event_json() {
        let event = PushEvent::new(r#"{"title":"T","body":"B","url":"/dashboard"}"#);
        assert_eq!(event.json::<PushPayload>().unwrap(), Some(payload()));
        assert_eq!(PushEvent::default().json::<PushPayload>().unwrap(), None);
        assert!(matches!(
            PushEvent::new("not json").json::<PushPayload>(),
            Err(WorkerError::Payload(_))
        ));
    }

    #[test]
    fn test_options_from_payload() {
        let options = NotificationOptions::from_payload(&payload(), &NotificationConfig::default());
        assert_eq!(options.body, "B");
        assert_eq!(options.icon, "/icons/icon-192x192.png");
        assert_eq!(options.badge, "/icons/badge-72x72.png");
        assert_eq!(options.vibrate, vec![100, 50, 100]);
        assert_eq!(options.data.url, "/dashboard");
        let actions: Vec<_> = options.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec!["open", "close"]);
    }

    #[tokio::test]
    async fn test_memory_center_show_and_close() {
        let center = MemoryNotificationCenter::new();
        let options = NotificationOptions::from_payload(&payload(), &NotificationConfig::default());
        let shown = center.show("T", options).await.unwrap();
        assert_eq!(center.get(shown.id).await.unwrap().url(), "/dashboard");

        center.close(shown.id).await.unwrap();
        assert!(center.displayed().await.is_empty());
    }
}
