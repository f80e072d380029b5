//! Connected clients (foreground pages) and window requests.
//!
//! The set is owned by the host: pages connect and disconnect on their own
//! schedule, so broadcasters query it at send time and never hold on to it.

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use url::Url;

use crate::message::WorkerMessage;
use crate::{Result, WorkerError};

/// Unique identifier for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
}

/// A connected client.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    pub client_type: ClientType,
    pub focused: bool,
    sender: mpsc::UnboundedSender<WorkerMessage>,
}

impl Client {
    /// Post a message; fails if the page has gone away.
    pub fn post_message(&self, message: WorkerMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| WorkerError::Client(format!("client {:?} disconnected", self.id)))
    }

    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// The page side of a connection.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ClientId,
    pub messages: mpsc::UnboundedReceiver<WorkerMessage>,
}

/// What the worker asks the embedder to do with windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowRequest {
    /// Open a new top-level window.
    Open(Url),
    /// Bring an existing window client to the front.
    Focus { client: ClientId, url: Url },
}

/// Clients API.
#[derive(Default)]
pub struct Clients {
    clients: RwLock<HashMap<ClientId, Client>>,
    window_tx: Option<mpsc::UnboundedSender<WindowRequest>>,
}

impl Clients {
    /// Clients with no window host; `open_window` fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients wired to an embedder that services window requests.
    pub fn with_window_host() -> (Self, mpsc::UnboundedReceiver<WindowRequest>) {
        let (window_tx, window_rx) = mpsc::unbounded_channel();
        (
            Self {
                clients: RwLock::new(HashMap::new()),
                window_tx: Some(window_tx),
            },
            window_rx,
        )
    }

    /// Attach a page.
    pub async fn connect(&self, url: Url, client_type: ClientType) -> ClientConnection {
        let (sender, messages) = mpsc::unbounded_channel();
        let id = ClientId::new();
        let client = Client {
            id,
            url,
            client_type,
            focused: false,
            sender,
        };
        debug!(client = ?id, url = %client.url, "Client connected");
        self.clients.write().await.insert(id, client);
        ClientConnection { id, messages }
    }

    pub async fn disconnect(&self, id: ClientId) -> Option<Client> {
        self.clients.write().await.remove(&id)
    }

    pub async fn get(&self, id: ClientId) -> Option<Client> {
        self.clients.read().await.get(&id).cloned()
    }

    /// Snapshot of every client still connected.
    ///
    /// Clients whose page dropped its receiver are pruned here.
    pub async fn match_all(&self) -> Vec<Client> {
        let mut clients = self.clients.write().await;
        clients.retain(|_, c| c.is_connected());
        clients.values().cloned().collect()
    }

    /// Focus a window client.
    pub async fn focus(&self, id: ClientId) -> Result<WindowRequest> {
        let mut clients = self.clients.write().await;
        let target = clients
            .get(&id)
            .ok_or_else(|| WorkerError::Client(format!("no client {:?}", id)))?;
        if target.client_type != ClientType::Window {
            return Err(WorkerError::Client(
                "Can only focus window clients".to_string(),
            ));
        }
        let url = target.url.clone();
        for client in clients.values_mut() {
            client.focused = client.id == id;
        }
        drop(clients);
        self.request_window(WindowRequest::Focus { client: id, url })
    }

    /// Ask the embedder for a new window at `url`.
    pub fn open_window(&self, url: Url) -> Result<WindowRequest> {
        self.request_window(WindowRequest::Open(url))
    }

    /// Focus a window already showing `url`, else open one.
    pub async fn open_or_focus(&self, url: Url) -> Result<WindowRequest> {
        let existing = self
            .match_all()
            .await
            .into_iter()
            .find(|c| c.client_type == ClientType::Window && c.url == url);
        match existing {
            Some(client) => self.focus(client.id).await,
            None => self.open_window(url),
        }
    }

    fn request_window(&self, request: WindowRequest) -> Result<WindowRequest> {
        let Some(ref window_tx) = self.window_tx else {
            warn!(?request, "No window host attached");
            return Err(WorkerError::Client("no window host attached".to_string()));
        };
        window_tx
            .send(request.clone())
            .map_err(|_| WorkerError::Client("window host is gone".to_string()))?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_post() {
        let clients = Clients::new();
        let mut conn = clients
            .connect(url("https://a.test/"), ClientType::Window)
            .await;

        let all = clients.match_all().await;
        assert_eq!(all.len(), 1);
        let message = WorkerMessage::UnrecoverableState {
            reason: "r".to_string(),
        };
        all[0].post_message(message.clone()).unwrap();
        assert_eq!(conn.messages.recv().await, Some(message));
    }

    #[tokio::test]
    async fn test_dropped_pages_are_pruned() {
        let clients = Clients::new();
        let conn = clients
            .connect(url("https://a.test/"), ClientType::Window)
            .await;
        let _kept = clients
            .connect(url("https://a.test/dashboard"), ClientType::Window)
            .await;
        drop(conn);

        let all = clients.match_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].url.path(), "/dashboard");
    }

    #[tokio::test]
    async fn test_open_window_without_host_fails() {
        let clients = Clients::new();
        assert!(clients.open_window(url("https://a.test/")).is_err());
    }

    #[tokio::test]
    async fn test_open_or_focus() {
        let (clients, mut windows) = Clients::with_window_host();
        let conn = clients
            .connect(url("https://a.test/dashboard"), ClientType::Window)
            .await;

        let request = clients
            .open_or_focus(url("https://a.test/dashboard"))
            .await
            .unwrap();
        assert_eq!(
            request,
            WindowRequest::Focus {
                client: conn.id,
                url: url("https://a.test/dashboard")
            }
        );
        assert!(clients.get(conn.id).await.unwrap().focused);

        let request = clients
            .open_or_focus(url("https://a.test/tasks/7"))
            .await
            .unwrap();
        assert_eq!(request, WindowRequest::Open(url("https://a.test/tasks/7")));

        assert!(matches!(
            windows.recv().await,
            Some(WindowRequest::Focus { .. })
        ));
        assert!(matches!(windows.recv().await, Some(WindowRequest::Open(_))));
    }

    #[tokio::test]
    async fn test_focus_rejects_worker_clients() {
        let (clients, _windows) = Clients::with_window_host();
        let conn = clients
            .connect(url("https://a.test/worker.js"), ClientType::Worker)
            .await;
        assert!(clients.focus(conn.id).await.is_err());
    }
}
