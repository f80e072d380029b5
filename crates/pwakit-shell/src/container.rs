//! Worker registration from the page (`navigator.serviceWorker`).

use pwakit_sw::{
    ClientId, ClientType, Clients, InstallOutcome, ServiceWorkerState, WorkerHandle,
    WorkerMessage, WorkerRuntime,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use url::Url;

use crate::{Result, ShellError};

// ==================== Registration ====================

/// An installed and activated worker controlling this page.
pub struct ServiceWorkerRegistration {
    pub scope: Url,
    pub script_url: Url,
    /// This page's identity on the worker's client channel.
    pub client: ClientId,
    pub install: InstallOutcome,
    handle: WorkerHandle,
}

impl ServiceWorkerRegistration {
    pub fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    pub async fn state(&self) -> Result<ServiceWorkerState> {
        Ok(self.handle.state().await?)
    }
}

// ==================== Container ====================

/// Registers a worker for one page.
pub struct ServiceWorkerContainer {
    page_url: Url,
    clients: Arc<Clients>,
    registration: Option<ServiceWorkerRegistration>,
}

impl ServiceWorkerContainer {
    /// Container for the page at `page_url`; `clients` must be the set the
    /// worker broadcasts to.
    pub fn new(page_url: Url, clients: Arc<Clients>) -> Self {
        Self {
            page_url,
            clients,
            registration: None,
        }
    }

    pub fn registration(&self) -> Option<&ServiceWorkerRegistration> {
        self.registration.as_ref()
    }

    /// Register, install and activate `runtime` as the script at
    /// `script_path`.
    ///
    /// The page is connected before the worker starts so failures raised
    /// during install reach it. Returns the page's message channel; the page
    /// stays connected only while that receiver is alive. Dropping it
    /// detaches the page from the worker's client set.
    pub async fn register(
        &mut self,
        script_path: &str,
        runtime: WorkerRuntime,
    ) -> Result<mpsc::UnboundedReceiver<WorkerMessage>> {
        if let Some(ref existing) = self.registration {
            return Err(ShellError::Registration(format!(
                "already registered for scope {}",
                existing.scope
            )));
        }
        if !Arc::ptr_eq(&runtime.context().clients, &self.clients) {
            return Err(ShellError::Registration(
                "worker does not broadcast to this page's client set".to_string(),
            ));
        }

        let script_url = self
            .page_url
            .join(script_path)
            .map_err(|e| ShellError::Registration(e.to_string()))?;
        let scope = script_url
            .join("./")
            .map_err(|e| ShellError::Registration(e.to_string()))?;

        let connection = self
            .clients
            .connect(self.page_url.clone(), ClientType::Window)
            .await;
        let handle = runtime.spawn();

        let install = match Self::start(&handle).await {
            Ok(install) => install,
            Err(e) => {
                handle.shutdown().await;
                self.clients.disconnect(connection.id).await;
                return Err(e);
            }
        };

        info!(scope = %scope, script = %script_url, "Worker registered");
        self.registration = Some(ServiceWorkerRegistration {
            scope,
            script_url,
            client: connection.id,
            install,
            handle,
        });
        Ok(connection.messages)
    }

    async fn start(handle: &WorkerHandle) -> Result<InstallOutcome> {
        let install = handle.install().await?;
        if install.is_degraded() {
            warn!("Worker installed without a complete static cache");
        }
        handle.activate().await?;
        Ok(install)
    }

    /// Register once the document has loaded.
    ///
    /// Registration failures are logged, never raised to the page; `None`
    /// means the page runs without a worker.
    pub async fn register_on_load(
        &mut self,
        loaded: oneshot::Receiver<()>,
        script_path: &str,
        runtime: WorkerRuntime,
    ) -> Option<mpsc::UnboundedReceiver<WorkerMessage>> {
        if loaded.await.is_err() {
            warn!("Page closed before it finished loading; not registering");
            return None;
        }

        match self.register(script_path, runtime).await {
            Ok(messages) => Some(messages),
            Err(e) => {
                error!(error = %e, script = script_path, "Worker registration failed");
                None
            }
        }
    }

    /// Stop the worker and detach the page. Returns whether a worker was
    /// registered.
    pub async fn unregister(&mut self) -> bool {
        let Some(registration) = self.registration.take() else {
            return false;
        };
        registration.handle.shutdown().await;
        self.clients.disconnect(registration.client).await;
        info!(scope = %registration.scope, "Worker unregistered");
        true
    }
}
