//! Shared fixtures for worker integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use http::Method;
use pwakit_common::{init_logging, LogConfig};
use pwakit_sw::{
    CacheStorage, Clients, MemoryNotificationCenter, Network, Request, Response, ResponseType,
    ServiceWorkerState, WindowRequest, WorkerConfig, WorkerContext, WorkerError, WorkerHandle,
    WorkerRuntime,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use url::Url;

pub const ORIGIN: &str = "https://tasks.test/";

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn url(path: &str) -> Url {
    origin().join(path).unwrap()
}

pub fn config() -> WorkerConfig {
    WorkerConfig::for_origin(origin())
}

#[derive(Clone)]
enum Route {
    Respond {
        status: u16,
        body: String,
        response_type: ResponseType,
    },
    Fail(String),
    Hang,
}

/// Network answering from a fixed route table; unknown URLs fail like an
/// unreachable host.
#[derive(Default)]
pub struct MockNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<(Method, Url)>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Network serving every precache entry of `config`.
    pub fn seeded(config: &WorkerConfig) -> Arc<Self> {
        let network = Self::new();
        for path in &config.precache {
            network.respond(path, 200, &format!("asset {}", path));
        }
        network
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.route(
            url(path),
            Route::Respond {
                status,
                body: body.to_string(),
                response_type: ResponseType::Basic,
            },
        );
    }

    pub fn respond_foreign(&self, target: Url, body: &str) {
        self.route(
            target,
            Route::Respond {
                status: 200,
                body: body.to_string(),
                response_type: ResponseType::Cors,
            },
        );
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.route(url(path), Route::Fail(message.to_string()));
    }

    /// Requests to `path` never complete.
    pub fn hang(&self, path: &str) {
        self.route(url(path), Route::Hang);
    }

    /// Take a route offline.
    pub fn forget(&self, path: &str) {
        self.routes.lock().unwrap().remove(url(path).as_str());
    }

    fn route(&self, target: Url, route: Route) {
        self.routes
            .lock()
            .unwrap()
            .insert(target.to_string(), route);
    }

    pub fn calls(&self) -> Vec<(Method, Url)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        let target = url(path);
        self.calls().iter().filter(|(_, u)| *u == target).count()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: Request) -> Result<Response, WorkerError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.method.clone(), request.url.clone()));
        let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        match route {
            Some(Route::Respond {
                status,
                body,
                response_type,
            }) => Ok(Response::new(request.url, status, body, response_type)),
            Some(Route::Fail(message)) => Err(WorkerError::Network(message)),
            Some(Route::Hang) => futures::future::pending().await,
            None => Err(WorkerError::Network(format!(
                "{}: connection refused",
                request.url
            ))),
        }
    }
}

/// A running worker plus the host-side pieces tests inspect.
pub struct Harness {
    pub handle: WorkerHandle,
    pub caches: Arc<CacheStorage>,
    pub clients: Arc<Clients>,
    pub notifications: Arc<MemoryNotificationCenter>,
    pub windows: mpsc::UnboundedReceiver<WindowRequest>,
}

impl Harness {
    pub fn start(config: WorkerConfig, network: Arc<MockNetwork>) -> Self {
        Self::start_with_caches(config, network, Arc::new(CacheStorage::new()))
    }

    pub fn start_with_caches(
        config: WorkerConfig,
        network: Arc<MockNetwork>,
        caches: Arc<CacheStorage>,
    ) -> Self {
        init_logging(&LogConfig::default().with_filter("pwakit_sw=warn"));
        let (clients, windows) = Clients::with_window_host();
        let clients = Arc::new(clients);
        let notifications = Arc::new(MemoryNotificationCenter::new());
        let ctx = WorkerContext::new(
            config,
            Arc::clone(&caches),
            network,
            Arc::clone(&clients),
            notifications.clone(),
        );
        let handle = WorkerRuntime::new(ctx).spawn();
        Self {
            handle,
            caches,
            clients,
            notifications,
            windows,
        }
    }

    /// Poll until the worker reports `state`.
    pub async fn wait_for(&self, state: ServiceWorkerState) {
        while self.handle.state().await.unwrap() != state {
            tokio::task::yield_now().await;
        }
    }

    /// Start, install and activate.
    pub async fn activated(config: WorkerConfig, network: Arc<MockNetwork>) -> Self {
        let harness = Self::start(config, network);
        harness.handle.install().await.unwrap();
        harness.handle.activate().await.unwrap();
        harness
    }
}
