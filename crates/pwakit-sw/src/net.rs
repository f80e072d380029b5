//! Requests, responses, and the network the worker falls back to.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tracing::{debug, trace};
use url::Url;

use crate::{Result, WorkerError};

/// Request mode, as seen by the fetch handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    SameOrigin,
    #[default]
    Cors,
    /// Cross-origin responses come back opaque.
    NoCors,
}

/// An intercepted HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            mode: RequestMode::default(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::new(Method::POST, url)
        }
    }

    /// A navigation request for a document.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Normalized cache key: method plus URL without fragment.
    pub fn cache_key(&self) -> String {
        cache_key(&self.method, &self.url)
    }
}

pub(crate) fn cache_key(method: &Method, url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    format!("{} {}", method, url)
}

/// Response tainting, mirroring the platform's response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Same-origin.
    Basic,
    /// Cross-origin, readable.
    Cors,
    /// Cross-origin no-cors; status and body are hidden.
    Opaque,
    Error,
}

/// A captured or live HTTP response.
///
/// Cloning is cheap; the body is reference counted.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
    pub from_cache: bool,
}

impl Response {
    pub fn new(url: Url, status: u16, body: impl Into<Bytes>, response_type: ResponseType) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            response_type,
            from_cache: false,
        }
    }

    /// An opaque response: status 0, no headers, no body.
    pub fn opaque(url: Url) -> Self {
        Self::new(url, 0, Bytes::new(), ResponseType::Opaque)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Check if the status is 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only same-origin 200 responses are captured.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK.as_u16() && self.response_type == ResponseType::Basic
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| WorkerError::Payload(e.to_string()))
    }
}

/// The network stack the worker falls back to on a cache miss.
///
/// Timeouts belong to the implementation; the worker adds none of its own.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response>;
}

/// `reqwest`-backed network.
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: Url,
}

impl HttpNetwork {
    /// Network for a worker registered on `origin`.
    pub fn new(origin: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pwakit-sw/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WorkerError::Network(e.to_string()))?;
        Ok(Self { client, origin })
    }

    fn classify(&self, request: &Request, final_url: &Url) -> ResponseType {
        if final_url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseType::Opaque
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: Request) -> Result<Response> {
        debug!(url = %request.url, method = %request.method, "Fetching from network");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| WorkerError::Network(format!("{}: {}", request.url, e)))?;

        let url = response.url().clone();
        let response_type = self.classify(&request, &url);
        if response_type == ResponseType::Opaque {
            return Ok(Response::opaque(url));
        }

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| WorkerError::Network(format!("{}: {}", url, e)))?;

        trace!(url = %url, status, body_len = body.len(), ?response_type, "Response received");

        Ok(Response {
            url,
            status,
            headers,
            body,
            response_type,
            from_cache: false,
        })
    }
}
