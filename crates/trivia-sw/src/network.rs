//! Network access for the worker.
//!
//! The worker never talks to the network directly; it goes through a
//! [`Network`] so tests and offline runs can swap in [`StaticNetwork`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use crate::cache::cache_key;
use crate::fetch::{FetchRequest, FetchResponse};

/// A fetch that threw rather than returning a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Network unavailable")]
    Offline,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Source of live responses.
///
/// Any HTTP status is a successful fetch; only transport failures are errors.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError>;
}

// ==================== Reqwest ====================

/// Live network backed by reqwest.
pub struct ReqwestNetwork {
    client: Client,
}

impl ReqwestNetwork {
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .user_agent(concat!("sda-trivia-sw/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Network for ReqwestNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

        debug!(method = %method, url = %request.url, "Network fetch");

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NetworkError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::RequestFailed(e.to_string()))?;

        trace!(status, body_len = body.len(), "Network response");
        Ok(FetchResponse::network(url, status, headers, body.to_vec()))
    }
}

// ==================== Static ====================

/// In-memory network: fixed responses, switchable offline.
///
/// Unknown URLs answer 404. Every call is counted, including ones that fail.
#[derive(Default)]
pub struct StaticNetwork {
    pages: Mutex<HashMap<String, (u16, String, Vec<u8>)>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    requests: AtomicUsize,
}

impl StaticNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network where every fetch throws.
    pub fn offline() -> Self {
        let network = Self::default();
        network.set_online(false);
        network
    }

    /// Serve `body` as text/html with status 200.
    pub fn add_page(&self, url: Url, body: &str) {
        self.add_response(url, 200, "text/html", body.as_bytes().to_vec());
    }

    pub fn add_response(&self, url: Url, status: u16, content_type: &str, body: Vec<u8>) {
        if let Ok(mut pages) = self.pages.lock() {
            pages.insert(cache_key(&url), (status, content_type.to_string(), body));
        }
    }

    /// Make fetches of `url` throw while the rest stays reachable.
    pub fn fail_url(&self, url: &Url) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(cache_key(url));
        }
    }

    pub fn restore_url(&self, url: &Url) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&cache_key(url));
        }
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for StaticNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline);
        }

        let key = cache_key(&request.url);
        let failing = self
            .failing
            .lock()
            .map(|failing| failing.contains(&key))
            .unwrap_or(false);
        if failing {
            return Err(NetworkError::RequestFailed(format!("connection reset: {key}")));
        }

        let page = self
            .pages
            .lock()
            .map_err(|e| NetworkError::RequestFailed(e.to_string()))?
            .get(&key)
            .cloned();

        let response = match page {
            Some((status, content_type, body)) => {
                let mut headers = HashMap::new();
                headers.insert("content-type".to_string(), content_type);
                FetchResponse::network(request.url.clone(), status, headers, body)
            }
            None => FetchResponse::network(request.url.clone(), 404, HashMap::new(), Vec::new()),
        };

        Ok(response)
    }
}
