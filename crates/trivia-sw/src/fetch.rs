//! Fetch interception.
//!
//! Navigations go network-first and fall back through an ordered chain of
//! cached pages. Everything else is served cache-first with a network
//! fallback. Assets fetched from the network are *not* written back into
//! the cache; a stale asset is only replaced by a new cache generation.

use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{cache_key, Cache, CacheEntry, CacheStorage};
use crate::network::Network;
use crate::ServiceWorkerError;

// ==================== Request / Response ====================

/// Request mode, as the browser reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: String,
    pub mode: RequestMode,
    pub headers: HashMap<String, String>,
}

impl FetchRequest {
    /// A top-level page navigation.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// A plain sub-resource GET.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            mode: RequestMode::default(),
            headers: HashMap::new(),
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// Where a response came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    /// Cache hit, with the step that matched.
    Cache(FallbackStep),
}

/// Response handed back to the page.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Final URL after redirects.
    pub url: Url,
    pub source: ResponseSource,
}

impl FetchResponse {
    /// A network response.
    pub fn network(url: Url, status: u16, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            url,
            source: ResponseSource::Network,
        }
    }

    /// Rebuild a response from a cache entry.
    pub fn from_cache(entry: &CacheEntry, step: FallbackStep) -> Result<Self, ServiceWorkerError> {
        Ok(Self {
            status: entry.status,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            url: Url::parse(&entry.url).map_err(|e| ServiceWorkerError::InvalidUrl(e.to_string()))?,
            source: ResponseSource::Cache(step),
        })
    }

    /// 2xx status.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn from_cache_hit(&self) -> bool {
        matches!(self.source, ResponseSource::Cache(_))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ==================== Fallback Chain ====================

/// One candidate in the navigation fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackStep {
    /// The request URL itself.
    Exact,
    /// The menu page.
    Menu(String),
    /// The primary game page.
    Primary(String),
    /// The origin root.
    Root,
}

impl FallbackStep {
    /// Cache key this step looks up for `request_url`.
    pub fn key(&self, request_url: &Url, origin: &Url) -> Option<String> {
        match self {
            FallbackStep::Exact => Some(cache_key(request_url)),
            FallbackStep::Menu(path) | FallbackStep::Primary(path) => {
                origin.join(path).ok().map(|u| cache_key(&u))
            }
            FallbackStep::Root => origin.join("/").ok().map(|u| cache_key(&u)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FallbackStep::Exact => "exact",
            FallbackStep::Menu(_) => "menu",
            FallbackStep::Primary(_) => "primary",
            FallbackStep::Root => "root",
        }
    }
}

/// Ordered cache lookups tried when a navigation can't reach the network.
#[derive(Debug, Clone)]
pub struct FallbackChain {
    steps: Vec<FallbackStep>,
}

impl FallbackChain {
    pub fn new(steps: Vec<FallbackStep>) -> Self {
        Self { steps }
    }

    /// exact → menu → primary → root.
    pub fn standard(menu: &str, primary: &str) -> Self {
        Self::new(vec![
            FallbackStep::Exact,
            FallbackStep::Menu(menu.to_string()),
            FallbackStep::Primary(primary.to_string()),
            FallbackStep::Root,
        ])
    }

    pub fn steps(&self) -> &[FallbackStep] {
        &self.steps
    }

    /// First step with a cached entry, in chain order.
    ///
    /// Only the exact step matches on the request's own method; the shell
    /// pages behind it are stored as GET.
    pub fn lookup<'c>(
        &self,
        cache: &'c Cache,
        request: &FetchRequest,
        origin: &Url,
    ) -> Option<(&FallbackStep, &'c CacheEntry)> {
        for step in &self.steps {
            let Some(key) = step.key(&request.url, origin) else {
                continue;
            };
            let method = match step {
                FallbackStep::Exact => request.method.as_str(),
                _ => "GET",
            };
            if let Some(entry) = cache.match_request(method, &key) {
                return Some((step, entry));
            }
            debug!(step = step.name(), key = %key, "Fallback miss");
        }
        None
    }
}

// ==================== Interceptor ====================

/// Per-request routing between network and the current cache generation.
///
/// Holds no per-request state; every call is decided independently.
#[derive(Debug, Clone)]
pub struct FetchInterceptor {
    origin: Url,
    generation: String,
    chain: FallbackChain,
}

impl FetchInterceptor {
    pub fn new(origin: Url, generation: impl Into<String>, chain: FallbackChain) -> Self {
        Self {
            origin,
            generation: generation.into(),
            chain,
        }
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    pub async fn handle(
        &self,
        request: &FetchRequest,
        caches: &RwLock<CacheStorage>,
        network: &dyn Network,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        if request.is_navigation() {
            self.handle_navigation(request, caches, network).await
        } else {
            self.handle_asset(request, caches, network).await
        }
    }

    async fn handle_navigation(
        &self,
        request: &FetchRequest,
        caches: &RwLock<CacheStorage>,
        network: &dyn Network,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        // Any response counts, so server-side routing always runs when online.
        let network_error = match network.fetch(request).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        debug!(url = %request.url, error = %network_error, "Navigation offline, trying cache");

        let caches = caches.read().await;
        let hit = caches
            .get(&self.generation)
            .and_then(|cache| self.chain.lookup(cache, request, &self.origin));

        match hit {
            Some((step, entry)) => {
                debug!(url = %request.url, step = step.name(), "Navigation served from cache");
                FetchResponse::from_cache(entry, step.clone())
            }
            None => {
                warn!(url = %request.url, generation = %self.generation, "No cached page for offline navigation");
                Err(ServiceWorkerError::NavigationFailed(request.url.to_string()))
            }
        }
    }

    async fn handle_asset(
        &self,
        request: &FetchRequest,
        caches: &RwLock<CacheStorage>,
        network: &dyn Network,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        let cached = {
            let caches = caches.read().await;
            caches
                .match_in(&self.generation, &request.method, &cache_key(&request.url))
                .map(|entry| FetchResponse::from_cache(entry, FallbackStep::Exact))
        };

        if let Some(response) = cached {
            return response;
        }

        debug!(url = %request.url, "Asset cache miss");
        Ok(network.fetch(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StaticNetwork;

    const ORIGIN: &str = "https://trivia.example/";

    fn url(path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    fn page(path: &str, body: &str) -> CacheEntry {
        CacheEntry {
            url: cache_key(&url(path)),
            method: "GET".to_string(),
            status: 200,
            headers: HashMap::new(),
            body: body.as_bytes().to_vec(),
            cached_at: 0,
        }
    }

    fn interceptor() -> FetchInterceptor {
        FetchInterceptor::new(
            Url::parse(ORIGIN).unwrap(),
            "v1",
            FallbackChain::standard("/menu.html", "/index.html"),
        )
    }

    fn storage(pages: &[(&str, &str)]) -> RwLock<CacheStorage> {
        let mut storage = CacheStorage::new();
        let cache = storage.open("v1");
        for (path, body) in pages {
            cache.put(page(path, body));
        }
        RwLock::new(storage)
    }

    #[test]
    fn test_standard_chain_order() {
        let chain = FallbackChain::standard("/menu.html", "/index.html");
        let names: Vec<_> = chain.steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["exact", "menu", "primary", "root"]);
    }

    #[test]
    fn test_step_keys() {
        let origin = Url::parse(ORIGIN).unwrap();
        let request = url("/quiz/42#q3");

        assert_eq!(
            FallbackStep::Exact.key(&request, &origin).unwrap(),
            "https://trivia.example/quiz/42"
        );
        assert_eq!(
            FallbackStep::Menu("/menu.html".into()).key(&request, &origin).unwrap(),
            "https://trivia.example/menu.html"
        );
        assert_eq!(
            FallbackStep::Root.key(&request, &origin).unwrap(),
            "https://trivia.example/"
        );
    }

    #[tokio::test]
    async fn test_navigation_prefers_network() {
        let network = StaticNetwork::new();
        network.add_page(url("/menu.html"), "live menu");
        let caches = storage(&[("/menu.html", "cached menu")]);

        let response = interceptor()
            .handle(&FetchRequest::navigate(url("/menu.html")), &caches, &network)
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.text(), "live menu");
    }

    #[tokio::test]
    async fn test_navigation_network_error_status_is_still_returned() {
        // 404 is a response, not a thrown error
        let network = StaticNetwork::new();
        let caches = storage(&[("/menu.html", "cached menu")]);

        let response = interceptor()
            .handle(&FetchRequest::navigate(url("/missing")), &caches, &network)
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_offline_exact_match_wins() {
        let network = StaticNetwork::offline();
        let caches = storage(&[("/leaderboard.html", "board"), ("/menu.html", "menu")]);

        let response = interceptor()
            .handle(&FetchRequest::navigate(url("/leaderboard.html")), &caches, &network)
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Cache(FallbackStep::Exact));
        assert_eq!(response.text(), "board");
    }

    #[tokio::test]
    async fn test_offline_deep_link_falls_back_to_menu() {
        let network = StaticNetwork::offline();
        let caches = storage(&[("/menu.html", "menu"), ("/index.html", "game"), ("/", "root")]);

        let response = interceptor()
            .handle(&FetchRequest::navigate(url("/quiz/uncached")), &caches, &network)
            .await
            .unwrap();

        assert_eq!(response.text(), "menu");
        assert!(matches!(response.source, ResponseSource::Cache(FallbackStep::Menu(_))));
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_primary_then_root() {
        let network = StaticNetwork::offline();

        let caches = storage(&[("/index.html", "game"), ("/", "root")]);
        let response = interceptor()
            .handle(&FetchRequest::navigate(url("/nowhere")), &caches, &network)
            .await
            .unwrap();
        assert_eq!(response.text(), "game");

        let caches = storage(&[("/", "root")]);
        let response = interceptor()
            .handle(&FetchRequest::navigate(url("/nowhere")), &caches, &network)
            .await
            .unwrap();
        assert_eq!(response.text(), "root");
        assert_eq!(response.source, ResponseSource::Cache(FallbackStep::Root));
    }

    #[tokio::test]
    async fn test_offline_chain_exhausted() {
        let network = StaticNetwork::offline();
        let caches = storage(&[("/css/styles.css", "body{}")]);

        let err = interceptor()
            .handle(&FetchRequest::navigate(url("/nowhere")), &caches, &network)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceWorkerError::NavigationFailed(_)));
    }

    #[tokio::test]
    async fn test_offline_ignores_other_generations() {
        let network = StaticNetwork::offline();
        let mut storage = CacheStorage::new();
        storage.open("v0").put(page("/menu.html", "old menu"));
        let caches = RwLock::new(storage);

        let err = interceptor()
            .handle(&FetchRequest::navigate(url("/menu.html")), &caches, &network)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceWorkerError::NavigationFailed(_)));
    }

    #[tokio::test]
    async fn test_cached_asset_skips_network() {
        let network = StaticNetwork::offline();
        let caches = storage(&[("/js/app.js", "console.log(1)")]);

        let response = interceptor()
            .handle(&FetchRequest::get(url("/js/app.js")), &caches, &network)
            .await
            .unwrap();

        assert!(response.from_cache_hit());
        assert_eq!(response.text(), "console.log(1)");
        assert_eq!(network.request_count(), 0);
    }

    #[tokio::test]
    async fn test_asset_miss_uses_network_without_caching() {
        let network = StaticNetwork::new();
        network.add_page(url("/images/new.png"), "png");
        let caches = storage(&[]);
        let interceptor = interceptor();

        let response = interceptor
            .handle(&FetchRequest::get(url("/images/new.png")), &caches, &network)
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert!(caches
            .read()
            .await
            .match_in("v1", "GET", "https://trivia.example/images/new.png")
            .is_none());
    }

    #[tokio::test]
    async fn test_asset_miss_offline_is_network_error() {
        let network = StaticNetwork::offline();
        let caches = storage(&[]);

        let err = interceptor()
            .handle(&FetchRequest::get(url("/images/new.png")), &caches, &network)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceWorkerError::Network(_)));
    }

    #[tokio::test]
    async fn test_non_get_asset_bypasses_cache() {
        let network = StaticNetwork::new();
        network.add_page(url("/index.html"), "server page");
        let caches = storage(&[("/index.html", "cached GET page")]);

        let request = FetchRequest {
            method: "POST".to_string(),
            ..FetchRequest::get(url("/index.html"))
        };
        let response = interceptor().handle(&request, &caches, &network).await.unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.text(), "server page");
        assert_eq!(network.request_count(), 1);
    }

    #[tokio::test]
    async fn test_offline_post_navigation_skips_exact_step() {
        let network = StaticNetwork::offline();
        let caches = storage(&[("/results.html", "results"), ("/menu.html", "menu")]);

        let request = FetchRequest {
            method: "POST".to_string(),
            ..FetchRequest::navigate(url("/results.html"))
        };
        let response = interceptor().handle(&request, &caches, &network).await.unwrap();

        assert_eq!(response.text(), "menu");
        assert!(matches!(response.source, ResponseSource::Cache(FallbackStep::Menu(_))));
    }
}
