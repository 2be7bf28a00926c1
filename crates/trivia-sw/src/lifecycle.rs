//! Install and activate steps for a cache generation.

use futures::future::try_join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use trivia_core::WorkerConfig;
use url::Url;

use crate::cache::{CacheEntry, CacheStorage};
use crate::fetch::FetchRequest;
use crate::network::Network;
use crate::ServiceWorkerError;

/// The fixed asset list owned by one generation.
#[derive(Debug, Clone)]
pub struct GenerationManifest {
    pub version: String,
    pub origin: Url,
    pub paths: Vec<String>,
}

impl GenerationManifest {
    pub fn new(version: impl Into<String>, origin: Url, paths: Vec<String>) -> Self {
        Self {
            version: version.into(),
            origin,
            paths,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self, ServiceWorkerError> {
        let origin = config
            .origin_url()
            .map_err(|e| ServiceWorkerError::InvalidUrl(e.to_string()))?;
        Ok(Self::new(&config.cache_version, origin, config.manifest.clone()))
    }

    /// Manifest paths resolved against the origin.
    pub fn urls(&self) -> Result<Vec<Url>, ServiceWorkerError> {
        self.paths
            .iter()
            .map(|path| {
                self.origin
                    .join(path)
                    .map_err(|e| ServiceWorkerError::InvalidUrl(format!("{path}: {e}")))
            })
            .collect()
    }
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub generation: String,
    pub cached: usize,
    pub attempts: u32,
}

/// Result of an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub generation: String,
    pub deleted: Vec<String>,
}

/// Fetch the whole manifest, then store it in one write.
///
/// Nothing is written unless every asset fetched with a 2xx status, so a
/// failed attempt leaves storage exactly as it was. Returns the number of
/// entries stored.
pub async fn install_generation(
    manifest: &GenerationManifest,
    caches: &RwLock<CacheStorage>,
    network: &dyn Network,
) -> Result<usize, ServiceWorkerError> {
    let urls = manifest.urls()?;
    debug!(generation = %manifest.version, assets = urls.len(), "Fetching manifest");

    let fetches = urls.iter().map(|url| async move {
        let response = network
            .fetch(&FetchRequest::get(url.clone()))
            .await
            .map_err(|e| ServiceWorkerError::InstallFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.ok() {
            return Err(ServiceWorkerError::InstallFailed {
                url: url.to_string(),
                reason: format!("status {}", response.status),
            });
        }

        Ok::<_, ServiceWorkerError>(CacheEntry::capture(url, &response, now_millis()))
    });

    let entries = match try_join_all(fetches).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(generation = %manifest.version, error = %e, "Install attempt failed");
            return Err(e);
        }
    };

    let stored = entries.len();
    let mut caches = caches.write().await;
    caches.open(&manifest.version).put_all(entries);

    info!(generation = %manifest.version, stored, "Cache generation populated");
    Ok(stored)
}

/// Delete every generation except `current`.
pub async fn activate_generation(current: &str, caches: &RwLock<CacheStorage>) -> ActivationReport {
    let mut caches = caches.write().await;

    let deleted: Vec<String> = caches
        .keys()
        .into_iter()
        .filter(|name| name != current)
        .collect();

    for name in &deleted {
        caches.delete(name);
        info!(generation = %name, "Deleted stale cache generation");
    }

    ActivationReport {
        generation: current.to_string(),
        deleted,
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StaticNetwork;

    fn manifest() -> GenerationManifest {
        GenerationManifest::new(
            "v2",
            Url::parse("https://trivia.example/").unwrap(),
            vec!["/".into(), "/menu.html".into(), "/js/app.js".into()],
        )
    }

    fn serving(manifest: &GenerationManifest) -> StaticNetwork {
        let network = StaticNetwork::new();
        for url in manifest.urls().unwrap() {
            network.add_page(url.clone(), url.path());
        }
        network
    }

    #[tokio::test]
    async fn test_install_populates_full_manifest() {
        let manifest = manifest();
        let network = serving(&manifest);
        let caches = RwLock::new(CacheStorage::new());

        let stored = install_generation(&manifest, &caches, &network).await.unwrap();

        assert_eq!(stored, 3);
        let caches = caches.read().await;
        let entry = caches
            .match_in("v2", "GET", "https://trivia.example/js/app.js")
            .unwrap();
        assert_eq!(entry.body, b"/js/app.js");
    }

    #[tokio::test]
    async fn test_install_failure_writes_nothing() {
        let manifest = manifest();
        let network = serving(&manifest);
        network.fail_url(&Url::parse("https://trivia.example/js/app.js").unwrap());

        let mut storage = CacheStorage::new();
        storage.open("v1");
        let caches = RwLock::new(storage);

        let err = install_generation(&manifest, &caches, &network)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceWorkerError::InstallFailed { .. }));
        let caches = caches.read().await;
        assert!(!caches.has("v2"));
        assert!(caches.has("v1"));
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let manifest = GenerationManifest::new(
            "v2",
            Url::parse("https://trivia.example/").unwrap(),
            vec!["/menu.html".into(), "/missing.css".into()],
        );
        let network = StaticNetwork::new();
        network.add_page(Url::parse("https://trivia.example/menu.html").unwrap(), "menu");
        let caches = RwLock::new(CacheStorage::new());

        let err = install_generation(&manifest, &caches, &network)
            .await
            .unwrap_err();

        match err {
            ServiceWorkerError::InstallFailed { url, reason } => {
                assert_eq!(url, "https://trivia.example/missing.css");
                assert_eq!(reason, "status 404");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!caches.read().await.has("v2"));
    }

    #[tokio::test]
    async fn test_activate_leaves_one_generation() {
        let mut storage = CacheStorage::new();
        storage.open("v0");
        storage.open("v1");
        storage.open("v2");
        let caches = RwLock::new(storage);

        let report = activate_generation("v2", &caches).await;

        assert_eq!(report.deleted, vec!["v0".to_string(), "v1".to_string()]);
        assert_eq!(caches.read().await.keys(), vec!["v2".to_string()]);
    }
}
