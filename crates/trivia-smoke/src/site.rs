//! Network backends for a smoke run.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};
use trivia_sw::{FetchRequest, FetchResponse, Network, NetworkError, StaticNetwork};
use url::Url;

/// Wraps a network so the run can cut it off mid-way.
pub struct SwitchableNetwork {
    inner: Arc<dyn Network>,
    offline: AtomicBool,
}

impl SwitchableNetwork {
    pub fn new(inner: Arc<dyn Network>) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Network for SwitchableNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline);
        }
        self.inner.fetch(request).await
    }
}

fn content_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Serve every manifest path from `site_dir`, or placeholder bodies when no
/// directory is given. `/` maps to `index.html`.
pub fn static_site(origin: &Url, manifest: &[String], site_dir: Option<&Path>) -> Result<StaticNetwork> {
    let network = StaticNetwork::new();

    for path in manifest {
        let url = origin
            .join(path)
            .with_context(|| format!("bad manifest path {path}"))?;
        let file = match path.trim_start_matches('/') {
            "" => "index.html",
            rest => rest,
        };

        let body = match site_dir {
            Some(dir) => match std::fs::read(dir.join(file)) {
                Ok(body) => body,
                Err(e) => {
                    // left unserved, so install reports it
                    warn!(path = %path, error = %e, "Manifest file missing from site dir");
                    continue;
                }
            },
            None => format!("<!-- placeholder for {path} -->").into_bytes(),
        };

        debug!(url = %url, bytes = body.len(), "Serving");
        network.add_response(url, 200, &content_type(file), body);
    }

    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://trivia.example").unwrap()
    }

    #[tokio::test]
    async fn test_placeholder_site() {
        let manifest = vec!["/".to_string(), "/css/styles.css".to_string()];
        let network = static_site(&origin(), &manifest, None).unwrap();

        let response = network
            .fetch(&FetchRequest::get(origin().join("/css/styles.css").unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.text().contains("/css/styles.css"));
    }

    #[tokio::test]
    async fn test_site_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Trivia</h1>").unwrap();

        let manifest = vec!["/".to_string(), "/menu.html".to_string()];
        let network = static_site(&origin(), &manifest, Some(dir.path())).unwrap();

        let root = network
            .fetch(&FetchRequest::navigate(origin()))
            .await
            .unwrap();
        assert_eq!(root.text(), "<h1>Trivia</h1>");

        let menu = network
            .fetch(&FetchRequest::navigate(origin().join("/menu.html").unwrap()))
            .await
            .unwrap();
        assert_eq!(menu.status, 404);
    }

    #[tokio::test]
    async fn test_switch_offline() {
        let inner = Arc::new(static_site(&origin(), &["/".to_string()], None).unwrap());
        let network = SwitchableNetwork::new(inner);
        assert!(network.fetch(&FetchRequest::navigate(origin())).await.is_ok());

        network.set_offline(true);
        assert!(matches!(
            network.fetch(&FetchRequest::navigate(origin())).await,
            Err(NetworkError::Offline)
        ));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type("index.html"), "text/html");
        assert_eq!(content_type("css/styles.css"), "text/css");
        assert_eq!(content_type("audio/correct.mp3"), "audio/mpeg");
        assert_eq!(content_type("data/blob"), "application/octet-stream");
    }
}
