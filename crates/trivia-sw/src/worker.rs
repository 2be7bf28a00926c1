//! The worker object and its event dispatcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, instrument, warn};
use trivia_common::{retry_with_backoff, RetryConfig};
use trivia_core::WorkerConfig;

use crate::cache::CacheStorage;
use crate::clients::Clients;
use crate::fetch::{FallbackChain, FetchInterceptor, FetchRequest, FetchResponse};
use crate::lifecycle::{
    activate_generation, install_generation, ActivationReport, GenerationManifest, InstallReport,
};
use crate::messenger::{ClickOutcome, MessageEvent, MessageOutcome, Messenger, NotificationClickEvent};
use crate::network::Network;
use crate::ServiceWorkerError;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Script evaluated, nothing installed yet.
    #[default]
    Parsed,
    Installing,
    /// Installed, waiting to activate.
    Installed,
    Activating,
    /// Controls pages and intercepts fetches.
    Activated,
    /// Install failed; the previous generation stays in charge.
    Redundant,
}

/// Events the platform delivers to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
    Message(MessageEvent),
    NotificationClick(NotificationClickEvent),
}

/// Result of one dispatched event.
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Response(FetchResponse),
    Message(MessageOutcome),
    NotificationClick(ClickOutcome),
}

/// Emitted on every lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub worker_id: ServiceWorkerId,
    pub generation: String,
    pub state: ServiceWorkerState,
}

/// One version of the offline worker.
///
/// Cache storage and clients are shared handles, so a newer worker built
/// with [`ServiceWorker::with_caches`] sees the generations an older one
/// left behind.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    manifest: GenerationManifest,
    interceptor: FetchInterceptor,
    messenger: Messenger,
    install_retry: RetryConfig,
    state: RwLock<ServiceWorkerState>,
    caches: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<Clients>>,
    network: Arc<dyn Network>,
    event_tx: mpsc::UnboundedSender<StateChange>,
}

impl ServiceWorker {
    /// Build a worker for `config`'s generation.
    pub fn new(
        config: &WorkerConfig,
        network: Arc<dyn Network>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<StateChange>), ServiceWorkerError> {
        let manifest = GenerationManifest::from_config(config)?;
        let chain = FallbackChain::standard(&config.menu_fallback, &config.primary_fallback);
        let interceptor =
            FetchInterceptor::new(manifest.origin.clone(), &manifest.version, chain);
        let messenger = Messenger::new(manifest.origin.clone());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                id: ServiceWorkerId::new(),
                manifest,
                interceptor,
                messenger,
                install_retry: config.install_retry.to_retry_config(),
                state: RwLock::new(ServiceWorkerState::Parsed),
                caches: Arc::new(RwLock::new(CacheStorage::new())),
                clients: Arc::new(RwLock::new(Clients::new())),
                network,
                event_tx,
            },
            event_rx,
        ))
    }

    /// Share cache storage with other workers on the origin.
    pub fn with_caches(mut self, caches: Arc<RwLock<CacheStorage>>) -> Self {
        self.caches = caches;
        self
    }

    /// Share the client registry with other workers on the origin.
    pub fn with_clients(mut self, clients: Arc<RwLock<Clients>>) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_install_retry(mut self, retry: RetryConfig) -> Self {
        self.install_retry = retry;
        self
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn generation(&self) -> &str {
        &self.manifest.version
    }

    pub fn caches(&self) -> Arc<RwLock<CacheStorage>> {
        Arc::clone(&self.caches)
    }

    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        Arc::clone(&self.clients)
    }

    pub async fn state(&self) -> ServiceWorkerState {
        *self.state.read().await
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, ServiceWorkerError> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.fetch(&request).await.map(EventOutcome::Response),
            WorkerEvent::Message(message) => {
                let clients = self.clients.read().await;
                Ok(EventOutcome::Message(
                    self.messenger.handle_message(message, &clients),
                ))
            }
            WorkerEvent::NotificationClick(click) => {
                let mut clients = self.clients.write().await;
                self.messenger
                    .handle_notification_click(click, &mut clients)
                    .map(EventOutcome::NotificationClick)
            }
        }
    }

    /// Populate this worker's generation, retrying the whole manifest on failure.
    #[instrument(skip(self), fields(generation = %self.manifest.version))]
    pub async fn install(&self) -> Result<InstallReport, ServiceWorkerError> {
        self.transition(
            |current| matches!(current, ServiceWorkerState::Parsed | ServiceWorkerState::Redundant),
            ServiceWorkerState::Installing,
            "install",
        )
        .await?;

        let mut attempts = 0u32;
        let result = retry_with_backoff(&self.install_retry, || {
            attempts += 1;
            install_generation(&self.manifest, &self.caches, self.network.as_ref())
        })
        .await;

        match result {
            Ok(cached) => {
                self.set_state(ServiceWorkerState::Installed).await;
                Ok(InstallReport {
                    generation: self.manifest.version.clone(),
                    cached,
                    attempts,
                })
            }
            Err(e) => {
                warn!(attempts, error = %e, "Install gave up");
                self.set_state(ServiceWorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Take over: purge every other generation.
    #[instrument(skip(self), fields(generation = %self.manifest.version))]
    pub async fn activate(&self) -> Result<ActivationReport, ServiceWorkerError> {
        self.transition(
            |current| current == ServiceWorkerState::Installed,
            ServiceWorkerState::Activating,
            "activate",
        )
        .await?;
        let report = activate_generation(&self.manifest.version, &self.caches).await;
        self.set_state(ServiceWorkerState::Activated).await;

        Ok(report)
    }

    /// Answer a request. Until activation the page is uncontrolled and the
    /// request goes straight to the network.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, ServiceWorkerError> {
        if self.state().await != ServiceWorkerState::Activated {
            debug!(url = %request.url, "Worker not active, passing through");
            return Ok(self.network.fetch(request).await?);
        }

        self.interceptor
            .handle(request, &self.caches, self.network.as_ref())
            .await
    }

    /// Check and move under one write guard, so concurrent events can't
    /// both leave the same state.
    async fn transition(
        &self,
        allowed: impl FnOnce(ServiceWorkerState) -> bool,
        next: ServiceWorkerState,
        step: &str,
    ) -> Result<(), ServiceWorkerError> {
        let mut state = self.state.write().await;
        let current = *state;
        if !allowed(current) {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot {step} from {current:?}"
            )));
        }
        *state = next;
        drop(state);

        self.announce(next);
        Ok(())
    }

    async fn set_state(&self, state: ServiceWorkerState) {
        *self.state.write().await = state;
        self.announce(state);
    }

    fn announce(&self, state: ServiceWorkerState) {
        info!(worker = ?self.id, generation = %self.manifest.version, ?state, "Worker state changed");

        let _ = self.event_tx.send(StateChange {
            worker_id: self.id,
            generation: self.manifest.version.clone(),
            state,
        });
    }
}
