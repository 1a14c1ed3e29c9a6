//! The offline worker: install, fetch, activate and message handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use folio_core::WorkerSettings;
use folio_net::{Fetcher, InterceptAction, Request, RequestInterceptor, Response};
use http::StatusCode;
use serde_json::json;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheBackend, CacheEntry, RequestKey};
use crate::message::{MessageReport, WorkerMessage};
use crate::{now_millis, WorkerError, WorkerState};

// ==================== Results ====================

/// Where a response handed back to the page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Current cache generation.
    Cache,
    /// Live network.
    Network,
    /// Cached root page served for a failed navigation.
    Fallback,
    /// Built by the worker (404 or 503).
    Synthetic,
}

/// Response produced by the worker for an intercepted request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub response: Response,
    pub source: ResponseSource,
}

impl FetchResponse {
    fn not_found(url: Url) -> Self {
        Self {
            response: Response::synthetic(url, StatusCode::NOT_FOUND, "Resource not available"),
            source: ResponseSource::Synthetic,
        }
    }

    fn service_unavailable(url: Url) -> Self {
        Self {
            response: Response::synthetic(
                url,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable",
            ),
            source: ResponseSource::Synthetic,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.response.status
    }
}

/// Outcome of the fetch handler.
#[derive(Debug, Clone)]
pub enum FetchDecision {
    /// Not intercepted; the request goes to the network untouched.
    Passthrough,
    /// The worker answers with this response.
    Respond(FetchResponse),
}

impl FetchDecision {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchDecision::Passthrough)
    }

    /// The response, if the request was intercepted.
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            FetchDecision::Passthrough => None,
            FetchDecision::Respond(response) => Some(response),
        }
    }
}

/// Result of a background cache write. Logged and discarded.
#[derive(Debug, Clone)]
pub struct CacheWriteOutcome {
    pub key: RequestKey,
    pub result: Result<(), WorkerError>,
}

impl CacheWriteOutcome {
    fn log(&self) {
        match &self.result {
            Ok(()) => debug!(key = %self.key, "Cached response"),
            Err(e) => warn!(key = %self.key, error = %e, "Cache write dropped"),
        }
    }

    pub fn is_stored(&self) -> bool {
        self.result.is_ok()
    }
}

/// A manifest entry install could not cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallFailure {
    pub entry: String,
    pub reason: String,
}

/// What install managed to cache.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub version: String,
    pub cached: Vec<String>,
    pub failed: Vec<InstallFailure>,
    /// The worker is active once install returns, either because it already
    /// was or because a pending skip-waiting request activated it.
    pub activated: bool,
}

impl InstallReport {
    /// Every manifest entry was cached.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What activate removed.
#[derive(Debug, Clone, Default)]
pub struct ActivateReport {
    pub activated: bool,
    pub kept: String,
    pub deleted: Vec<String>,
}

/// Worker events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Lifecycle state changed.
    StateChange { state: WorkerState },
    /// A stale generation was deleted during activation.
    GenerationDeleted { name: String },
}

// ==================== Worker ====================

/// Offline cache worker for one origin.
pub struct OfflineWorker {
    settings: WorkerSettings,
    interceptor: RequestInterceptor,
    backend: Arc<dyn CacheBackend>,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    pending_writes: Mutex<JoinSet<CacheWriteOutcome>>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl OfflineWorker {
    /// Create a worker over the given storage and network.
    pub fn new(
        settings: WorkerSettings,
        backend: Arc<dyn CacheBackend>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let interceptor =
            RequestInterceptor::with_denylist(&settings.bypass_prefixes, &settings.bypass_contains);

        (
            Self {
                settings,
                interceptor,
                backend,
                fetcher,
                state: RwLock::new(WorkerState::Parsed),
                skip_waiting: AtomicBool::new(false),
                pending_writes: Mutex::new(JoinSet::new()),
                event_tx,
            },
            event_rx,
        )
    }

    /// Name of the current cache generation.
    pub fn version(&self) -> &str {
        &self.settings.cache_version
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
        debug!(?state, version = %self.settings.cache_version, "Worker state changed");
        let _ = self.event_tx.send(WorkerEvent::StateChange { state });
    }

    /// Resolve a manifest entry or path against the origin.
    pub fn resolve(&self, entry: &str) -> Result<Url, WorkerError> {
        match Url::parse(entry) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .settings
                .origin
                .join(entry)
                .map_err(|e| WorkerError::InvalidUrl(format!("{entry}: {e}"))),
            Err(e) => Err(WorkerError::InvalidUrl(format!("{entry}: {e}"))),
        }
    }

    // ==================== Install ====================

    /// Open the current generation and cache the manifest, best effort.
    ///
    /// Re-installing an active worker refreshes the entries without moving
    /// the lifecycle backwards.
    pub async fn install(&self) -> InstallReport {
        let already_active = self.state().await == WorkerState::Activated;
        if !already_active {
            self.set_state(WorkerState::Installing).await;
        }

        let version = self.settings.cache_version.clone();
        let mut report = InstallReport {
            version: version.clone(),
            ..Default::default()
        };

        match self.backend.open(&version).await {
            Ok(()) => info!(version = %version, "Opened cache"),
            Err(e) => self.report_error(&e),
        }

        for entry in &self.settings.manifest {
            match self.precache(&version, entry).await {
                Ok(()) => report.cached.push(entry.clone()),
                Err(e) => {
                    warn!(entry = %entry, error = %e, "Manifest entry not cached");
                    report.failed.push(InstallFailure {
                        entry: entry.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            version = %version,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Install finished"
        );
        if already_active {
            self.skip_waiting.store(false, Ordering::SeqCst);
            report.activated = true;
            return report;
        }
        self.set_state(WorkerState::Installed).await;

        if self.skip_waiting.load(Ordering::SeqCst) {
            debug!("Skip-waiting pending, activating after install");
            report.activated = self.activate().await.activated;
        }

        report
    }

    async fn precache(&self, version: &str, entry: &str) -> Result<(), WorkerError> {
        let url = self.resolve(entry)?;
        let request = Request::get(url);
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| WorkerError::NetworkError(e.to_string()))?;

        if response.status != StatusCode::OK {
            return Err(WorkerError::NetworkError(format!(
                "unexpected status {}",
                response.status
            )));
        }

        let key = RequestKey::from_request(&request);
        self.backend
            .put(version, CacheEntry::from_response(key, &response))
            .await
    }

    // ==================== Activate ====================

    /// Delete every generation except the current one and take control.
    pub async fn activate(&self) -> ActivateReport {
        let version = self.settings.cache_version.clone();
        let mut report = ActivateReport {
            kept: version.clone(),
            ..Default::default()
        };

        if !self.state().await.has_installed() {
            self.report_error(&WorkerError::StateError(format!(
                "activate requested before install of {version}"
            )));
            return report;
        }

        self.set_state(WorkerState::Activating).await;

        let names = match self.backend.keys().await {
            Ok(names) => names,
            Err(e) => {
                self.report_error(&e);
                Vec::new()
            }
        };

        for name in names.into_iter().filter(|name| *name != version) {
            info!(cache = %name, "Deleting old cache");
            match self.backend.delete(&name).await {
                Ok(_) => {
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::GenerationDeleted { name: name.clone() });
                    report.deleted.push(name);
                }
                Err(e) => self.report_error(&e),
            }
        }

        self.skip_waiting.store(false, Ordering::SeqCst);
        self.set_state(WorkerState::Activated).await;
        report.activated = true;
        report
    }

    // ==================== Fetch ====================

    /// Decide how to answer a request from the page.
    pub async fn handle_fetch(&self, request: &Request) -> FetchDecision {
        if self.interceptor.intercept(request) == InterceptAction::Bypass {
            return FetchDecision::Passthrough;
        }

        let key = RequestKey::from_request(request);
        let cached = match self.backend.match_request(self.version(), &key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache match failed");
                return FetchDecision::Respond(FetchResponse::service_unavailable(
                    request.url.clone(),
                ));
            }
        };

        if let Some(entry) = cached {
            debug!(url = %request.url, "Serving from cache");
            return FetchDecision::Respond(FetchResponse {
                response: entry.to_response(),
                source: ResponseSource::Cache,
            });
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.store_in_background(key, &response).await;
                }
                FetchDecision::Respond(FetchResponse {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Fetch failed");
                FetchDecision::Respond(self.offline_fallback(request).await)
            }
        }
    }

    async fn offline_fallback(&self, request: &Request) -> FetchResponse {
        if !request.is_navigation() {
            return FetchResponse::not_found(request.url.clone());
        }

        let root = match self.resolve("/") {
            Ok(root) => root,
            Err(e) => {
                self.report_error(&e);
                return FetchResponse::not_found(request.url.clone());
            }
        };

        match self
            .backend
            .match_request(self.version(), &RequestKey::get(&root))
            .await
        {
            Ok(Some(entry)) => FetchResponse {
                response: entry.to_response(),
                source: ResponseSource::Fallback,
            },
            Ok(None) => FetchResponse::not_found(request.url.clone()),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache match failed");
                FetchResponse::service_unavailable(request.url.clone())
            }
        }
    }

    async fn store_in_background(&self, key: RequestKey, response: &Response) {
        let entry = CacheEntry::from_response(key.clone(), response);
        let backend = Arc::clone(&self.backend);
        let version = self.settings.cache_version.clone();

        let mut writes = self.pending_writes.lock().await;
        while let Some(done) = writes.try_join_next() {
            self.log_write(done);
        }
        writes.spawn(async move {
            let result = backend.put(&version, entry).await;
            CacheWriteOutcome { key, result }
        });
    }

    fn log_write(&self, done: Result<CacheWriteOutcome, JoinError>) -> Option<CacheWriteOutcome> {
        match done {
            Ok(outcome) => {
                outcome.log();
                Some(outcome)
            }
            Err(e) if e.is_panic() => {
                self.report_unhandled(&format!("cache write panicked: {e}"));
                None
            }
            Err(e) => {
                warn!(error = %e, "Cache write task did not finish");
                None
            }
        }
    }

    /// Wait for every background cache write still in flight.
    ///
    /// Writes spawned while this runs are left for the next call.
    pub async fn settle(&self) -> Vec<CacheWriteOutcome> {
        let mut writes = std::mem::take(&mut *self.pending_writes.lock().await);
        let mut outcomes = Vec::new();
        while let Some(done) = writes.join_next().await {
            outcomes.extend(self.log_write(done));
        }
        outcomes
    }

    // ==================== Messages ====================

    /// Handle a message from a page. Every reply port gets exactly one reply.
    pub async fn handle_message(&self, message: WorkerMessage) -> MessageReport {
        let mut report = MessageReport {
            skip_waiting: message.is_skip_waiting(),
            ..Default::default()
        };
        if report.skip_waiting {
            self.skip_waiting.store(true, Ordering::SeqCst);
        }

        let ack = message.acknowledgement(now_millis());
        let from_extension = message.is_from_extension();
        let WorkerMessage { reply, source, .. } = message;

        if let Some(port) = reply {
            match port.post_message(ack) {
                Ok(()) => report.replied = true,
                Err(e) => self.report_error(&e),
            }
        }

        if from_extension {
            if let Some(client) = source {
                let notice = json!({
                    "success": true,
                    "message": "Service worker received message",
                });
                match client.post_message(notice) {
                    Ok(()) => report.notified_source = true,
                    Err(e) => self.report_error(&e),
                }
            }
        }

        if report.skip_waiting {
            match self.state().await {
                WorkerState::Installed => {
                    self.activate().await;
                }
                WorkerState::Activating | WorkerState::Activated => {
                    debug!("Skip-waiting received while already active");
                }
                state => debug!(?state, "Skip-waiting remembered until install completes"),
            }
        }

        report
    }

    // ==================== Error boundary ====================

    /// Log an error caught at the worker boundary.
    pub fn report_error(&self, err: &WorkerError) {
        error!(category = err.category(), error = %err, "Service worker error");
    }

    /// Log a failure nobody awaited.
    pub fn report_unhandled(&self, reason: &str) {
        error!(reason = %reason, "Service worker unhandled rejection");
    }
}
