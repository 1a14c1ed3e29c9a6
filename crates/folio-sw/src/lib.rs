//! # Folio Offline Worker
//!
//! Offline cache worker for the portfolio site, modelled on the service
//! worker lifecycle.
//!
//! ## Features
//!
//! - **Lifecycle**: install, activate, fetch and message handling
//! - **Cache generations**: one named generation per version string; activate
//!   deletes every other generation
//! - **Fetch interception**: cache first, network with best-effort cache
//!   fill, synthetic fallbacks when both fail
//! - **Control messages**: `SKIP_WAITING` with exactly one reply per port
//!
//! ## Architecture
//!
//! ```text
//! OfflineWorker
//!     ├── RequestInterceptor (what to leave alone)
//!     ├── Fetcher (network)
//!     └── CacheBackend (caches)
//!             └── Cache "portfolio-v4"
//!                     └── RequestKey → CacheEntry
//! ```
//!
//! No worker operation returns an error: every path ends in a response, a
//! report, or a logged and discarded failure.

use folio_common::FolioError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cache;
pub mod message;
pub mod snapshot;
pub mod worker;

pub use cache::{Cache, CacheBackend, CacheEntry, CachedHeader, MemoryCacheStorage, RequestKey};
pub use message::{ClientPort, MessageReport, ReplyPort, WorkerMessage, SKIP_WAITING};
pub use snapshot::{GenerationSnapshot, StorageSnapshot};
pub use worker::{
    ActivateReport, CacheWriteOutcome, FetchDecision, FetchResponse, InstallFailure,
    InstallReport, OfflineWorker, ResponseSource, WorkerEvent,
};

// ==================== Errors ====================

/// Errors that can occur inside the worker.
///
/// These never escape the worker's public operations; they are logged and
/// turned into fallback values.
#[derive(Error, Debug, Clone)]
pub enum WorkerError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Message error: {0}")]
    MessageError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl WorkerError {
    /// Short label used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            WorkerError::NetworkError(_) => "network",
            WorkerError::CacheError(_) => "cache",
            WorkerError::StateError(_) => "state",
            WorkerError::MessageError(_) => "message",
            WorkerError::InvalidUrl(_) => "invalid_url",
        }
    }
}

impl From<WorkerError> for FolioError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::NetworkError(msg) => FolioError::network(msg),
            WorkerError::InvalidUrl(msg) => FolioError::InvalidArgument(msg),
            other => FolioError::cache_with_source("offline worker", other),
        }
    }
}

// ==================== Lifecycle ====================

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Constructed, install not yet run.
    #[default]
    Parsed,
    /// Install in progress.
    Installing,
    /// Installed and waiting for activation.
    Installed,
    /// Activation in progress.
    Activating,
    /// Active and serving the current generation.
    Activated,
}

impl WorkerState {
    /// Whether install has completed at least once.
    pub fn has_installed(&self) -> bool {
        matches!(
            self,
            WorkerState::Installed | WorkerState::Activating | WorkerState::Activated
        )
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
