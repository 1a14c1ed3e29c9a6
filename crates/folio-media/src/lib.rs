//! # Folio Media
//!
//! Hero background rotator for the portfolio landing page.
//!
//! ## Features
//!
//! - **Timed advance**: one resource at a time, switching on a fixed interval
//!   measured from when each resource actually started
//! - **Failure skipping**: bounded immediate retries, then a sticky failed set
//!   that the rotator skips over, cleared when every resource has failed
//! - **Preloading**: a window of upcoming resources loaded ahead of need
//! - **Fallback display**: reported whenever nothing is playable
//!
//! ## Architecture
//!
//! ```text
//! RotatorHandle ── events ──► RotatorDriver (tokio task)
//!      ▲                          ├── Rotator (pure state machine)
//!      │                          │      ├── FailedSet
//!      │                          │      └── Preloader
//!      └──── watch snapshots ─────┤
//!                                 └── MediaSurface (element side)
//! ```

use folio_common::FolioError;
use thiserror::Error;

pub mod driver;
pub mod event;
pub mod failed;
pub mod preload;
pub mod rotator;

pub use driver::{MediaSurface, RotatorDriver, RotatorHandle};
pub use event::{RotatorEffect, RotatorEvent};
pub use failed::{FailedSet, Selection};
pub use preload::Preloader;
pub use rotator::{Display, Phase, Rotator, RotatorConfig, RotatorSnapshot};

// ==================== Errors ====================

/// Errors that can occur in media operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("No media sources configured")]
    NoSources,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load media {index}: {reason}")]
    LoadFailed { index: usize, reason: String },

    #[error("Rotator driver stopped: {0}")]
    DriverStopped(String),
}

impl From<MediaError> for FolioError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::InvalidConfig(msg) => FolioError::config(msg),
            other => FolioError::media(other.to_string()),
        }
    }
}

// ==================== Media Events ====================

/// Events reported by a media element.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Loading started.
    LoadStart,
    /// Metadata loaded (duration, dimensions).
    LoadedMetadata { duration: f64, width: u32, height: u32 },
    /// First frame loaded.
    LoadedData,
    /// Can start playing.
    CanPlay,
    /// Can play through without buffering.
    CanPlayThrough,
    /// Playback started.
    Playing,
    /// Waiting for data.
    Waiting,
    /// Stalled loading.
    Stalled,
    /// Aborted loading.
    Abort,
    /// Error occurred.
    Error(String),
    /// Playback ended.
    Ended,
}
