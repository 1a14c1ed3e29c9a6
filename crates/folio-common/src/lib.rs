//! # Folio Common
//!
//! Error type and logging setup shared by every Folio crate.
//!
//! Each crate keeps its own `thiserror` enum close to the code that raises
//! it and converts into [`FolioError`] at crate boundaries, so binaries deal
//! with a single type.

use std::time::Duration;
use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for Folio.
#[derive(Error, Debug)]
pub enum FolioError {
    /// Fetching from the origin failed.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Cache storage or snapshot failure.
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Media rotator failure.
    #[error("Media error: {message}")]
    Media {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid or unreadable configuration.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

macro_rules! constructors {
    ($($variant:ident => $plain:ident, $sourced:ident;)*) => {
        impl FolioError {
            $(
                #[doc = concat!("A `", stringify!($variant), "` error without a cause.")]
                pub fn $plain(message: impl Into<String>) -> Self {
                    Self::$variant {
                        message: message.into(),
                        source: None,
                    }
                }

                #[doc = concat!("A `", stringify!($variant), "` error caused by `source`.")]
                pub fn $sourced(
                    message: impl Into<String>,
                    source: impl std::error::Error + Send + Sync + 'static,
                ) -> Self {
                    Self::$variant {
                        message: message.into(),
                        source: Some(Box::new(source)),
                    }
                }
            )*
        }
    };
}

constructors! {
    Network => network, network_with_source;
    Cache => cache, cache_with_source;
    Media => media, media_with_source;
    Config => config, config_with_source;
}

impl FolioError {
    /// Whether trying again later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FolioError::Network { .. } | FolioError::Timeout(_) | FolioError::Io(_)
        )
    }

    /// Short label used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            FolioError::Network { .. } => "network",
            FolioError::Cache { .. } => "cache",
            FolioError::Media { .. } => "media",
            FolioError::Config { .. } => "config",
            FolioError::Io(_) => "io",
            FolioError::Timeout(_) => "timeout",
            FolioError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type alias for Folio operations.
pub type Result<T> = std::result::Result<T, FolioError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_categories() {
        assert_eq!(FolioError::cache("disk full").category(), "cache");
        assert_eq!(FolioError::network("offline").category(), "network");
        assert_eq!(FolioError::media("no sources").category(), "media");
        assert_eq!(
            FolioError::Timeout(Duration::from_secs(1)).category(),
            "timeout"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(FolioError::network("offline").is_retryable());
        assert!(FolioError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!FolioError::cache("disk full").is_retryable());
        assert!(!FolioError::config("bad origin").is_retryable());
    }

    #[test]
    fn test_source_is_kept() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "caches.json");
        let err = FolioError::cache_with_source("reading snapshot", io);
        assert_eq!(err.to_string(), "Cache error: reading snapshot");
        assert_eq!(err.source().unwrap().to_string(), "caches.json");

        assert!(FolioError::config("bad origin").source().is_none());
    }

    #[test]
    fn test_io_conversion() {
        let err: FolioError = std::io::Error::other("denied").into();
        assert_eq!(err.category(), "io");
    }
}
