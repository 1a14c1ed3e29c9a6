//! Runtime configuration

use std::path::Path;
use std::time::Duration;

use folio_common::{FolioError, LogConfig, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Font stylesheet requested by every page.
pub const FONT_STYLESHEET: &str = "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700;800;900&family=Urbanist:wght@300;400;500;600;700;800;900&family=Poppins:wght@300;400;500;600;700;800;900&display=swap";

/// Environment variable overriding [`WorkerSettings::origin`].
pub const ENV_ORIGIN: &str = "FOLIO_ORIGIN";
/// Environment variable overriding [`WorkerSettings::cache_version`].
pub const ENV_CACHE_VERSION: &str = "FOLIO_CACHE_VERSION";
/// Environment variable overriding [`LoggingSettings::filter`].
pub const ENV_LOG: &str = "FOLIO_LOG";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FolioConfig {
    /// Offline cache worker settings
    pub worker: WorkerSettings,

    /// Hero media rotator settings
    pub rotator: RotatorSettings,

    /// Logging settings
    pub logging: LoggingSettings,
}

/// Offline cache worker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerSettings {
    /// Origin the worker is installed for; relative manifest entries resolve against it
    pub origin: Url,

    /// Name of the current cache generation
    pub cache_version: String,

    /// Assets cached eagerly on install
    pub manifest: Vec<String>,

    /// URL prefixes that are never intercepted
    pub bypass_prefixes: Vec<String>,

    /// URL substrings that are never intercepted
    pub bypass_contains: Vec<String>,
}

/// Hero media rotator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RotatorSettings {
    /// Ordered media URLs
    pub sources: Vec<String>,

    /// Display time per resource in seconds
    pub interval_secs: u64,

    /// Pause after a failure before switching, in milliseconds
    pub settle_delay_ms: u64,

    /// Reloads of the same index before it is marked failed
    pub max_immediate_retries: u32,

    /// Number of upcoming resources preloaded ahead of the current one
    pub preload_window: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level name (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, compact, json)
    pub format: String,

    /// Optional EnvFilter directive string
    pub filter: Option<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:3000/").expect("static origin is valid"),
            cache_version: "portfolio-v4".to_string(),
            manifest: vec![
                "/".to_string(),
                "/static/js/bundle.js".to_string(),
                "/static/css/main.css".to_string(),
                "/assets/videos/".to_string(),
                "/assets/resume.pdf".to_string(),
                FONT_STYLESHEET.to_string(),
            ],
            bypass_prefixes: vec![
                "chrome-extension://".to_string(),
                "moz-extension://".to_string(),
                "safari-extension://".to_string(),
                "edge-extension://".to_string(),
            ],
            bypass_contains: vec![
                "chrome-extension".to_string(),
                "moz-extension".to_string(),
                "safari-extension".to_string(),
            ],
        }
    }
}

impl Default for RotatorSettings {
    fn default() -> Self {
        Self {
            sources: [2, 4, 5, 6, 7, 8, 9, 10, 11]
                .iter()
                .map(|n| format!("/videos/hero{n}.webm"))
                .collect(),
            interval_secs: 30,
            settle_delay_ms: 500,
            max_immediate_retries: 2,
            preload_window: 2,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            filter: None,
        }
    }
}

impl RotatorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl LoggingSettings {
    /// Build the subscriber configuration.
    pub fn to_log_config(&self) -> Result<LogConfig> {
        let config = LogConfig::from_names(&self.level, &self.format)?;
        Ok(match &self.filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        })
    }
}

impl FolioConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            FolioError::config_with_source(format!("invalid config {}", path.display()), e)
        })?;
        debug!(path = %path.display(), "Loaded configuration");
        config.validate()?;
        Ok(config)
    }

    /// Apply `FOLIO_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(origin) = lookup(ENV_ORIGIN) {
            self.worker.origin = Url::parse(&origin).map_err(|e| {
                FolioError::config_with_source(format!("{ENV_ORIGIN} is not a URL"), e)
            })?;
        }
        if let Some(version) = lookup(ENV_CACHE_VERSION) {
            self.worker.cache_version = version;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.logging.filter = Some(filter);
        }
        self.validate()
    }

    /// Reject settings the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.worker.cache_version.trim().is_empty() {
            return Err(FolioError::config("cache_version must not be empty"));
        }
        if !matches!(self.worker.origin.scheme(), "http" | "https") {
            return Err(FolioError::config(format!(
                "origin must be http or https, got {}",
                self.worker.origin
            )));
        }
        if self.rotator.sources.is_empty() {
            return Err(FolioError::config("rotator needs at least one source"));
        }
        if self.rotator.interval_secs == 0 {
            return Err(FolioError::config("rotation interval must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = FolioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker.cache_version, "portfolio-v4");
        assert_eq!(config.worker.manifest.len(), 6);
        assert_eq!(config.rotator.sources.len(), 9);
        assert_eq!(config.rotator.interval(), Duration::from_secs(30));
        assert_eq!(config.rotator.settle_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"worker": {{"cache_version": "portfolio-v5"}}, "rotator": {{"sources": ["/a.webm", "/b.webm"]}}}}"#
        )
        .unwrap();

        let config = FolioConfig::load(file.path()).unwrap();
        assert_eq!(config.worker.cache_version, "portfolio-v5");
        assert_eq!(config.worker.origin.as_str(), "http://localhost:3000/");
        assert_eq!(config.rotator.sources, vec!["/a.webm", "/b.webm"]);
        assert_eq!(config.rotator.max_immediate_retries, 2);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = FolioConfig::load(file.path()).unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_validate_rejects_empty_sources() {
        let mut config = FolioConfig::default();
        config.rotator.sources.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_origin() {
        let mut config = FolioConfig::default();
        config.worker.origin = Url::parse("file:///srv/site/").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = FolioConfig::default();
        config
            .apply_overrides_from(|key| match key {
                ENV_ORIGIN => Some("https://nishit.dev/".to_string()),
                ENV_CACHE_VERSION => Some("portfolio-v9".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.worker.origin.as_str(), "https://nishit.dev/");
        assert_eq!(config.worker.cache_version, "portfolio-v9");
        assert!(config.logging.filter.is_none());
    }

    #[test]
    fn test_override_with_bad_origin_fails() {
        let mut config = FolioConfig::default();
        let result = config.apply_overrides_from(|key| {
            (key == ENV_ORIGIN).then(|| "not a url".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_logging_settings_to_log_config() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            format: "compact".to_string(),
            filter: Some("folio_sw=trace".to_string()),
        };
        let config = settings.to_log_config().unwrap();
        assert_eq!(config.filter.as_deref(), Some("folio_sw=trace"));
    }
}
