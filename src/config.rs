use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::transport::{BucketConfig, HttpClientConfig, RateLimitConfig, RetryConfig};

// =============================================================================
// Time-related constants
// =============================================================================

/// Default cache time-to-live (24 hours)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeout for upstream content fetches (30 seconds)
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for text-generation calls (2 minutes)
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default retry count after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for a single retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(4);

// =============================================================================
// Concurrency and rate limits
// =============================================================================

/// Number of packages checked in parallel by a batch run
pub const MAX_CONCURRENT_CHECKS: usize = 3;

/// Requests per second per upstream host
pub const DEFAULT_HOST_RATE: f64 = 1.0;

/// Burst size per upstream host
pub const DEFAULT_HOST_BURST: u32 = 2;

/// Text-generation calls per second
pub const DEFAULT_GENERATION_RATE: f64 = 0.2;

/// Text-generation burst size
pub const DEFAULT_GENERATION_BURST: u32 = 1;

// =============================================================================
// HTTP
// =============================================================================

pub const USER_AGENT: &str = "overlay-autoupdate";

/// Host that receives the configured GitHub token as a bearer header
pub const GITHUB_API_HOST: &str = "api.github.com";

/// Environment variable read when no token is configured
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Package list location, relative to the overlay root
pub const PACKAGES_FILE: &str = ".autoupdate/packages.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub retry: RetrySettings,
    pub rate_limit: RateLimitSettings,
    pub http: HttpSettings,
    pub github_token: Option<String>,
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache time-to-live in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            timeout_ms: FETCH_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct HostLimit {
    pub rate: f64,
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitSettings {
    pub host_rate: f64,
    pub host_burst: u32,
    pub generation_rate: f64,
    pub generation_burst: u32,
    /// Per-host overrides keyed by host name
    pub hosts: HashMap<String, HostLimit>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            host_rate: DEFAULT_HOST_RATE,
            host_burst: DEFAULT_HOST_BURST,
            generation_rate: DEFAULT_GENERATION_RATE,
            generation_burst: DEFAULT_GENERATION_BURST,
            hosts: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpSettings {
    pub user_agent: String,
    /// Sent with every request; values may contain `${ENV}` templates
    pub default_headers: HashMap<String, String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            default_headers: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(config.with_env_token(std::env::var(GITHUB_TOKEN_ENV).ok()))
    }

    /// Fill the GitHub token from the environment when not configured
    pub fn with_env_token(mut self, env_token: Option<String>) -> Self {
        if self.github_token.is_none() {
            self.github_token = env_token.filter(|t| !t.is_empty());
        }
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            timeout: Duration::from_millis(self.retry.timeout_ms),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            default_host: BucketConfig::new(self.rate_limit.host_rate, self.rate_limit.host_burst),
            generation: BucketConfig::new(
                self.rate_limit.generation_rate,
                self.rate_limit.generation_burst,
            ),
            hosts: self
                .rate_limit
                .hosts
                .iter()
                .map(|(host, limit)| (host.clone(), BucketConfig::new(limit.rate, limit.burst)))
                .collect(),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            retry: self.retry_config(),
            user_agent: self.http.user_agent.clone(),
            default_headers: self.http.default_headers.clone(),
            github_token: self.github_token.clone(),
            github_api_host: GITHUB_API_HOST.to_string(),
        }
    }
}

/// Returns the path to the data directory for overlay-autoupdate.
/// Uses $XDG_DATA_HOME/overlay-autoupdate if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/overlay-autoupdate,
/// or ./overlay-autoupdate if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the version cache file.
pub fn cache_path() -> PathBuf {
    data_dir().join("cache.json")
}

/// Returns the path to the pending update queue file.
pub fn pending_path() -> PathBuf {
    data_dir().join("pending.json")
}

/// Returns the directory for log files.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("overlay-autoupdate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn app_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<AppConfig>(json!({
            "cache": {
                "ttlSecs": 60
            }
        }))
        .unwrap();

        assert_eq!(result.cache.ttl_secs, 60);
        assert_eq!(result.retry, RetrySettings::default());
        assert_eq!(result.rate_limit, RateLimitSettings::default());
    }

    #[test]
    fn app_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<AppConfig>(json!({
            "cache": { "ttlSecs": 10 },
            "retry": { "maxRetries": 5, "baseDelayMs": 100, "maxDelayMs": 800, "timeoutMs": 5000 },
            "rateLimit": {
                "hostRate": 4.0,
                "hostBurst": 8,
                "generationRate": 0.5,
                "generationBurst": 2,
                "hosts": { "api.github.com": { "rate": 0.5, "burst": 1 } }
            },
            "http": { "userAgent": "test-agent", "defaultHeaders": { "Accept": "*/*" } },
            "githubToken": "abc"
        }))
        .unwrap();

        assert_eq!(
            result.retry_config(),
            RetryConfig {
                max_retries: 5,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_millis(800),
                timeout: Duration::from_secs(5),
            }
        );
        let limits = result.rate_limit_config();
        assert_eq!(limits.default_host, BucketConfig::new(4.0, 8));
        assert_eq!(limits.generation, BucketConfig::new(0.5, 2));
        assert_eq!(
            limits.hosts.get("api.github.com"),
            Some(&BucketConfig::new(0.5, 1))
        );
        let http = result.http_client_config();
        assert_eq!(http.user_agent, "test-agent");
        assert_eq!(http.github_token.as_deref(), Some("abc"));
        assert_eq!(result.cache_ttl(), Duration::from_secs(10));
    }

    #[test]
    fn load_returns_defaults_for_missing_file() {
        let temp_dir = TempDir::new().unwrap();

        let config = AppConfig::load(&temp_dir.path().join("absent.json")).unwrap();

        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn load_rejects_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn with_env_token_does_not_override_configured_token() {
        let config = AppConfig {
            github_token: Some("file".to_string()),
            ..AppConfig::default()
        };

        let config = config.with_env_token(Some("env".to_string()));

        assert_eq!(config.github_token.as_deref(), Some("file"));
    }

    #[test]
    fn with_env_token_fills_missing_token() {
        let config = AppConfig::default().with_env_token(Some("env".to_string()));

        assert_eq!(config.github_token.as_deref(), Some("env"));
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/overlay-autoupdate"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(
            path,
            PathBuf::from("/home/user/.local/share/overlay-autoupdate")
        );
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./overlay-autoupdate"));
    }
}
