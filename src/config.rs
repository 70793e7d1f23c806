//! Runtime configuration
//!
//! Everything the service needs at startup, built once from CLI arguments and
//! environment variables (see [`crate::cli`]) and passed down explicitly.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::scheduler::SchedulerConfig;

/// Default data.gov.in resource for the MGNREGA dataset
pub const DEFAULT_API_URL: &str =
    "https://api.data.gov.in/resource/ee03643a-ee4c-48c2-ac30-9f2ff26ab722";

/// Default listening port
pub const DEFAULT_PORT: u16 = 4000;

/// Default number of records requested per fetch
pub const DEFAULT_FETCH_LIMIT: u32 = 5000;

/// Default upstream request timeout in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default cache directory, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = "./cache";

/// Default cache TTL in hours
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;

/// Default per-client request ceiling per minute
pub const DEFAULT_RATE_LIMIT: u32 = 60;

/// Name of the cache file inside the cache directory
pub const CACHE_FILE_NAME: &str = "mgnrega_data.json";

/// Errors raised while building the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No API key was supplied
    #[error("Missing API key: pass --api-key or set MGNREGA_API_KEY")]
    MissingApiKey,

    /// Upstream URL is blank
    #[error("Upstream API URL must not be empty")]
    EmptyApiUrl,

    /// Refresh time is not `HH:MM`
    #[error("Invalid refresh time '{0}': expected HH:MM (24-hour)")]
    InvalidRefreshTime(String),

    /// Timeout of zero seconds
    #[error("Fetch timeout must be at least one second")]
    ZeroTimeout,

    /// TTL too large to represent
    #[error("Cache TTL of {0} hours is out of range")]
    InvalidCacheTtl(u64),
}

/// Settings for the upstream data source
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Resource URL, without query string
    pub base_url: String,
    /// data.gov.in API key
    pub api_key: String,
    /// Maximum number of records requested
    pub limit: u32,
    /// Upper bound on a single fetch
    pub timeout: Duration,
}

/// Settings for the on-disk cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding the cache file
    pub dir: PathBuf,
    /// Age after which a cache hit triggers a background refresh
    pub ttl: chrono::Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            ttl: chrono::Duration::hours(DEFAULT_CACHE_TTL_HOURS as i64),
        }
    }
}

/// Settings for per-client rate limiting on `/api`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per client per minute
    pub per_minute: NonZeroU32,
    /// Key clients on `x-forwarded-for` / `x-real-ip` instead of the peer
    /// address. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy: bool,
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to
    pub port: u16,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    /// Rate limit on `/api`; `None` disables limiting
    pub rate_limit: Option<RateLimitConfig>,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl UpstreamConfig {
    /// Creates an upstream config with default limit and timeout
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            limit: DEFAULT_FETCH_LIMIT,
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}
