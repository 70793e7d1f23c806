//! Command-line interface parsing for the MGNREGA cache
//!
//! Every flag falls back to an environment variable, so the service can be
//! configured entirely from the environment (or a `.env` file).

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use clap::Parser;

use crate::config::{
    CacheConfig, Config, ConfigError, RateLimitConfig, UpstreamConfig, DEFAULT_API_URL, DEFAULT_CACHE_DIR,
    DEFAULT_CACHE_TTL_HOURS, DEFAULT_FETCH_LIMIT, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_PORT,
    DEFAULT_RATE_LIMIT,
};
use crate::scheduler::SchedulerConfig;

/// MGNREGA cache - serves the data.gov.in MGNREGA dataset from a local cache
#[derive(Parser, Debug)]
#[command(name = "mgnrega-cache")]
#[command(about = "Caching proxy for the data.gov.in MGNREGA dataset")]
#[command(version)]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// data.gov.in resource URL
    #[arg(long, env = "MGNREGA_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// data.gov.in API key
    #[arg(long, env = "MGNREGA_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Maximum number of records requested per fetch
    #[arg(long, env = "MGNREGA_FETCH_LIMIT", default_value_t = DEFAULT_FETCH_LIMIT)]
    pub fetch_limit: u32,

    /// Upstream request timeout in seconds
    #[arg(long, env = "MGNREGA_FETCH_TIMEOUT_SECS", default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    pub fetch_timeout_secs: u64,

    /// Directory for the cache file
    #[arg(long, env = "MGNREGA_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Age in hours after which cached data is refreshed in the background
    #[arg(long, env = "MGNREGA_CACHE_TTL_HOURS", default_value_t = DEFAULT_CACHE_TTL_HOURS)]
    pub cache_ttl_hours: u64,

    /// Local time of the daily refresh (HH:MM)
    #[arg(long, env = "MGNREGA_REFRESH_AT", default_value = "04:00", value_name = "HH:MM")]
    pub refresh_at: String,

    /// Disable the daily scheduled refresh
    #[arg(long, env = "MGNREGA_NO_SCHEDULER")]
    pub no_scheduler: bool,

    /// Requests per minute per client on /api routes (0 disables the limit)
    #[arg(long, env = "MGNREGA_RATE_LIMIT", default_value_t = DEFAULT_RATE_LIMIT)]
    pub rate_limit: u32,

    /// Identify clients by x-forwarded-for / x-real-ip (only behind a trusted proxy)
    #[arg(long, env = "MGNREGA_TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "MGNREGA_LOG", default_value = "info")]
    pub log_level: String,
}

/// Parses a `HH:MM` refresh time
///
/// # Returns
/// * `Ok(NaiveTime)` for a valid 24-hour time
/// * `Err(ConfigError::InvalidRefreshTime)` otherwise
pub fn parse_refresh_time(s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| ConfigError::InvalidRefreshTime(s.to_string()))
}

impl Config {
    /// Creates a Config from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(Config)` with all settings resolved
    /// * `Err(ConfigError)` if the API key is missing or a value is invalid
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let api_key = cli
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let api_url = cli.api_url.trim();
        if api_url.is_empty() {
            return Err(ConfigError::EmptyApiUrl);
        }

        if cli.fetch_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let daily_at = parse_refresh_time(&cli.refresh_at)?;

        let ttl = i64::try_from(cli.cache_ttl_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or(ConfigError::InvalidCacheTtl(cli.cache_ttl_hours))?;

        Ok(Config {
            port: cli.port,
            upstream: UpstreamConfig {
                base_url: api_url.to_string(),
                api_key: api_key.to_string(),
                limit: cli.fetch_limit,
                timeout: Duration::from_secs(cli.fetch_timeout_secs),
            },
            cache: CacheConfig {
                dir: cli.cache_dir.clone(),
                ttl,
            },
            scheduler: SchedulerConfig {
                daily_at,
                enabled: !cli.no_scheduler,
            },
            rate_limit: NonZeroU32::new(cli.rate_limit).map(|per_minute| RateLimitConfig {
                per_minute,
                trust_proxy: cli.trust_proxy,
            }),
            log_level: cli.log_level.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refresh_time_valid() {
        assert_eq!(
            parse_refresh_time("04:00").unwrap(),
            NaiveTime::from_hms_opt(4, 0, 0).unwrap()
        );
        assert_eq!(
            parse_refresh_time("23:59").unwrap(),
            NaiveTime::from_hms_opt(23, 59, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_refresh_time_invalid() {
        let err = parse_refresh_time("25:00").unwrap_err();
        assert!(err.to_string().contains("25:00"));
        assert!(parse_refresh_time("4am").is_err());
        assert!(parse_refresh_time("").is_err());
    }

    #[test]
    fn test_cli_parse_defaults() {
        let cli = Cli::parse_from(["mgnrega-cache", "--api-key", "k"]);
        assert_eq!(cli.api_url, DEFAULT_API_URL);
        assert_eq!(cli.cache_dir, PathBuf::from("./cache"));
        assert_eq!(cli.refresh_at, "04:00");
        assert!(!cli.no_scheduler);
    }

    #[test]
    fn test_config_from_cli_defaults() {
        let cli = Cli::parse_from(["mgnrega-cache", "--api-key", "k", "--port", "4000"]);
        let config = Config::from_cli(&cli).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.upstream.api_key, "k");
        assert_eq!(config.upstream.limit, 5000);
        assert_eq!(config.upstream.timeout, Duration::from_secs(30));
        assert_eq!(config.cache.ttl, chrono::Duration::hours(24));
        assert_eq!(
            config.scheduler.daily_at,
            NaiveTime::from_hms_opt(4, 0, 0).unwrap()
        );
        assert!(config.scheduler.enabled);
        let rate_limit = config.rate_limit.unwrap();
        assert_eq!(rate_limit.per_minute.get(), 60);
        assert!(!rate_limit.trust_proxy);
    }

    #[test]
    fn test_config_from_cli_overrides() {
        let cli = Cli::parse_from([
            "mgnrega-cache",
            "--api-key",
            "k",
            "--port",
            "8080",
            "--cache-dir",
            "/var/cache/mgnrega",
            "--cache-ttl-hours",
            "6",
            "--refresh-at",
            "02:30",
            "--no-scheduler",
            "--rate-limit",
            "0",
        ]);
        let config = Config::from_cli(&cli).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.cache.dir, PathBuf::from("/var/cache/mgnrega"));
        assert_eq!(config.cache.ttl, chrono::Duration::hours(6));
        assert_eq!(
            config.scheduler.daily_at,
            NaiveTime::from_hms_opt(2, 30, 0).unwrap()
        );
        assert!(!config.scheduler.enabled);
        assert_eq!(config.rate_limit, None);
    }

    #[test]
    fn test_config_from_cli_blank_api_key() {
        let cli = Cli::parse_from(["mgnrega-cache", "--api-key", "   "]);
        let result = Config::from_cli(&cli);
        assert!(matches!(result, Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_config_from_cli_invalid_refresh_time() {
        let cli = Cli::parse_from(["mgnrega-cache", "--api-key", "k", "--refresh-at", "noon"]);
        let result = Config::from_cli(&cli);
        assert!(matches!(result, Err(ConfigError::InvalidRefreshTime(_))));
    }

    #[test]
    fn test_config_from_cli_zero_timeout() {
        let cli = Cli::parse_from(["mgnrega-cache", "--api-key", "k", "--fetch-timeout-secs", "0"]);
        let result = Config::from_cli(&cli);
        assert!(matches!(result, Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_config_from_cli_trust_proxy() {
        let cli = Cli::parse_from(["mgnrega-cache", "--api-key", "k", "--trust-proxy"]);
        let config = Config::from_cli(&cli).unwrap();
        assert!(config.rate_limit.unwrap().trust_proxy);
    }

    #[test]
    fn test_config_from_cli_ttl_out_of_range() {
        let max = u64::MAX.to_string();
        let cli = Cli::parse_from(["mgnrega-cache", "--api-key", "k", "--cache-ttl-hours", max.as_str()]);
        let result = Config::from_cli(&cli);
        assert!(matches!(result, Err(ConfigError::InvalidCacheTtl(hours)) if hours == u64::MAX));

        // fits in i64 but not in a chrono::Duration
        let cli = Cli::parse_from([
            "mgnrega-cache",
            "--api-key",
            "k",
            "--cache-ttl-hours",
            "3000000000000000",
        ]);
        let result = Config::from_cli(&cli);
        assert!(matches!(result, Err(ConfigError::InvalidCacheTtl(_))));
    }

    #[test]
    fn test_config_from_cli_large_ttl_is_accepted() {
        let cli = Cli::parse_from(["mgnrega-cache", "--api-key", "k", "--cache-ttl-hours", "8760"]);
        let config = Config::from_cli(&cli).unwrap();
        assert_eq!(config.cache.ttl, chrono::Duration::days(365));
    }
}
