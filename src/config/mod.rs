//! Configuration management for the roomwatch scraper
//!
//! Configuration is read from an optional TOML file, then individual values
//! can be overridden with `ROOMWATCH_*` environment variables. Every section
//! has defaults, so an empty file (or no file) is a valid configuration.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::utils::retry::RetryConfig;
use crate::versioning::ConstantFieldExpectations;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote reservation system
    pub source: SourceConfig,

    /// Retry policy for token acquisition and day fetches
    pub retry: RetryConfig,

    /// Spacing between remote requests
    pub rate_limit: RateLimitConfig,

    /// Orchestrator settings
    pub scraper: ScraperConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Expected values of presumed-constant fields, keyed by field name
    pub constants: BTreeMap<String, Value>,
}

/// Remote source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Scheme and host of the reservation site
    pub base_url: String,

    /// Page whose body carries the anti-forgery token
    pub session_path: String,

    /// Bulk bookings query endpoint
    pub bookings_path: String,

    /// Regex whose first capture group is the token
    pub token_pattern: String,

    /// Header carrying the token on bulk queries
    pub token_header: String,

    /// Seconds before a cached token is considered expired
    pub token_ttl_secs: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Fixed user agent; empty rotates through a built-in browser pool
    pub user_agent: String,
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Target spacing between request starts in milliseconds
    pub interval_ms: u64,

    /// Floor for the pause after a request in milliseconds
    pub minimum_interval_ms: u64,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Length of the rolling window in months
    pub horizon_months: u32,

    /// Pause after a failed continuous-loop iteration in seconds
    pub error_cooldown_secs: u64,

    /// Entries kept in the in-memory activity log
    pub activity_capacity: usize,

    /// First day of the historical backfill
    pub historical_start: Option<NaiveDate>,

    /// Last day of the historical backfill (inclusive)
    pub historical_end: Option<NaiveDate>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://reservations.example.edu"),
            session_path: String::from("/BrowseEvents.aspx"),
            bookings_path: String::from("/ServerApi.aspx/BrowseEvents"),
            token_pattern: String::from(
                r#"(?i)<input[^>]*name="deaCSRFToken"[^>]*value="([^"]*)""#,
            ),
            token_header: String::from("dea-CSRFToken"),
            token_ttl_secs: 1200,
            request_timeout_secs: 30,
            user_agent: String::new(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            minimum_interval_ms: 1_000,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            horizon_months: 6,
            error_cooldown_secs: 30,
            activity_capacity: 100,
            historical_start: None,
            historical_end: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/roomwatch.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            scraper: ScraperConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            constants: default_constants(),
        }
    }
}

fn default_constants() -> BTreeMap<String, Value> {
    BTreeMap::from([
        (String::from("timezone_abbreviation"), Value::from("ET")),
        (String::from("status_type_id"), Value::from(-14)),
        (String::from("is_owner"), Value::from(false)),
    ])
}

impl Config {
    /// Load the file at `path` (or defaults), apply environment overrides
    /// and validate the result
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `ROOMWATCH_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Unparsable numeric values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROOMWATCH_BASE_URL") {
            self.source.base_url = v;
        }

        if let Some(v) = lookup("ROOMWATCH_USER_AGENT") {
            self.source.user_agent = v;
        }

        if let Some(v) = lookup("ROOMWATCH_SQLITE_PATH") {
            self.database.sqlite_path = PathBuf::from(v);
        }

        if let Some(v) = lookup("ROOMWATCH_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.rate_limit.interval_ms = v;
        }

        if let Some(v) = lookup("ROOMWATCH_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.retry.max_retries = v;
        }

        if let Some(v) = lookup("ROOMWATCH_LOG_LEVEL") {
            self.logging.level = v;
        }

        if let Some(v) = lookup("ROOMWATCH_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_retries == 0 {
            anyhow::bail!("retry.max_retries must be greater than 0");
        }

        if self.retry.backoff_multiplier < 1.0 {
            anyhow::bail!("retry.backoff_multiplier must be at least 1.0");
        }

        if self.rate_limit.minimum_interval_ms > self.rate_limit.interval_ms {
            anyhow::bail!("rate_limit.minimum_interval_ms must not exceed interval_ms");
        }

        if self.scraper.horizon_months == 0 {
            anyhow::bail!("scraper.horizon_months must be greater than 0");
        }

        if self.source.token_ttl_secs == 0 {
            anyhow::bail!("source.token_ttl_secs must be greater than 0");
        }

        self.session_url()?;
        self.bookings_url()?;
        self.token_regex()?;
        self.constant_expectations()?;

        if let (Some(start), Some(end)) =
            (self.scraper.historical_start, self.scraper.historical_end)
        {
            if start > end {
                anyhow::bail!("scraper.historical_start {start} is after historical_end {end}");
            }
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                self.logging.format
            );
        }

        Ok(())
    }

    /// Absolute URL of the session page
    pub fn session_url(&self) -> Result<Url> {
        self.join(&self.source.session_path)
    }

    /// Absolute URL of the bulk bookings endpoint
    pub fn bookings_url(&self) -> Result<Url> {
        self.join(&self.source.bookings_path)
    }

    fn join(&self, path: &str) -> Result<Url> {
        let base = Url::parse(&self.source.base_url)
            .with_context(|| format!("Invalid source.base_url: {}", self.source.base_url))?;
        base.join(path)
            .with_context(|| format!("Invalid source path: {path}"))
    }

    /// Compiled token pattern; must have a capture group
    pub fn token_regex(&self) -> Result<Regex> {
        let regex = Regex::new(&self.source.token_pattern)
            .with_context(|| format!("Invalid token_pattern: {}", self.source.token_pattern))?;
        if regex.captures_len() < 2 {
            anyhow::bail!("source.token_pattern needs a capture group for the token");
        }
        Ok(regex)
    }

    /// Expected constant-field values
    pub fn constant_expectations(&self) -> Result<ConstantFieldExpectations> {
        ConstantFieldExpectations::from_map(&self.constants)
            .map_err(|name| anyhow::anyhow!("Unknown constant field: {name}"))
    }

    /// Fixed user agent, if configured
    pub fn user_agent(&self) -> Option<String> {
        let ua = self.source.user_agent.trim();
        (!ua.is_empty()).then(|| ua.to_string())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.source.request_timeout_secs)
    }

    /// Get token TTL as Duration
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.source.token_ttl_secs)
    }

    /// Get continuous-loop error cooldown as Duration
    #[must_use]
    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.scraper.error_cooldown_secs)
    }
}
