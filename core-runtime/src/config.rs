//! # Core Configuration Module
//!
//! Settings for sync runs and logging, plus the injected bridges they need.
//!
//! ## Overview
//!
//! A [`CoreConfig`] is assembled either with [`CoreConfig::builder`] or from
//! process environment variables with [`CoreConfig::from_env`]. Both paths
//! end in [`CoreConfig::validate`], so an out-of-range value is rejected
//! before any remote call is made.
//!
//! ## Environment
//!
//! | Variable | Default | Range |
//! |----------|---------|-------|
//! | `MAX_CONCURRENT_TRANSFERS` | 3 | 1..=16 |
//! | `MAX_RETRIES` | 3 | 0..=10 |
//! | `CHUNK_SIZE_MB` | 8 | 1..=256 |
//! | `BASE_BACKOFF_MS` | 1000 | 1..=60000 |
//! | `DRY_RUN` | false | `true`/`false`/`1`/`0` |
//! | `LOG_LEVEL` | info | trace, debug, info, warn, error |
//! | `LOG_FORMAT` | pretty (debug) / json (release) | pretty, json, compact |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .max_concurrent_transfers(4)
//!     .chunk_size_mb(16)
//!     .build()?;
//! # Ok::<(), core_runtime::Error>(())
//! ```
//!
//! With the `desktop-shims` feature a reqwest-backed `HttpClient` is injected
//! when none is provided.

use crate::error::{Error, Result};
use crate::logging::{parse_log_level, LogFormat, LoggingConfig};
use bridge_traits::time::LogLevel;
use bridge_traits::HttpClient;
use std::sync::Arc;

pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 3;
pub const MAX_CONCURRENT_TRANSFERS_LIMIT: usize = 16;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const MAX_RETRIES_LIMIT: u32 = 10;
pub const DEFAULT_CHUNK_SIZE_MB: usize = 8;
pub const MAX_CHUNK_SIZE_MB: usize = 256;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
pub const MAX_BASE_BACKOFF_MS: u64 = 60_000;

/// Tunables for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Upper bound on in-flight transfers and deletes
    pub max_concurrent_transfers: usize,
    /// Retries after the first attempt for rate-limited or transient failures
    pub max_retries: u32,
    /// Size of each streamed chunk in MiB
    pub chunk_size_mb: usize,
    /// Delay before the first retry; doubles on each subsequent one
    pub base_backoff_ms: u64,
    /// Plan only, never touch the target
    pub dry_run: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: DEFAULT_MAX_CONCURRENT_TRANSFERS,
            max_retries: DEFAULT_MAX_RETRIES,
            chunk_size_mb: DEFAULT_CHUNK_SIZE_MB,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            dry_run: false,
        }
    }
}

impl SyncSettings {
    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size_mb * 1024 * 1024
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_transfers == 0
            || self.max_concurrent_transfers > MAX_CONCURRENT_TRANSFERS_LIMIT
        {
            return Err(Error::invalid_setting(
                "max_concurrent_transfers",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_CONCURRENT_TRANSFERS_LIMIT, self.max_concurrent_transfers
                ),
            ));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::invalid_setting(
                "max_retries",
                format!("must not exceed {}, got {}", MAX_RETRIES_LIMIT, self.max_retries),
            ));
        }

        if self.chunk_size_mb == 0 || self.chunk_size_mb > MAX_CHUNK_SIZE_MB {
            return Err(Error::invalid_setting(
                "chunk_size_mb",
                format!("must be between 1 and {}, got {}", MAX_CHUNK_SIZE_MB, self.chunk_size_mb),
            ));
        }

        if self.base_backoff_ms == 0 || self.base_backoff_ms > MAX_BASE_BACKOFF_MS {
            return Err(Error::invalid_setting(
                "base_backoff_ms",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_BASE_BACKOFF_MS, self.base_backoff_ms
                ),
            ));
        }

        Ok(())
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
}

impl LogSettings {
    /// Logging configuration seeded from these settings.
    pub fn to_logging_config(&self) -> LoggingConfig {
        let mut config = LoggingConfig::default();
        if let Some(level) = self.level {
            config = config.with_level(level);
        }
        if let Some(format) = self.format {
            config = config.with_format(format);
        }
        config
    }
}

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] or [`CoreConfig::from_env`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub sync: SyncSettings,
    pub logging: LogSettings,
    /// HTTP client handed to service providers
    pub http_client: Option<Arc<dyn HttpClient>>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("sync", &self.sync)
            .field("logging", &self.logging)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns the raw value of an
    /// environment-style key. Unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = CoreConfig::builder();

        if let Some(value) = lookup("MAX_CONCURRENT_TRANSFERS") {
            builder = builder.max_concurrent_transfers(parse_number(
                "MAX_CONCURRENT_TRANSFERS",
                &value,
            )?);
        }
        if let Some(value) = lookup("MAX_RETRIES") {
            builder = builder.max_retries(parse_number("MAX_RETRIES", &value)?);
        }
        if let Some(value) = lookup("CHUNK_SIZE_MB") {
            builder = builder.chunk_size_mb(parse_number("CHUNK_SIZE_MB", &value)?);
        }
        if let Some(value) = lookup("BASE_BACKOFF_MS") {
            builder = builder.base_backoff_ms(parse_number("BASE_BACKOFF_MS", &value)?);
        }
        if let Some(value) = lookup("DRY_RUN") {
            builder = builder.dry_run(parse_bool("DRY_RUN", &value)?);
        }
        if let Some(value) = lookup("LOG_LEVEL") {
            builder = builder.log_level(parse_log_level(&value)?);
        }
        if let Some(value) = lookup("LOG_FORMAT") {
            builder = builder.log_format(value.parse()?);
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()
    }

    /// The injected HTTP client, or an actionable error when none exists.
    pub fn require_http_client(&self) -> Result<Arc<dyn HttpClient>> {
        self.http_client
            .clone()
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "HttpClient".to_string(),
                message: "No HTTP client implementation provided. \
                          Desktop: enable the 'desktop-shims' feature. \
                          Other hosts: inject one with CoreConfigBuilder::http_client."
                    .to_string(),
            })
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| Error::invalid_setting(key, format!("not a non-negative integer: {}", e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(Error::invalid_setting(
            key,
            format!("expected a boolean, got '{}'", other),
        )),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    Some(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    None
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    max_concurrent_transfers: Option<usize>,
    max_retries: Option<u32>,
    chunk_size_mb: Option<usize>,
    base_backoff_ms: Option<u64>,
    dry_run: Option<bool>,
    log_level: Option<LogLevel>,
    log_format: Option<LogFormat>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl CoreConfigBuilder {
    pub fn max_concurrent_transfers(mut self, value: usize) -> Self {
        self.max_concurrent_transfers = Some(value);
        self
    }

    pub fn max_retries(mut self, value: u32) -> Self {
        self.max_retries = Some(value);
        self
    }

    pub fn chunk_size_mb(mut self, value: usize) -> Self {
        self.chunk_size_mb = Some(value);
        self
    }

    pub fn base_backoff_ms(mut self, value: u64) -> Self {
        self.base_backoff_ms = Some(value);
        self
    }

    pub fn dry_run(mut self, value: bool) -> Self {
        self.dry_run = Some(value);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds and validates the final `CoreConfig`.
    pub fn build(self) -> Result<CoreConfig> {
        let defaults = SyncSettings::default();
        let config = CoreConfig {
            sync: SyncSettings {
                max_concurrent_transfers: self
                    .max_concurrent_transfers
                    .unwrap_or(defaults.max_concurrent_transfers),
                max_retries: self.max_retries.unwrap_or(defaults.max_retries),
                chunk_size_mb: self.chunk_size_mb.unwrap_or(defaults.chunk_size_mb),
                base_backoff_ms: self.base_backoff_ms.unwrap_or(defaults.base_backoff_ms),
                dry_run: self.dry_run.unwrap_or(defaults.dry_run),
            },
            logging: LogSettings {
                level: self.log_level,
                format: self.log_format,
            },
            http_client: self.http_client.or_else(provide_default_http_client),
        };

        config.validate()?;

        Ok(config)
    }
}
