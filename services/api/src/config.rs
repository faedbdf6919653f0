//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub mangadex_api_url: String,
    pub mangadex_cover_url: String,
    pub anilist_api_url: String,
    pub mangadex_rate_per_second: u32,
    pub anilist_rate_per_minute: u32,
    pub content_cache_ttl: Duration,
    pub metadata_cache_ttl: Duration,
    pub upstream_timeout: Duration,
    /// `None` keeps every title mapping for the process lifetime.
    pub mapping_cache_capacity: Option<usize>,
}

/// Reads an optional numeric variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());

        // --- Load Upstream Settings ---
        let mangadex_api_url = std::env::var("MANGADEX_API_URL")
            .unwrap_or_else(|_| "https://api.mangadex.org".to_string());
        let mangadex_cover_url = std::env::var("MANGADEX_COVER_URL")
            .unwrap_or_else(|_| "https://uploads.mangadex.org".to_string());
        let anilist_api_url = std::env::var("ANILIST_API_URL")
            .unwrap_or_else(|_| "https://graphql.anilist.co".to_string());

        let mangadex_rate_per_second = parse_var("MANGADEX_RATE_PER_SECOND", 5u32)?;
        let anilist_rate_per_minute = parse_var("ANILIST_RATE_PER_MINUTE", 90u32)?;
        if mangadex_rate_per_second == 0 || anilist_rate_per_minute == 0 {
            return Err(ConfigError::InvalidValue(
                "MANGADEX_RATE_PER_SECOND/ANILIST_RATE_PER_MINUTE".to_string(),
                "rate limits must be positive".to_string(),
            ));
        }

        // --- Load Cache and Timeout Settings ---
        let content_cache_ttl = Duration::from_secs(parse_var("CONTENT_CACHE_TTL_SECS", 300u64)?);
        let metadata_cache_ttl =
            Duration::from_secs(parse_var("METADATA_CACHE_TTL_SECS", 1800u64)?);
        let upstream_timeout = Duration::from_secs(parse_var("UPSTREAM_TIMEOUT_SECS", 10u64)?);
        let mapping_cache_capacity = match parse_var("MAPPING_CACHE_CAPACITY", 0usize)? {
            0 => None,
            capacity => Some(capacity),
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            mangadex_api_url,
            mangadex_cover_url,
            anilist_api_url,
            mangadex_rate_per_second,
            anilist_rate_per_minute,
            content_cache_ttl,
            metadata_cache_ttl,
            upstream_timeout,
            mapping_cache_capacity,
        })
    }
}
