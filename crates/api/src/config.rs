//! Gateway configuration loaded from environment variables.
//!
//! Loaded once at process start; nothing is re-read at runtime.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Data Store base URL (REST API served at `/rest/v1`)
//! - `SUPABASE_ANON_KEY` - Data Store API key
//! - `SUPABASE_SERVICE_KEY` - Service key sent to the Identity Provider
//!
//! ## Optional
//! - `API_HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 8080)
//! - `ALLOWED_ORIGINS` - Comma separated CORS origins
//! - `IDENTITY_VERIFY_URL` - Token lookup endpoint (default: `{SUPABASE_URL}/auth/v1/user`)
//! - `RATE_LIMIT_WINDOW_SECS` - Fixed window length (default: 60)
//! - `RATE_LIMIT_MAX_REQUESTS` - Requests allowed per window and client (default: 100)
//! - `TRUST_PROXY_HEADERS` - Key clients by proxy headers (default: false). Only
//!   enable behind a proxy that overwrites them; otherwise a client picks its
//!   own rate limit key.
//! - `REQUEST_TIMEOUT_SECS` - Per-request deadline for upstream calls (default: 30)
//! - `UPSTREAM_TIMEOUT_SECS` - Cap for a single upstream HTTP call (default: 10)
//! - `ORDER_STOCK_STRATEGY` - `atomic` or `read-then-write` (default: atomic)
//! - `ORDER_FAILURE_POLICY` - `compensate` or `surface` (default: compensate)
//! - `ORDER_COMPENSATION_TIMEOUT_SECS` - Budget for undoing a partial order (default: 10)
//! - `ORDER_RECONCILE_INTERVAL_SECS` - Period of the unsettled order pass (default: 60)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::services::orders::{FailurePolicy, PlacementPolicy, StockStrategy};
use crate::services::rate_limiter::RateLimitConfig;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:4321";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret-key",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Origins allowed to make cross-origin requests
    pub allowed_origins: Vec<String>,
    /// Data Store connection settings
    pub data_store: DataStoreConfig,
    /// Identity Provider settings
    pub identity: IdentityConfig,
    /// Request-time behaviour shared with the application state
    pub runtime: RuntimeSettings,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry performance trace sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Data Store (REST) settings.
///
/// Implements `Debug` manually to redact the key.
#[derive(Clone)]
pub struct DataStoreConfig {
    /// Base URL of the project, e.g. `https://xyz.supabase.co`
    pub base_url: Url,
    /// API key sent with every request
    pub api_key: SecretString,
    /// Cap for a single HTTP call
    pub timeout: Duration,
}

impl std::fmt::Debug for DataStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStoreConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Identity Provider settings.
///
/// Implements `Debug` manually to redact the service key.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Endpoint answering `GET` with the subject behind a bearer token
    pub verify_url: Url,
    /// Service-level API key attached to every lookup
    pub service_key: SecretString,
    /// Cap for a single HTTP call
    pub timeout: Duration,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("verify_url", &self.verify_url.as_str())
            .field("service_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings consulted while serving requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// Fixed-window rate limit applied to every client key
    pub rate_limit: RateLimitConfig,
    /// Key clients by `CF-Connecting-IP` / `X-Forwarded-For` / ... headers.
    /// Off unless a proxy in front strips client-supplied values.
    pub trust_proxy_headers: bool,
    /// Deadline given to each inbound request
    pub request_timeout: Duration,
    /// How the order workflow writes stock and handles partial failures
    pub placement: PlacementPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            trust_proxy_headers: false,
            request_timeout: Duration::from_secs(30),
            placement: PlacementPolicy::default(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if keys fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env("API_HOST", "127.0.0.1")?;
        let port = parse_env("PORT", "8080")?;
        let allowed_origins = parse_origins(&get_env_or_default(
            "ALLOWED_ORIGINS",
            DEFAULT_ALLOWED_ORIGINS,
        ));

        let upstream_timeout = Duration::from_secs(parse_env("UPSTREAM_TIMEOUT_SECS", "10")?);
        let base_url = parse_url("SUPABASE_URL", &get_required_env("SUPABASE_URL")?)?;
        let verify_url = match get_optional_env("IDENTITY_VERIFY_URL") {
            Some(raw) => Url::parse(&raw).map_err(|e| {
                ConfigError::InvalidEnvVar("IDENTITY_VERIFY_URL".to_string(), e.to_string())
            })?,
            None => base_url.join("auth/v1/user").map_err(|e| {
                ConfigError::InvalidEnvVar("SUPABASE_URL".to_string(), e.to_string())
            })?,
        };

        let data_store = DataStoreConfig {
            base_url,
            api_key: get_validated_secret("SUPABASE_ANON_KEY")?,
            timeout: upstream_timeout,
        };
        let identity = IdentityConfig {
            verify_url,
            service_key: get_validated_secret("SUPABASE_SERVICE_KEY")?,
            timeout: upstream_timeout,
        };

        let runtime = RuntimeSettings {
            rate_limit: RateLimitConfig::new(
                Duration::from_secs(parse_env("RATE_LIMIT_WINDOW_SECS", "60")?),
                parse_env("RATE_LIMIT_MAX_REQUESTS", "100")?,
            ),
            trust_proxy_headers: parse_env("TRUST_PROXY_HEADERS", "false")?,
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", "30")?),
            placement: PlacementPolicy {
                stock: parse_env::<StockStrategy>("ORDER_STOCK_STRATEGY", "atomic")?,
                on_failure: parse_env::<FailurePolicy>("ORDER_FAILURE_POLICY", "compensate")?,
                compensation_timeout: Duration::from_secs(parse_env(
                    "ORDER_COMPENSATION_TIMEOUT_SECS",
                    "10",
                )?),
                reconcile_interval: Duration::from_secs(parse_env(
                    "ORDER_RECONCILE_INTERVAL_SECS",
                    "60",
                )?),
            },
        };
        runtime.validate()?;

        Ok(Self {
            host,
            port,
            allowed_origins,
            data_store,
            identity,
            runtime,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl RuntimeSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "RATE_LIMIT_WINDOW_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "RATE_LIMIT_MAX_REQUESTS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "REQUEST_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.placement.reconcile_interval.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "ORDER_RECONCILE_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a base URL, normalising it to end with `/`.
fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    // `Url::join` drops the last segment unless the path ends with a slash
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url)
}

/// Split a comma separated origin list, dropping blanks.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a key is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a key from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
