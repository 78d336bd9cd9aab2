//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PEPPERCART_DATABASE_URL` - `PostgreSQL` connection string
//! - `PEPPERCART_ACCESS_TOKEN_SECRET` - Access-token signing secret (min 32 chars, high entropy)
//! - `PEPPERCART_REFRESH_TOKEN_SECRET` - Refresh-token signing secret (min 32 chars, high entropy,
//!   must differ from the access secret)
//!
//! ## Optional
//! - `PEPPERCART_HOST` - Bind address (default: 127.0.0.1)
//! - `PEPPERCART_PORT` - Listen port (default: 3000)
//! - `PEPPERCART_ACCESS_TOKEN_TTL_SECS` - Access token lifetime (default: 900)
//! - `PEPPERCART_REFRESH_TOKEN_TTL_SECS` - Refresh token lifetime (default: 604800)
//! - `PEPPERCART_TOKEN_LEEWAY_SECS` - Clock-skew tolerance for verification (default: 0)
//! - `PEPPERCART_COOKIE_SECURE` - Mark the refresh cookie `Secure` (default: true)
//! - `PEPPERCART_CORS_ORIGIN` - Browser origin allowed to send credentialed
//!   requests (CORS disabled when unset)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
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

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Token signing configuration
    pub tokens: TokenConfig,
    /// Whether the refresh cookie carries the `Secure` attribute
    pub cookie_secure: bool,
    /// Browser origin allowed to send credentialed requests
    pub cors_origin: Option<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag (e.g. "production")
    pub sentry_environment: Option<String>,
}

/// Signing secrets and expiries for the two token classes.
///
/// Immutable after construction; injected into the token codec rather than
/// read from ambient state at call time. Implements `Debug` manually to
/// redact the secrets.
#[derive(Clone)]
pub struct TokenConfig {
    /// Secret for the access-token signing context
    pub access_secret: SecretString,
    /// Secret for the refresh-token signing context
    pub refresh_secret: SecretString,
    /// Access token lifetime in seconds (minutes-to-hours class)
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds (days class)
    pub refresh_ttl_secs: i64,
    /// Clock-skew tolerance applied during verification
    pub leeway_secs: u64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
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
    /// if secrets fail validation (placeholder detection, entropy check,
    /// identical access/refresh secrets).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("PEPPERCART_DATABASE_URL")?;
        let host = get_env_or_default("PEPPERCART_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("PEPPERCART_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("PEPPERCART_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("PEPPERCART_PORT".to_string(), e.to_string())
            })?;

        let tokens = TokenConfig::from_env()?;

        let cookie_secure = get_env_or_default("PEPPERCART_COOKIE_SECURE", "true")
            .parse::<bool>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("PEPPERCART_COOKIE_SECURE".to_string(), e.to_string())
            })?;

        let cors_origin = get_optional_env("PEPPERCART_CORS_ORIGIN");
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            database_url,
            host,
            port,
            tokens,
            cookie_secure,
            cors_origin,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl TokenConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let access_secret = get_validated_secret("PEPPERCART_ACCESS_TOKEN_SECRET")?;
        validate_secret_length(&access_secret, "PEPPERCART_ACCESS_TOKEN_SECRET")?;

        let refresh_secret = get_validated_secret("PEPPERCART_REFRESH_TOKEN_SECRET")?;
        validate_secret_length(&refresh_secret, "PEPPERCART_REFRESH_TOKEN_SECRET")?;

        // Compromise of one signing context must not forge the other class.
        if access_secret.expose_secret() == refresh_secret.expose_secret() {
            return Err(ConfigError::InsecureSecret(
                "PEPPERCART_REFRESH_TOKEN_SECRET".to_string(),
                "must differ from PEPPERCART_ACCESS_TOKEN_SECRET".to_string(),
            ));
        }

        let access_ttl_secs = get_positive_i64("PEPPERCART_ACCESS_TOKEN_TTL_SECS", "900")?;
        let refresh_ttl_secs = get_positive_i64("PEPPERCART_REFRESH_TOKEN_TTL_SECS", "604800")?;

        let leeway_secs = get_env_or_default("PEPPERCART_TOKEN_LEEWAY_SECS", "0")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar(
                    "PEPPERCART_TOKEN_LEEWAY_SECS".to_string(),
                    e.to_string(),
                )
            })?;

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl_secs,
            refresh_ttl_secs,
            leeway_secs,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable as a positive i64.
fn get_positive_i64(key: &str, default: &str) -> Result<i64, ConfigError> {
    let value = get_env_or_default(key, default)
        .parse::<i64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if value <= 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be positive".to_string(),
        ));
    }
    Ok(value)
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_TOKEN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
