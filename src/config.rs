//! Process configuration loaded once at startup.
//!
//! All values come from environment variables (optionally seeded from a
//! `.env` file). The resulting [`Config`] is immutable and handed to the
//! components that need it; nothing reads the environment at call time.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:50051";
const DEFAULT_POOL_SIZE: usize = 16;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INITIATION_TTL_SECS: u64 = 120;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Where the trusted token-signing key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Base64 encoding of a PEM public key.
    PemBase64(String),
    /// RSA modulus and exponent, base64url encoded as in a JWKS entry.
    RsaComponents { n: String, e: String },
}

/// Identity provider settings consumed by the token verifier.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub key: KeySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<SecretString>,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    /// Deadline applied to every authenticated call.
    pub request_timeout: Duration,
    /// How long a pairing initiation stays usable.
    pub initiation_ttl: Duration,
    /// Period of the background sweep that purges stale initiations.
    pub sweep_interval: Duration,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file is read first when present; variables already set in the
    /// environment win over the file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit `.env` file plus the environment.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::from_path(path).map_err(|e| ConfigError::InvalidValue {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let issuer = get("PAIR_JWT_ISSUER")
            .ok_or_else(|| ConfigError::MissingEnvVar("PAIR_JWT_ISSUER".into()))?;
        let audience = get("PAIR_JWT_AUDIENCE")
            .ok_or_else(|| ConfigError::MissingEnvVar("PAIR_JWT_AUDIENCE".into()))?;

        let key = match (
            get("PAIR_JWT_PUBLIC_KEY_PEM_B64"),
            get("PAIR_JWT_RSA_N"),
            get("PAIR_JWT_RSA_E"),
        ) {
            (Some(pem), _, _) => KeySource::PemBase64(pem),
            (None, Some(n), Some(e)) => KeySource::RsaComponents { n, e },
            _ => {
                return Err(ConfigError::MissingRequired {
                    key: "PAIR_JWT_PUBLIC_KEY_PEM_B64".into(),
                    hint: "Set it, or set both PAIR_JWT_RSA_N and PAIR_JWT_RSA_E".into(),
                });
            }
        };

        let bind_addr = get("PAIR_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "PAIR_BIND_ADDR".into(),
                message: e.to_string(),
            })?;

        let database_url = get("DATABASE_URL").map(SecretString::from);
        let backend = match get("PAIR_STORE").as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some("postgres") => StoreBackend::Postgres,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "PAIR_STORE".into(),
                    message: format!(
                        "unknown backend '{}', expected 'postgres' or 'memory'",
                        other
                    ),
                });
            }
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "DATABASE_URL".into(),
                hint: "Required when PAIR_STORE=postgres".into(),
            });
        }

        let pool_size =
            parse_number(&get, "DATABASE_POOL_SIZE", DEFAULT_POOL_SIZE as u64)? as usize;
        let request_timeout = Duration::from_secs(parse_number(
            &get,
            "PAIR_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        let initiation_ttl = Duration::from_secs(parse_number(
            &get,
            "PAIR_INITIATION_TTL_SECS",
            DEFAULT_INITIATION_TTL_SECS,
        )?);
        let sweep_interval = Duration::from_secs(parse_number(
            &get,
            "PAIR_SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?);

        let log_format = match get("PAIR_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "PAIR_LOG_FORMAT".into(),
                    message: format!("unknown format '{}', expected 'pretty' or 'json'", other),
                });
            }
        };

        Ok(Self {
            bind_addr,
            auth: AuthConfig {
                issuer,
                audience,
                key,
            },
            store: StoreConfig {
                backend,
                database_url,
                pool_size,
            },
            request_timeout,
            initiation_ttl,
            sweep_interval,
            log_format,
        })
    }
}

/// Parse a positive integer setting, falling back to `default` when unset.
fn parse_number<G>(get: &G, key: &str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
