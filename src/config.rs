/*
 * Responsibility
 * - Read settings from the environment (listen address, upload root, trusted issuers, limits)
 * - Validate values (invalid input fails startup instead of falling back to defaults)
 */
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_UPLOADS_PATH: &str = "tavern_uploads";
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 60 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub uploads_path: PathBuf,

    /// Hostnames of identity servers allowed to publish. Empty means any issuer.
    pub allowed_issuers: BTreeSet<String>,

    /// Optional cap on a whole request body. Parts are streamed to disk, so
    /// uploads are unbounded unless this is set.
    pub max_body_bytes: Option<usize>,
    pub jwks_cache_ttl: Duration,
    pub token_leeway_seconds: u64,
    pub request_timeout: Duration,

    pub serve_uploads: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = lookup("TAVERN_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr =
            SocketAddr::from_str(addr.trim()).map_err(|_| ConfigError::Invalid("TAVERN_ADDR"))?;

        let uploads_path = lookup("TAVERN_UPLOADS_PATH")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_UPLOADS_PATH.to_string())
            .into();

        let allowed_issuers = lookup("TAVERN_ALLOWED_ISSUERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>();

        let max_body_bytes = lookup("TAVERN_MAX_BODY_BYTES")
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or(ConfigError::Invalid("TAVERN_MAX_BODY_BYTES"))
            })
            .transpose()?;

        let jwks_cache_ttl = Duration::from_secs(parse_or(
            &lookup,
            "TAVERN_JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
        )?);

        let token_leeway_seconds = parse_or(&lookup, "TAVERN_TOKEN_LEEWAY_SECONDS", 0)?;

        let request_timeout = Duration::from_secs(parse_or(
            &lookup,
            "TAVERN_REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?);

        let serve_uploads = match lookup("TAVERN_SERVE_UPLOADS")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(_) => return Err(ConfigError::Invalid("TAVERN_SERVE_UPLOADS")),
        };

        Ok(Self {
            addr,
            uploads_path,
            allowed_issuers,
            max_body_bytes,
            jwks_cache_ttl,
            token_leeway_seconds,
            request_timeout,
            serve_uploads,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        _ => Ok(default),
    }
}
