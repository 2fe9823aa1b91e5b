//! Process configuration for the document store.
//!
//! # Responsibility
//! - Collect every environment-driven setting into one value built at startup.
//! - Validate settings before any connection or listener is opened.
//!
//! # Invariants
//! - Configuration is immutable after construction and passed by reference.
//! - URI prefixes always end with `/`.

use crate::logging::{default_log_level, normalize_level};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "RERUM_PREFIX";
pub const ENV_ID_PREFIX: &str = "RERUM_ID_PREFIX";
pub const ENV_CONTEXT: &str = "RERUM_CONTEXT";
pub const ENV_API_VERSION: &str = "RERUM_API_VERSION";
pub const ENV_DB_PATH: &str = "RERUM_DB_PATH";
pub const ENV_AGENT_CLAIM: &str = "RERUM_AGENT_CLAIM";
pub const ENV_USER_HEADER: &str = "RERUM_USER_HEADER";
pub const ENV_BIND: &str = "RERUM_BIND";
pub const ENV_MOUNT: &str = "RERUM_MOUNT";
pub const ENV_QUERY_LIMIT: &str = "RERUM_QUERY_LIMIT";
pub const ENV_LOG_LEVEL: &str = "RERUM_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "RERUM_LOG_DIR";

const DEFAULT_PREFIX: &str = "http://localhost:3001/v1/";
const DEFAULT_ID_PREFIX: &str = "http://localhost:3001/v1/id/";
const DEFAULT_CONTEXT: &str = "http://store.rerum.io/v1/context.json";
const DEFAULT_API_VERSION: &str = "1.0.0";
const DEFAULT_DB_PATH: &str = "rerum.sqlite3";
const DEFAULT_AGENT_CLAIM: &str = "http://store.rerum.io/agent";
const DEFAULT_USER_HEADER: &str = "x-rerum-user";
const DEFAULT_BIND: &str = "127.0.0.1:3001";
const DEFAULT_MOUNT: &str = "/v1";
const DEFAULT_QUERY_LIMIT: u32 = 100;
/// Upper bound applied to any requested query page size.
pub const QUERY_LIMIT_MAX: u32 = 1000;

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

impl ConfigError {
    fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.key, self.message)
    }
}

impl Error for ConfigError {}

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerumConfig {
    /// API base URI used to build discovery links.
    pub api_prefix: String,
    /// Prefix prepended to internal ids to form public `@id`s.
    pub id_prefix: String,
    /// Context URL written into every `__rerum` block.
    pub rerum_context: String,
    pub api_version: String,
    pub db_path: PathBuf,
    /// Key of the agent claim inside the authenticated user object.
    pub agent_claim_key: String,
    /// Header through which the auth gateway forwards user claims.
    pub user_header: String,
    pub bind_addr: SocketAddr,
    /// Path the router is nested under; empty means the root.
    pub mount_path: String,
    pub default_query_limit: u32,
    pub log_level: &'static str,
    /// Rolling log directory; `None` logs to stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for RerumConfig {
    fn default() -> Self {
        Self {
            api_prefix: DEFAULT_PREFIX.to_string(),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            rerum_context: DEFAULT_CONTEXT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            agent_claim_key: DEFAULT_AGENT_CLAIM.to_string(),
            user_header: DEFAULT_USER_HEADER.to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            mount_path: DEFAULT_MOUNT.to_string(),
            default_query_limit: DEFAULT_QUERY_LIMIT,
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl RerumConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    ///
    /// Unset or blank values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_prefix = uri_prefix(ENV_PREFIX, get(ENV_PREFIX), DEFAULT_PREFIX)?;
        let id_prefix = uri_prefix(ENV_ID_PREFIX, get(ENV_ID_PREFIX), DEFAULT_ID_PREFIX)?;
        let rerum_context = get(ENV_CONTEXT).unwrap_or_else(|| DEFAULT_CONTEXT.to_string());
        let api_version =
            get(ENV_API_VERSION).unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        let db_path = PathBuf::from(get(ENV_DB_PATH).unwrap_or_else(|| DEFAULT_DB_PATH.to_string()));
        let agent_claim_key =
            get(ENV_AGENT_CLAIM).unwrap_or_else(|| DEFAULT_AGENT_CLAIM.to_string());

        let user_header = get(ENV_USER_HEADER)
            .unwrap_or_else(|| DEFAULT_USER_HEADER.to_string())
            .to_ascii_lowercase();
        if !user_header
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::new(
                ENV_USER_HEADER,
                format!("`{user_header}` is not a valid header name"),
            ));
        }

        let bind_raw = get(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::new(ENV_BIND, format!("`{bind_raw}`: {err}")))?;

        let mount_path = mount_path(get(ENV_MOUNT))?;

        let default_query_limit = match get(ENV_QUERY_LIMIT) {
            None => DEFAULT_QUERY_LIMIT,
            Some(raw) => match raw.parse::<u32>() {
                Ok(value) if (1..=QUERY_LIMIT_MAX).contains(&value) => value,
                _ => {
                    return Err(ConfigError::new(
                        ENV_QUERY_LIMIT,
                        format!("`{raw}` must be an integer in 1..={QUERY_LIMIT_MAX}"),
                    ))
                }
            },
        };

        let log_level = match get(ENV_LOG_LEVEL) {
            None => default_log_level(),
            Some(raw) => normalize_level(&raw).map_err(|err| ConfigError::new(ENV_LOG_LEVEL, err))?,
        };
        let log_dir = get(ENV_LOG_DIR).map(PathBuf::from);

        Ok(Self {
            api_prefix,
            id_prefix,
            rerum_context,
            api_version,
            db_path,
            agent_claim_key,
            user_header,
            bind_addr,
            mount_path,
            default_query_limit,
            log_level,
            log_dir,
        })
    }
}

fn uri_prefix(key: &'static str, raw: Option<String>, default: &str) -> Result<String, ConfigError> {
    let Some(mut value) = raw else {
        return Ok(default.to_string());
    };
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::new(
            key,
            format!("`{value}` must be an absolute http(s) URI"),
        ));
    }
    if !value.ends_with('/') {
        value.push('/');
    }
    Ok(value)
}

fn mount_path(raw: Option<String>) -> Result<String, ConfigError> {
    let Some(value) = raw else {
        return Ok(DEFAULT_MOUNT.to_string());
    };
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if !trimmed.starts_with('/') {
        return Err(ConfigError::new(
            ENV_MOUNT,
            format!("`{value}` must start with `/`"),
        ));
    }
    Ok(trimmed.to_string())
}
