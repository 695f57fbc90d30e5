//! Application configuration

use std::env;
use std::ffi::OsString;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const MODULE_PATH: &str = "EDGE_DISPATCH_MODULE_PATH";
const BIND_ADDR: &str = "EDGE_DISPATCH_BIND_ADDR";
const HANDLER_TIMEOUT_SECS: &str = "EDGE_DISPATCH_HANDLER_TIMEOUT_SECS";
const MAX_BODY_BYTES: &str = "EDGE_DISPATCH_MAX_BODY_BYTES";
const PRELOAD: &str = "EDGE_DISPATCH_PRELOAD";

const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8080));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("A required environment variable isn't set: {0}")]
    EnvVarMissing(&'static str),

    #[error("A required environment variable isn't valid utf-8: {0}")]
    EnvVarInvalidUtf8(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Compiled handler module, read once at startup
    pub module_path: PathBuf,

    /// Address the gateway listens on
    pub bind_addr: SocketAddr,

    /// Per-request timeout in seconds
    pub handler_timeout_secs: u64,

    /// Largest request body forwarded to the module
    pub max_body_bytes: usize,

    /// Activate the module at startup instead of on the first request
    pub preload: bool,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var_os(key))
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let var = |key: &'static str| -> Result<Option<String>, ConfigError> {
            match lookup(key) {
                Some(value) => value
                    .into_string()
                    .map(Some)
                    .map_err(|_| ConfigError::EnvVarInvalidUtf8(key)),
                None => Ok(None),
            }
        };

        let module_path = var(MODULE_PATH)?
            .map(PathBuf::from)
            .ok_or(ConfigError::EnvVarMissing(MODULE_PATH))?;

        Ok(Self {
            module_path,
            bind_addr: parse_or(BIND_ADDR, var(BIND_ADDR)?, DEFAULT_BIND_ADDR)?,
            handler_timeout_secs: parse_or(HANDLER_TIMEOUT_SECS, var(HANDLER_TIMEOUT_SECS)?, 30)?,
            max_body_bytes: parse_or(MAX_BODY_BYTES, var(MAX_BODY_BYTES)?, 1024 * 1024)?,
            preload: parse_or(PRELOAD, var(PRELOAD)?, false)?,
        })
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

fn parse_or<T: FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}
