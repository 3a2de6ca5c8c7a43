use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::idempotency::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};

/// Application-level constants
pub const APP_NAME: &str = "AtpWorkflow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8088";
pub const DATABASE_FILE: &str = "atp.db";

/// Get the application data directory: ~/AtpWorkflow/
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn default_db_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "atp_workflow=info"
}

/// Runtime settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub idempotency_ttl: Duration,
    pub idempotency_sweep_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8088)),
            db_path: default_db_path(),
            idempotency_ttl: DEFAULT_TTL,
            idempotency_sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl Settings {
    /// Read `ATP_BIND_ADDR`, `ATP_DB_PATH`, `IDEMPOTENCY_TTL_MS` and
    /// `IDEMPOTENCY_SWEEP_SECS`. Unset or malformed values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let bind_addr = parse_or(&lookup, "ATP_BIND_ADDR", defaults.bind_addr);
        let db_path = lookup("ATP_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let idempotency_ttl = Some(parse_or(&lookup, "IDEMPOTENCY_TTL_MS", 0u64))
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.idempotency_ttl);
        let idempotency_sweep_interval = Some(parse_or(&lookup, "IDEMPOTENCY_SWEEP_SECS", 0u64))
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.idempotency_sweep_interval);

        Self {
            bind_addr,
            db_path,
            idempotency_ttl,
            idempotency_sweep_interval,
        }
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    match lookup(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(variable = name, value = %raw, "Ignoring malformed setting");
                default
            }
        },
        None => default,
    }
}
