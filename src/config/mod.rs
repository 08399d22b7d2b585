//! Configuration module for the Nomina backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key guarding the local API (disabled when unset)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Delay between two invoice status checks
    pub poll_interval: Duration,
    /// Status checks performed before an invoice is reported as expired
    pub poll_max_attempts: u32,
    /// Timeout applied to every wallet API request
    pub wallet_timeout: Duration,
}

/// A configuration variable that is present but malformed.
#[derive(Debug)]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid {} value: {:?}", self.variable, self.value)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("NOMINA_API_PSK").ok().filter(|s| !s.is_empty());

        let db_path = env::var("NOMINA_DB_PATH")
            .unwrap_or_else(|_| "./data/nomina.sqlite".to_string())
            .into();

        let bind_addr = parse_var("NOMINA_BIND_ADDR", "127.0.0.1:8080")?;

        let log_level = env::var("NOMINA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let poll_interval = Duration::from_secs(parse_var("NOMINA_POLL_INTERVAL_SECS", "10")?);
        let poll_max_attempts = parse_var("NOMINA_POLL_MAX_ATTEMPTS", "60")?;
        let wallet_timeout = Duration::from_secs(parse_var("NOMINA_WALLET_TIMEOUT_SECS", "30")?);

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            poll_interval,
            poll_max_attempts,
            wallet_timeout,
        })
    }
}

fn parse_var<T: FromStr>(variable: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(variable).unwrap_or_else(|_| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError { variable, value })
}
