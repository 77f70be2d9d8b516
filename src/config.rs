use std::net::SocketAddr;
use std::path::PathBuf;

/// Shortest accepted token signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: PathBuf,
    pub sweep_interval_secs: u64,
    pub token_secret: String,
    /// Password for the seeded superadmin account. No account is seeded
    /// when unset.
    pub admin_password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = std::env::var("LIBRIS_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("LIBRIS_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let db_path = std::env::var("LIBRIS_DB_PATH")
            .unwrap_or_else(|_| "./libris.redb".to_string())
            .into();

        let sweep_interval_secs = std::env::var("LIBRIS_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::Invalid(
                "LIBRIS_SWEEP_INTERVAL_SECS",
                "must be a positive number of seconds",
            ))?;

        let token_secret = std::env::var("LIBRIS_TOKEN_SECRET")
            .map_err(|_| ConfigError::Missing("LIBRIS_TOKEN_SECRET"))?;
        if token_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid(
                "LIBRIS_TOKEN_SECRET",
                "must be at least 16 bytes",
            ));
        }

        let admin_password = std::env::var("LIBRIS_ADMIN_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty());

        Ok(Config {
            listen_addr,
            db_path,
            sweep_interval_secs,
            token_secret,
            admin_password,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "Missing required environment variable: {}", var),
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
