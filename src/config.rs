//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Which backend `STORE_URL` points at, chosen by URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Hosted backend-as-a-service reached over HTTPS.
    Hosted,
    /// Self-hosted Postgres with local password auth and disk uploads.
    Postgres,
    /// Process-local tables; data is lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_url: String,
    pub store_api_key: String,
    pub store_kind: StoreKind,
    pub store_timeout: Duration,
    pub storage_bucket: String,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_password_hash: Option<String>,
    pub allowed_origins: Vec<String>,
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_idle_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| get(key).and_then(|s| s.trim().parse::<u64>().ok());

        let store_url = get("STORE_URL").ok_or(ConfigError::Missing("STORE_URL"))?;
        let store_api_key = get("STORE_API_KEY").ok_or(ConfigError::Missing("STORE_API_KEY"))?;
        let store_kind = store_kind_for(&store_url)?;

        let port = match get("PORT") {
            Some(p) => p.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                reason: format!("'{}' is not a port number", p),
            })?,
            None => 3001,
        };

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .or_else(|| get("FRONTEND_ORIGIN").map(|o| vec![o]))
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:5173".to_string(),
                    "http://127.0.0.1:5173".to_string(),
                ]
            });

        Ok(Self {
            store_url: store_url.trim_end_matches('/').to_string(),
            store_api_key,
            store_kind,
            store_timeout: Duration::from_secs(parsed("STORE_TIMEOUT_SECS").unwrap_or(10)),
            storage_bucket: get("STORAGE_BUCKET")
                .unwrap_or_else(|| "testimonial-images".to_string()),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            static_dir: get("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("dist")),
            admin_email: get("ADMIN_EMAIL"),
            admin_password: get("ADMIN_PASSWORD"),
            admin_password_hash: get("ADMIN_PASSWORD_HASH"),
            allowed_origins,
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            db_max_connections: parsed("DB_POOL_MAX").unwrap_or(10) as u32,
            db_min_connections: parsed("DB_POOL_MIN").unwrap_or(2) as u32,
            db_idle_timeout_secs: parsed("DB_IDLE_TIMEOUT").unwrap_or(300),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "HOST",
                reason: e.to_string(),
            })
    }
}

fn store_kind_for(url: &str) -> Result<StoreKind, ConfigError> {
    let scheme = url.split("://").next().unwrap_or_default().to_lowercase();
    match scheme.as_str() {
        "http" | "https" => Ok(StoreKind::Hosted),
        "postgres" | "postgresql" => Ok(StoreKind::Postgres),
        "memory" => Ok(StoreKind::Memory),
        _ => Err(ConfigError::Invalid {
            name: "STORE_URL",
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}
