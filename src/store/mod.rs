//! Remote store contracts.
//!
//! The app never talks to a database directly from its handlers. Every
//! backend it can run against implements the same three collaborator
//! traits: table access ([`DataStore`]), password sessions
//! ([`AuthProvider`]) and object uploads ([`ObjectStorage`]).

pub mod disk;
pub mod local_auth;
pub mod memory;
pub mod postgres;
pub mod rest;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{AppConfig, StoreKind};

/// One table row as exchanged with the store: column name to JSON value.
pub type Row = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),

    #[error("store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected store response: {0}")]
    Decode(String),

    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("duplicate value for unique column {0}")]
    UniqueViolation(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("key").to_string();
                return StoreError::UniqueViolation(constraint);
            }
            return StoreError::Rejected {
                status: 400,
                message: db_err.message().to_string(),
            };
        }
        StoreError::Transport(err.to_string())
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

impl Order {
    pub fn ascending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: Direction::Ascending,
        }
    }

    pub fn descending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: Direction::Descending,
        }
    }
}

/// Column equality filter. The only filter shape the repositories need.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column).unwrap_or(&Value::Null) == &self.value
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Column projection; `None` selects whole rows.
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply the column projection to a full row.
    pub fn project(&self, row: Row) -> Row {
        match &self.columns {
            Some(columns) => row
                .into_iter()
                .filter(|(k, _)| columns.iter().any(|c| c == k))
                .collect(),
            None => row,
        }
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Table-level access to the remote relational store.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Insert one row and return it as stored, including assigned `id`/`created_at`.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;

    /// Apply `patch` to every row matching `filters`; returns the updated rows.
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Row,
    ) -> Result<Vec<Row>, StoreError>;

    /// Hard-delete every row matching `filters`; returns how many were removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError>;

    /// Insert, or merge into the row whose `on_conflict` column matches.
    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, StoreError>;

    /// Round-trip latency check.
    async fn ping(&self) -> Result<Duration, StoreError>;

    /// A handle that issues requests on behalf of the given session, so the
    /// store's own row-level policies apply to them.
    fn with_access_token(self: Arc<Self>, access_token: &str) -> Arc<dyn DataStore>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, StoreError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), StoreError>;

    /// Resolve a live session for the token. `Ok(None)` means no session.
    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, StoreError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path`; returns the stored path.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError>;

    fn public_url(&self, path: &str) -> String;
}

// ============================================================================
// Backend wiring
// ============================================================================

/// The three collaborators the app runs against.
#[derive(Clone)]
pub struct Backend {
    pub data: Arc<dyn DataStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backend {
    pub async fn connect(config: &AppConfig) -> Result<Self, StoreError> {
        match config.store_kind {
            StoreKind::Hosted => {
                let client = Arc::new(rest::RestStore::new(rest::RestConfig::from_app(config))?);
                tracing::info!(url = %config.store_url, "Using hosted store");
                Ok(Self {
                    data: client.clone(),
                    auth: client.clone(),
                    storage: client,
                })
            }
            StoreKind::Postgres => {
                let store = postgres::PgStore::connect(postgres::DbConfig::from_app(config)).await?;
                store.run_migrations().await?;
                let data: Arc<dyn DataStore> = Arc::new(store);
                let auth = local_auth::LocalAuth::from_app(config, data.clone()).await?;
                Ok(Self {
                    data,
                    auth: Arc::new(auth),
                    storage: Arc::new(disk::DiskStorage::new(config.upload_dir.clone(), "/uploads")),
                })
            }
            StoreKind::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                let store = Arc::new(memory::MemoryStore::new());
                let data: Arc<dyn DataStore> = store.clone();
                let auth = local_auth::LocalAuth::from_app(config, data.clone()).await?;
                Ok(Self {
                    data,
                    auth: Arc::new(auth),
                    storage: Arc::new(disk::DiskStorage::new(config.upload_dir.clone(), "/uploads")),
                })
            }
        }
    }
}
