//! Self-hosted Postgres backend.
//!
//! Rows travel as `jsonb`: reads use `to_jsonb(t)`, writes go through
//! `jsonb_populate_record` so column types are coerced by Postgres itself.
//! Table and column names are checked against an allowlist and an
//! identifier pattern before they are spliced into SQL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};

use super::{DataStore, Direction, Filter, Query, Row, StoreError};
use crate::config::AppConfig;

/// Tables the app is allowed to touch.
pub const TABLES: &[&str] = &[
    "leads",
    "feedbacks",
    "services",
    "featured_work",
    "blog_posts",
    "site_settings",
    "profiles",
];

lazy_static::lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap();
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DbConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            url: config.store_url.clone(),
            max_connections: config.db_max_connections.max(1),
            min_connections: config.db_min_connections,
            connect_timeout_secs: config.store_timeout.as_secs().max(1),
            idle_timeout_secs: config.db_idle_timeout_secs.max(1),
        }
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: DbConfig) -> Result<Self, StoreError> {
        tracing::info!("Initializing database connection pool...");
        tracing::debug!(
            "Database URL: {}",
            config.url.replace(
                |c: char| !c.is_ascii_alphanumeric() && c != ':' && c != '/' && c != '@' && c != '.',
                "*"
            )
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(&config.url)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        tracing::info!("Database connection pool initialized successfully");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        tracing::info!("Running database migrations...");

        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Database migrations completed successfully");
        Ok(())
    }
}

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS leads (
        id TEXT PRIMARY KEY DEFAULT gen_random_uuid()::TEXT,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        business_description TEXT,
        requirements TEXT,
        status TEXT NOT NULL DEFAULT 'new',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feedbacks (
        id TEXT PRIMARY KEY DEFAULT gen_random_uuid()::TEXT,
        name TEXT NOT NULL,
        email TEXT,
        company TEXT,
        role TEXT,
        subject TEXT,
        message TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'unread',
        approved BOOLEAN NOT NULL DEFAULT false,
        image_url TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS services (
        id TEXT PRIMARY KEY DEFAULT gen_random_uuid()::TEXT,
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS featured_work (
        id TEXT PRIMARY KEY DEFAULT gen_random_uuid()::TEXT,
        title TEXT NOT NULL,
        subject TEXT,
        category TEXT NOT NULL,
        image_url TEXT NOT NULL,
        blog_post_url TEXT,
        color TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS blog_posts (
        id TEXT PRIMARY KEY DEFAULT gen_random_uuid()::TEXT,
        title TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        excerpt TEXT,
        content TEXT NOT NULL DEFAULT '',
        cover_image TEXT,
        published BOOLEAN NOT NULL DEFAULT false,
        views BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS site_settings (
        id TEXT PRIMARY KEY DEFAULT gen_random_uuid()::TEXT,
        key TEXT NOT NULL UNIQUE,
        value JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        role TEXT NOT NULL DEFAULT 'user',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_leads_created_at ON leads(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_feedbacks_approved ON feedbacks(approved)",
    "CREATE INDEX IF NOT EXISTS idx_blog_posts_pub_created ON blog_posts(published, created_at DESC)",
];

// ============================================================================
// SQL building
// ============================================================================

fn check_table(table: &str) -> Result<&str, StoreError> {
    if TABLES.contains(&table) {
        Ok(table)
    } else {
        Err(StoreError::InvalidQuery(format!("unknown table '{}'", table)))
    }
}

fn check_column(column: &str) -> Result<&str, StoreError> {
    if IDENTIFIER.is_match(column) {
        Ok(column)
    } else {
        Err(StoreError::InvalidQuery(format!("invalid column '{}'", column)))
    }
}

/// `WHERE` clause over `to_jsonb(t)`; each filter binds a column name and a
/// jsonb value, starting at placeholder `$first`.
fn where_clause(filters: &[Filter], first: usize) -> Result<String, StoreError> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let parts = filters
        .iter()
        .enumerate()
        .map(|(i, f)| {
            check_column(&f.column)?;
            let n = first + i * 2;
            Ok(format!(
                "COALESCE(to_jsonb(t) -> ${}, 'null'::jsonb) = ${}",
                n,
                n + 1
            ))
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

fn select_sql(table: &str, query: &Query) -> Result<String, StoreError> {
    let table = check_table(table)?;
    let mut sql = format!(
        "SELECT to_jsonb(t) FROM {} AS t{}",
        table,
        where_clause(&query.filters, 1)?
    );
    if let Some(order) = &query.order {
        let dir = match order.direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        sql.push_str(&format!(" ORDER BY t.{} {}", check_column(&order.column)?, dir));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    Ok(sql)
}

fn column_list(row: &Row) -> Result<Vec<&str>, StoreError> {
    row.keys().map(|k| check_column(k)).collect()
}

fn insert_sql(table: &str, row: &Row) -> Result<String, StoreError> {
    let table = check_table(table)?;
    let columns = column_list(row)?;
    if columns.is_empty() {
        return Ok(format!(
            "INSERT INTO {} AS t DEFAULT VALUES RETURNING to_jsonb(t)",
            table
        ));
    }
    let list = columns.join(", ");
    Ok(format!(
        "INSERT INTO {table} AS t ({list}) SELECT {list} FROM jsonb_populate_record(NULL::{table}, $1) RETURNING to_jsonb(t)"
    ))
}

fn update_sql(table: &str, filters: &[Filter], patch: &Row) -> Result<String, StoreError> {
    let table = check_table(table)?;
    let columns = column_list(patch)?;
    if columns.is_empty() {
        return Err(StoreError::InvalidQuery("empty update".to_string()));
    }
    if filters.is_empty() {
        return Err(StoreError::InvalidQuery(
            "refusing to update without a filter".to_string(),
        ));
    }
    let assignments = columns
        .iter()
        .map(|c| format!("{c} = r.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "UPDATE {table} AS t SET {assignments} FROM jsonb_populate_record(NULL::{table}, $1) AS r{} RETURNING to_jsonb(t)",
        where_clause(filters, 2)?
    ))
}

fn delete_sql(table: &str, filters: &[Filter]) -> Result<String, StoreError> {
    let table = check_table(table)?;
    if filters.is_empty() {
        return Err(StoreError::InvalidQuery(
            "refusing to delete without a filter".to_string(),
        ));
    }
    Ok(format!(
        "DELETE FROM {} AS t{}",
        table,
        where_clause(filters, 1)?
    ))
}

fn upsert_sql(table: &str, row: &Row, on_conflict: &str) -> Result<String, StoreError> {
    let table = check_table(table)?;
    let on_conflict = check_column(on_conflict)?;
    let columns = column_list(row)?;
    let list = columns.join(", ");
    let updates = columns
        .iter()
        .filter(|c| **c != on_conflict)
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>();
    let action = if updates.is_empty() {
        // Still return the existing row.
        format!("UPDATE SET {on_conflict} = EXCLUDED.{on_conflict}")
    } else {
        format!("UPDATE SET {}", updates.join(", "))
    };
    Ok(format!(
        "INSERT INTO {table} AS t ({list}) SELECT {list} FROM jsonb_populate_record(NULL::{table}, $1) ON CONFLICT ({on_conflict}) DO {action} RETURNING to_jsonb(t)"
    ))
}

fn into_row(value: Value) -> Result<Row, StoreError> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::Decode(format!("expected a row, got {}", other))),
    }
}

type Scalar<'q> =
    sqlx::query::QueryScalar<'q, sqlx::Postgres, Value, sqlx::postgres::PgArguments>;

fn bind_filters<'q>(mut query: Scalar<'q>, filters: &'q [Filter]) -> Scalar<'q> {
    for f in filters {
        query = query.bind(f.column.as_str()).bind(Json(&f.value));
    }
    query
}

#[async_trait]
impl DataStore for PgStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let sql = select_sql(table, query)?;
        let rows = bind_filters(sqlx::query_scalar::<_, Value>(&sql), &query.filters)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|v| into_row(v).map(|row| query.project(row)))
            .collect()
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let sql = insert_sql(table, &row)?;
        let value = sqlx::query_scalar::<_, Value>(&sql)
            .bind(Json(&row))
            .fetch_one(&self.pool)
            .await?;
        into_row(value)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Row,
    ) -> Result<Vec<Row>, StoreError> {
        let sql = update_sql(table, filters, &patch)?;
        let query = sqlx::query_scalar::<_, Value>(&sql).bind(Json(&patch));
        let rows = bind_filters(query, filters).fetch_all(&self.pool).await?;
        rows.into_iter().map(into_row).collect()
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let sql = delete_sql(table, filters)?;
        let mut query = sqlx::query(&sql);
        for f in filters {
            query = query.bind(f.column.as_str()).bind(Json(&f.value));
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, StoreError> {
        let sql = upsert_sql(table, &row, on_conflict)?;
        let value = sqlx::query_scalar::<_, Value>(&sql)
            .bind(Json(&row))
            .fetch_one(&self.pool)
            .await?;
        into_row(value)
    }

    async fn ping(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(start.elapsed())
    }

    fn with_access_token(self: Arc<Self>, _access_token: &str) -> Arc<dyn DataStore> {
        // Authorization is enforced by the session guard in front of this store.
        self
    }
}
