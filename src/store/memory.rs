//! Process-local store.
//!
//! Behaves like the hosted tables closely enough to run the whole app
//! against it: ids and `created_at` are assigned on insert, unique columns
//! are enforced, and ordering ties fall back to insertion order. Reads and
//! writes can be made to fail on demand.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DataStore, Direction, Filter, ObjectStorage, Query, Row, StoreError};

/// Columns that must be unique per table, mirroring the Postgres schema.
const UNIQUE_COLUMNS: &[(&str, &str)] = &[
    ("blog_posts", "slug"),
    ("site_settings", "key"),
];

#[derive(Debug, Clone)]
struct StoredRow {
    seq: u64,
    row: Row,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<StoredRow>>>,
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
    next_seq: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent select fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, AtomicOrdering::SeqCst);
    }

    /// Make every subsequent insert/update/delete/upsert fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    pub async fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(path)
            .map(|(bytes, _)| bytes.clone())
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Transport("memory store unavailable".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Rejected {
                status: 503,
                message: "memory store rejected write".to_string(),
            });
        }
        Ok(())
    }

    fn seq(&self) -> u64 {
        self.next_seq.fetch_add(1, AtomicOrdering::SeqCst)
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Reject `candidate` if it repeats a unique column value held by another row.
fn check_unique(
    table: &str,
    rows: &[StoredRow],
    candidate: &Row,
    skip_seq: Option<u64>,
) -> Result<(), StoreError> {
    for (unique_table, column) in UNIQUE_COLUMNS.iter().chain([(table, "id")].iter()) {
        if *unique_table != table {
            continue;
        }
        let value = match candidate.get(*column) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        let clash = rows
            .iter()
            .filter(|stored| Some(stored.seq) != skip_seq)
            .any(|stored| stored.row.get(*column) == Some(value));
        if clash {
            return Err(StoreError::UniqueViolation(column.to_string()));
        }
    }
    Ok(())
}

/// Total order over JSON values: null < bool < number < string < other.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.check_reads()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<&StoredRow> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|s| matches_all(&s.row, &query.filters)).collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.row.get(&order.column), b.row.get(&order.column))
                    .then(a.seq.cmp(&b.seq));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|s| query.project(s.row.clone()))
            .collect())
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, StoreError> {
        self.check_writes()?;
        row.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        row.entry("created_at")
            .or_insert_with(|| Value::String(now_timestamp()));

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        check_unique(table, rows, &row, None)?;
        rows.push(StoredRow {
            seq: self.seq(),
            row: row.clone(),
        });
        tracing::debug!(table = %table, "Inserted row into memory store");
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Row,
    ) -> Result<Vec<Row>, StoreError> {
        self.check_writes()?;
        if filters.is_empty() {
            return Err(StoreError::InvalidQuery(
                "refusing to update without a filter".to_string(),
            ));
        }

        let mut tables = self.tables.write().await;
        let rows = match tables.get_mut(table) {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };

        // Validate every candidate before mutating anything.
        let mut staged = Vec::new();
        for stored in rows.iter().filter(|s| matches_all(&s.row, filters)) {
            let mut next = stored.row.clone();
            for (k, v) in &patch {
                next.insert(k.clone(), v.clone());
            }
            check_unique(table, rows, &next, Some(stored.seq))?;
            staged.push((stored.seq, next));
        }

        let mut updated = Vec::with_capacity(staged.len());
        for (seq, next) in staged {
            if let Some(stored) = rows.iter_mut().find(|s| s.seq == seq) {
                stored.row = next.clone();
                updated.push(next);
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        self.check_writes()?;
        if filters.is_empty() {
            return Err(StoreError::InvalidQuery(
                "refusing to delete without a filter".to_string(),
            ));
        }

        let mut tables = self.tables.write().await;
        let rows = match tables.get_mut(table) {
            Some(rows) => rows,
            None => return Ok(0),
        };
        let before = rows.len();
        rows.retain(|s| !matches_all(&s.row, filters));
        Ok((before - rows.len()) as u64)
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, StoreError> {
        self.check_writes()?;
        let key = row
            .get(on_conflict)
            .cloned()
            .ok_or_else(|| StoreError::InvalidQuery(format!("upsert row lacks {}", on_conflict)))?;

        let existing = {
            let tables = self.tables.read().await;
            tables
                .get(table)
                .map(|rows| rows.iter().any(|s| s.row.get(on_conflict) == Some(&key)))
                .unwrap_or(false)
        };

        if existing {
            let updated = self
                .update(table, &[Filter::eq(on_conflict, key)], row)
                .await?;
            updated
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::Decode("upserted row vanished".to_string()))
        } else {
            self.insert(table, row).await
        }
    }

    async fn ping(&self) -> Result<Duration, StoreError> {
        self.check_reads()?;
        Ok(Duration::ZERO)
    }

    fn with_access_token(self: Arc<Self>, _access_token: &str) -> Arc<dyn DataStore> {
        self
    }
}

#[async_trait]
impl ObjectStorage for MemoryStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        self.check_writes()?;
        let path = path.trim_start_matches('/').to_string();
        self.objects
            .write()
            .await
            .insert(path.clone(), (bytes, content_type.to_string()));
        Ok(path)
    }

    fn public_url(&self, path: &str) -> String {
        format!("/uploads/{}", path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Order;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_id_and_created_at() {
        let store = MemoryStore::new();
        let inserted = store
            .insert("services", row(json!({ "name": "Web" })))
            .await
            .unwrap();
        assert!(inserted.get("id").and_then(Value::as_str).is_some());
        assert!(inserted.get("created_at").and_then(Value::as_str).is_some());
        assert_eq!(store.row_count("services").await, 1);
    }

    #[tokio::test]
    async fn descending_order_puts_latest_insert_first_on_ties() {
        let store = MemoryStore::new();
        for name in ["a", "b", "c"] {
            store
                .insert(
                    "services",
                    row(json!({ "name": name, "created_at": "2025-01-01T00:00:00Z" })),
                )
                .await
                .unwrap();
        }
        let rows = store
            .select("services", &Query::new().order(Order::descending("created_at")))
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn ascending_order_sorts_by_value() {
        let store = MemoryStore::new();
        for name in ["Mobile", "Branding", "Web"] {
            store
                .insert("services", row(json!({ "name": name })))
                .await
                .unwrap();
        }
        let rows = store
            .select(
                "services",
                &Query::new().order(Order::ascending("name")).limit(2),
            )
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Branding", "Mobile"]);
    }

    #[tokio::test]
    async fn unique_columns_are_enforced_on_insert_and_update() {
        let store = MemoryStore::new();
        store
            .insert("blog_posts", row(json!({ "slug": "one" })))
            .await
            .unwrap();
        let second = store
            .insert("blog_posts", row(json!({ "slug": "two" })))
            .await
            .unwrap();

        let err = store
            .insert("blog_posts", row(json!({ "slug": "one" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(c) if c == "slug"));

        let err = store
            .update(
                "blog_posts",
                &[Filter::eq("id", second["id"].clone())],
                row(json!({ "slug": "one" })),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn update_returns_only_matching_rows() {
        let store = MemoryStore::new();
        let lead = store
            .insert("leads", row(json!({ "name": "A", "status": "new" })))
            .await
            .unwrap();
        store
            .insert("leads", row(json!({ "name": "B", "status": "new" })))
            .await
            .unwrap();

        let updated = store
            .update(
                "leads",
                &[Filter::eq("id", lead["id"].clone())],
                row(json!({ "status": "contacted" })),
            )
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["status"], "contacted");

        let still_new = store
            .select("leads", &Query::new().eq("status", "new"))
            .await
            .unwrap();
        assert_eq!(still_new.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_matching_rows() {
        let store = MemoryStore::new();
        let a = store
            .insert("services", row(json!({ "name": "A" })))
            .await
            .unwrap();
        let removed = store
            .delete("services", &[Filter::eq("id", a["id"].clone())])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.row_count("services").await, 0);
    }

    #[tokio::test]
    async fn upsert_inserts_then_merges() {
        let store = MemoryStore::new();
        store
            .upsert(
                "site_settings",
                row(json!({ "key": "project_availability", "value": { "is_available": true } })),
                "key",
            )
            .await
            .unwrap();
        let merged = store
            .upsert(
                "site_settings",
                row(json!({ "key": "project_availability", "value": { "is_available": false } })),
                "key",
            )
            .await
            .unwrap();
        assert_eq!(merged["value"], json!({ "is_available": false }));
        assert_eq!(store.row_count("site_settings").await, 1);
    }

    #[tokio::test]
    async fn failure_switches_reject_operations() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store
            .insert("services", row(json!({ "name": "A" })))
            .await
            .is_err());
        store.set_fail_writes(false);
        store.set_fail_reads(true);
        assert!(store.select("services", &Query::new()).await.is_err());
        assert!(store.ping().await.is_err());
    }

    #[tokio::test]
    async fn uploads_are_kept_under_their_path() {
        let store = MemoryStore::new();
        let path = store
            .upload("/blog-x.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(path, "blog-x.png");
        assert_eq!(store.object("blog-x.png").await, Some(vec![1, 2, 3]));
        assert_eq!(store.public_url(&path), "/uploads/blog-x.png");
    }

    #[test]
    fn value_ordering_is_total() {
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
    }
}
