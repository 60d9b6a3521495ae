//! Per-table repositories.
//!
//! One [`Repository`] per entity, each call a single round trip to the
//! store with a timeout and no retries. Required fields are checked before
//! anything is sent.

pub mod models;
pub mod optimistic;
pub mod slug;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{DataError, Result};
use crate::store::{DataStore, Filter, Order, Query, Row, StoreError};
use models::{
    AvailabilityValue, BlogPost, Feedback, FeedbackStatus, Lead, LeadStatus, LeadStatusUpdate,
    Profile, SiteSetting, Testimonial, AVAILABILITY_KEY,
};

/// A table the app reads and writes.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
    /// Human-readable name used in error messages.
    const LABEL: &'static str;
    /// Columns that must not repeat across rows; checked before writes.
    const UNIQUE: &'static [&'static str] = &[];

    type New: Send;
    type Patch: Send;

    fn default_order() -> Order {
        Order::descending("created_at")
    }

    /// Validate a create payload and turn it into the row to insert.
    fn prepare_new(new: Self::New) -> Result<Row>;

    /// Validate a partial update. Only supplied fields are written.
    fn prepare_patch(patch: Self::Patch) -> Result<Row>;
}

/// Trimmed value of a required text field.
pub fn require(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DataError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(DataError::Remote(format!("expected an object, got {}", other))),
    }
}

fn from_row<E: Entity>(row: Row) -> Result<E> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Column-equality filters for [`Repository::list`]; rows come back in the
/// entity's default order.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filters: Vec<Filter>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }
}

pub struct Repository<E> {
    store: Arc<dyn DataStore>,
    timeout: Duration,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn DataStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            _entity: PhantomData,
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = std::result::Result<T, StoreError>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                tracing::error!(table = E::TABLE, "Store call failed: {}", e);
                DataError::from(e)
            }),
            Err(_) => {
                tracing::error!(table = E::TABLE, timeout = ?self.timeout, "Store call timed out");
                Err(DataError::Remote("The data store did not respond in time".to_string()))
            }
        }
    }

    pub async fn list(&self, options: ListOptions) -> Result<Vec<E>> {
        let query = Query {
            columns: None,
            filters: options.filters,
            order: Some(E::default_order()),
            limit: None,
        };
        let rows = self.call(self.store.select(E::TABLE, &query)).await?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn get(&self, id: &str) -> Result<E> {
        self.find_by("id", id).await
    }

    pub async fn find_by(&self, column: &str, value: impl Into<Value>) -> Result<E> {
        self.find_one(Query::new().eq(column, value).limit(1))
            .await?
            .ok_or_else(|| DataError::not_found(E::LABEL))
    }

    async fn find_one(&self, query: Query) -> Result<Option<E>> {
        let rows = self.call(self.store.select(E::TABLE, &query)).await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    /// Reject values of unique columns already held by a row other than `own_id`.
    async fn check_unique(&self, row: &Row, own_id: Option<&str>) -> Result<()> {
        for column in E::UNIQUE {
            let Some(value) = row.get(*column).filter(|v| !v.is_null()) else {
                continue;
            };
            let query = Query::new()
                .select(&["id"])
                .eq(column, value.clone())
                .limit(2);
            let holders = self.call(self.store.select(E::TABLE, &query)).await?;
            let taken = holders
                .iter()
                .any(|holder| holder.get("id").and_then(Value::as_str) != own_id);
            if taken {
                return Err(DataError::validation(format!(
                    "A {} with this {} already exists",
                    E::LABEL.to_lowercase(),
                    column
                )));
            }
        }
        Ok(())
    }

    pub async fn create(&self, new: E::New) -> Result<E> {
        let row = E::prepare_new(new)?;
        self.check_unique(&row, None).await?;
        let created = self.call(self.store.insert(E::TABLE, row)).await?;
        let entity = from_row(created)?;
        tracing::info!(table = E::TABLE, "Row created");
        Ok(entity)
    }

    /// Last writer wins; there is no version check.
    pub async fn update(&self, id: &str, patch: E::Patch) -> Result<E> {
        let row = E::prepare_patch(patch)?;
        self.update_row(id, row).await
    }

    async fn update_row(&self, id: &str, mut row: Row) -> Result<E> {
        row.remove("id");
        if row.is_empty() {
            return Err(DataError::validation("No fields to update"));
        }
        self.check_unique(&row, Some(id)).await?;
        let updated = self
            .call(self.store.update(E::TABLE, &[Filter::eq("id", id)], row))
            .await?;
        match updated.into_iter().next() {
            Some(row) => from_row(row),
            None => Err(DataError::not_found(E::LABEL)),
        }
    }

    /// Irreversible.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = self
            .call(self.store.delete(E::TABLE, &[Filter::eq("id", id)]))
            .await?;
        if removed == 0 {
            return Err(DataError::not_found(E::LABEL));
        }
        tracing::info!(table = E::TABLE, id = %id, "Row deleted");
        Ok(())
    }

    /// Write the negation of the caller-held `current` value.
    pub async fn toggle_boolean(&self, id: &str, field: &str, current: bool) -> Result<E> {
        let mut row = Row::new();
        row.insert(field.to_string(), Value::Bool(!current));
        self.update_row(id, row).await
    }
}

impl Repository<Lead> {
    pub async fn set_status(&self, id: &str, status: LeadStatus) -> Result<Lead> {
        self.update(id, LeadStatusUpdate { status }).await
    }
}

impl Repository<Feedback> {
    /// Public testimonials, projected to their public columns.
    pub async fn list_approved(&self) -> Result<Vec<Testimonial>> {
        let query = Query::new()
            .select(Testimonial::COLUMNS)
            .eq("approved", true)
            .order(Feedback::default_order());
        let rows = self.call(self.store.select(Feedback::TABLE, &query)).await?;
        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<Testimonial>(Value::Object(row)).map_err(DataError::from)
            })
            .collect()
    }

    pub async fn toggle_read(&self, id: &str, current: FeedbackStatus) -> Result<Feedback> {
        let mut row = Row::new();
        row.insert("status".into(), json!(current.flipped()));
        self.update_row(id, row).await
    }
}

impl Repository<BlogPost> {
    pub async fn list_published(&self) -> Result<Vec<BlogPost>> {
        self.list(ListOptions::new().eq("published", true)).await
    }

    /// Drafts are indistinguishable from missing posts.
    pub async fn find_published(&self, slug: &str) -> Result<BlogPost> {
        self.find_one(Query::new().eq("slug", slug).eq("published", true).limit(1))
            .await?
            .ok_or_else(|| DataError::not_found(BlogPost::LABEL))
    }

    /// Read-then-write increment. Failures are logged and otherwise ignored.
    pub async fn record_view(&self, post: &BlogPost) {
        let mut row = Row::new();
        row.insert("views".into(), json!(post.views + 1));
        let result = self
            .call(self.store.update(BlogPost::TABLE, &[Filter::eq("id", post.id.as_str())], row))
            .await;
        if let Err(e) = result {
            tracing::warn!(slug = %post.slug, "Failed to record view: {}", e);
        }
    }
}

impl Repository<SiteSetting> {
    /// Stored availability, or `true` when the setting has never been written
    /// or cannot be read.
    pub async fn availability(&self) -> bool {
        let query = Query::new()
            .select(&["value"])
            .eq("key", AVAILABILITY_KEY)
            .limit(1);
        match self.call(self.store.select(SiteSetting::TABLE, &query)).await {
            Ok(rows) => rows
                .into_iter()
                .next()
                .and_then(|mut row| row.remove("value"))
                .and_then(|value| serde_json::from_value::<AvailabilityValue>(value).ok())
                .map(|v| v.is_available)
                .unwrap_or(true),
            Err(e) => {
                tracing::warn!("Failed to read availability, assuming available: {}", e);
                true
            }
        }
    }

    pub async fn set_availability(&self, is_available: bool) -> Result<bool> {
        let mut row = Row::new();
        row.insert("key".into(), json!(AVAILABILITY_KEY));
        row.insert("value".into(), json!(AvailabilityValue { is_available }));
        self.call(self.store.upsert(SiteSetting::TABLE, row, "key"))
            .await?;
        tracing::info!(is_available, "Availability updated");
        Ok(is_available)
    }
}

impl Repository<Profile> {
    /// Role of the account, `None` when it has no profile.
    pub async fn role_of(&self, account_id: &str) -> Result<Option<String>> {
        let query = Query::new().select(&["role"]).eq("id", account_id).limit(1);
        let rows = self.call(self.store.select(Profile::TABLE, &query)).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.get("role").and_then(Value::as_str).map(str::to_string)))
    }
}
