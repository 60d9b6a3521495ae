//! Hosted backend client.
//!
//! Speaks the three HTTP surfaces of the hosted service: the table API under
//! `/rest/v1`, the auth API under `/auth/v1` and object storage under
//! `/storage/v1`. Every request carries the public API key; requests made on
//! behalf of a signed-in user also carry that user's access token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{
    AuthProvider, AuthUser, DataStore, Direction, Filter, ObjectStorage, Query, Row, Session,
    StoreError,
};
use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub url: String,
    pub api_key: String,
    pub bucket: String,
    pub timeout: Duration,
}

impl RestConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            url: config.store_url.clone(),
            api_key: config.store_api_key.clone(),
            bucket: config.storage_bucket.clone(),
            timeout: config.store_timeout,
        }
    }
}

#[derive(Clone)]
pub struct RestStore {
    client: Client,
    config: Arc<RestConfig>,
    /// Bearer token sent instead of the API key when acting for a user.
    access_token: Option<String>,
}

/// Error body shape returned by the table and auth APIs.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "msg", alias = "error_description")]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

impl RestStore {
    pub fn new(config: RestConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(StoreError::from)?;

        Ok(Self {
            client,
            config: Arc::new(config),
            access_token: None,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url, path)
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.config.url,
            self.config.bucket,
            path.trim_start_matches('/')
        )
    }

    fn bearer(&self) -> &str {
        self.access_token
            .as_deref()
            .unwrap_or(self.config.api_key.as_str())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.bearer())
    }

    async fn rows(response: Response) -> Result<Vec<Row>, StoreError> {
        let response = check(response).await?;
        let value: Value = response.json().await?;
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(StoreError::Decode(format!("expected a row, got {}", other))),
                })
                .collect(),
            Value::Object(row) => Ok(vec![row]),
            other => Err(StoreError::Decode(format!("expected rows, got {}", other))),
        }
    }

    async fn single_row(response: Response) -> Result<Row, StoreError> {
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("store returned no row".to_string()))
    }
}

/// Turn a non-success response into a `StoreError`, keeping the store's message.
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: Option<ErrorBody> = serde_json::from_str(&text).ok();

    if let Some(body) = &body {
        if body.code.as_deref() == Some("23505") {
            let column = body
                .details
                .as_deref()
                .and_then(unique_column_from_details)
                .unwrap_or("key")
                .to_string();
            return Err(StoreError::UniqueViolation(column));
        }
    }

    let message = body
        .and_then(|b| b.message)
        .unwrap_or_else(|| if text.is_empty() { status.to_string() } else { text });

    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Pull `slug` out of `Key (slug)=(hello-world) already exists.`
fn unique_column_from_details(details: &str) -> Option<&str> {
    let start = details.find("Key (")? + "Key (".len();
    let end = details[start..].find(')')? + start;
    Some(&details[start..end])
}

/// Encode a filter value for the table API's `column=eq.value` syntax.
fn filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| {
            let op = if f.value.is_null() { "is" } else { "eq" };
            (f.column.clone(), format!("{}.{}", op, filter_value(&f.value)))
        })
        .collect()
}

fn select_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![(
        "select".to_string(),
        query
            .columns
            .as_ref()
            .map(|c| c.join(","))
            .unwrap_or_else(|| "*".to_string()),
    )];
    params.extend(filter_params(&query.filters));
    if let Some(order) = &query.order {
        let dir = match order.direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

#[async_trait]
impl DataStore for RestStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&select_params(query));
        Self::rows(self.authorized(request).send().await?).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&Value::Array(vec![Value::Object(row)]));
        Self::single_row(self.authorized(request).send().await?).await
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Row,
    ) -> Result<Vec<Row>, StoreError> {
        if filters.is_empty() {
            return Err(StoreError::InvalidQuery(
                "refusing to update without a filter".to_string(),
            ));
        }
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        Self::rows(self.authorized(request).send().await?).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        if filters.is_empty() {
            return Err(StoreError::InvalidQuery(
                "refusing to delete without a filter".to_string(),
            ));
        }
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation");
        let removed = Self::rows(self.authorized(request).send().await?).await?;
        Ok(removed.len() as u64)
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, StoreError> {
        let request = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&Value::Array(vec![Value::Object(row)]));
        Self::single_row(self.authorized(request).send().await?).await
    }

    async fn ping(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        let request = self.client.get(self.auth_url("health"));
        check(self.authorized(request).send().await?).await?;
        Ok(start.elapsed())
    }

    fn with_access_token(self: Arc<Self>, access_token: &str) -> Arc<dyn DataStore> {
        Arc::new(RestStore {
            client: self.client.clone(),
            config: self.config.clone(),
            access_token: Some(access_token.to_string()),
        })
    }
}

#[async_trait]
impl AuthProvider for RestStore {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, StoreError> {
        let response = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.config.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            tracing::debug!(status = %response.status(), "Password sign-in rejected");
            return Err(StoreError::InvalidCredentials);
        }

        let token: TokenResponse = check(response).await?.json().await?;
        let expires_at = token.expires_at.or_else(|| {
            token
                .expires_in
                .map(|secs| chrono::Utc::now().timestamp() + secs)
        });

        Ok(Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.config.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        // An already-invalid token is as signed out as it gets.
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, StoreError> {
        let response = self
            .client
            .get(self.auth_url("user"))
            .header("apikey", &self.config.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }

        let user: AuthUser = check(response).await?.json().await?;
        Ok(Some(Session {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
            user,
        }))
    }
}

#[async_trait]
impl ObjectStorage for RestStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let request = self
            .client
            .post(self.object_url(path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        check(self.authorized(request).send().await?).await?;
        Ok(path.trim_start_matches('/').to_string())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url,
            self.config.bucket,
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Order;
    use serde_json::json;

    fn store() -> RestStore {
        store_at("https://project.example.co")
    }

    fn store_at(url: &str) -> RestStore {
        RestStore::new(RestConfig {
            url: url.to_string(),
            api_key: "anon-key".to_string(),
            bucket: "testimonial-images".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn select_params_cover_projection_filter_order_and_limit() {
        let query = Query::new()
            .select(&["role"])
            .eq("id", "u1")
            .eq("approved", true)
            .order(Order::descending("created_at"))
            .limit(3);
        let params = select_params(&query);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "role".to_string()),
                ("id".to_string(), "eq.u1".to_string()),
                ("approved".to_string(), "eq.true".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn select_defaults_to_all_columns() {
        let params = select_params(&Query::new());
        assert_eq!(params, vec![("select".to_string(), "*".to_string())]);
    }

    #[test]
    fn null_filters_use_is_operator() {
        let params = filter_params(&[Filter::eq("image_url", Value::Null)]);
        assert_eq!(params[0].1, "is.null");
    }

    #[test]
    fn numbers_are_encoded_without_quotes() {
        assert_eq!(filter_value(&json!(42)), "42");
        assert_eq!(filter_value(&json!("hello-world")), "hello-world");
    }

    #[test]
    fn unique_column_is_read_from_details() {
        assert_eq!(
            unique_column_from_details("Key (slug)=(hello-world) already exists."),
            Some("slug")
        );
        assert_eq!(unique_column_from_details("something else"), None);
    }

    #[test]
    fn urls_are_built_from_base() {
        let s = store();
        assert_eq!(s.table_url("leads"), "https://project.example.co/rest/v1/leads");
        assert_eq!(
            s.auth_url("token"),
            "https://project.example.co/auth/v1/token"
        );
        assert_eq!(
            s.public_url("/blog-abc.png"),
            "https://project.example.co/storage/v1/object/public/testimonial-images/blog-abc.png"
        );
    }

    #[test]
    fn access_token_replaces_api_key_as_bearer() {
        let base = Arc::new(store());
        assert_eq!(base.bearer(), "anon-key");
        let scoped = RestStore {
            client: base.client.clone(),
            config: base.config.clone(),
            access_token: Some("user-jwt".to_string()),
        };
        assert_eq!(scoped.bearer(), "user-jwt");
    }

    fn response(status: u16, body: &str) -> Response {
        let raw = axum::http::Response::builder()
            .status(status)
            .body(body.to_string())
            .unwrap();
        Response::from(raw)
    }

    #[tokio::test]
    async fn duplicate_key_becomes_unique_violation() {
        let body = json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"blog_posts_slug_key\"",
            "details": "Key (slug)=(hello-world) already exists."
        });
        match check(response(409, &body.to_string())).await {
            Err(StoreError::UniqueViolation(column)) => assert_eq!(column, "slug"),
            other => panic!("expected unique violation, got {:?}", other.map(|r| r.status())),
        }
    }

    #[tokio::test]
    async fn other_rejections_keep_status_and_message() {
        let body = json!({ "code": "PGRST204", "message": "Could not find the 'nope' column" });
        match check(response(400, &body.to_string())).await {
            Err(StoreError::Rejected { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("'nope'"));
            }
            other => panic!("expected rejection, got {:?}", other.map(|r| r.status())),
        }

        match check(response(500, "")).await {
            Err(StoreError::Rejected { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "500 Internal Server Error");
            }
            other => panic!("expected rejection, got {:?}", other.map(|r| r.status())),
        }

        assert!(check(response(200, "[]")).await.is_ok());
    }

    /// Local auth endpoint answering `/auth/v1/user` with a fixed status.
    async fn auth_server(status: StatusCode) -> String {
        let app = axum::Router::new().route(
            "/auth/v1/user",
            axum::routing::get(move || async move {
                let body = if status.is_success() {
                    json!({ "id": "user-1", "email": "admin@agency.test" })
                } else {
                    json!({ "msg": "invalid JWT" })
                };
                (status, axum::Json(body))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn expired_token_resolves_to_no_session() {
        let s = store_at(&auth_server(StatusCode::UNAUTHORIZED).await);
        assert!(s.get_session("expired-jwt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn live_token_resolves_to_session() {
        let s = store_at(&auth_server(StatusCode::OK).await);
        let session = s.get_session("live-jwt").await.unwrap().unwrap();
        assert_eq!(session.access_token, "live-jwt");
        assert_eq!(session.user.id, "user-1");
        assert_eq!(session.user.email.as_deref(), Some("admin@agency.test"));
    }

    #[tokio::test]
    async fn auth_outage_is_an_error_not_a_missing_session() {
        let s = store_at(&auth_server(StatusCode::SERVICE_UNAVAILABLE).await);
        assert!(s.get_session("any-jwt").await.is_err());
    }
}
