/**
 * Routes Module
 * JSON API handlers and the response shapes they share
 */
pub mod auth;
pub mod blog;
pub mod feedback;
pub mod featured_work;
pub mod health;
pub mod leads;
pub mod services;
pub mod settings;
pub mod upload;

use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::DataError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: Option<String>) -> Self {
        Self {
            error: error.to_string(),
            message,
        }
    }
}

/// Response for deletes and other bodiless successes.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// List endpoints wrap their rows so the shape can grow.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

pub type ApiResult<T> = Result<T, DataError>;

impl IntoResponse for DataError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            DataError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
            DataError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            DataError::Remote(_) => (StatusCode::BAD_GATEWAY, "Data store error"),
        };
        (status, Json(ErrorResponse::new(error, Some(self.to_string())))).into_response()
    }
}

/// Caller-held value for toggle endpoints, `{"current": ...}`. An empty
/// body means the stored value is used.
#[derive(Debug, Deserialize)]
pub struct ToggleRequest<T> {
    pub current: Option<T>,
}

pub fn toggle_current<T: DeserializeOwned>(body: &Bytes) -> ApiResult<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<ToggleRequest<T>>(body)
        .map(|req| req.current)
        .map_err(|e| DataError::validation(format!("Invalid toggle body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::models::FeedbackStatus;

    #[test]
    fn data_errors_map_to_status_codes() {
        let cases = [
            (DataError::validation("name is required"), StatusCode::BAD_REQUEST),
            (DataError::not_found("Lead"), StatusCode::NOT_FOUND),
            (DataError::Remote("down".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn toggle_body_is_optional() {
        assert_eq!(toggle_current::<bool>(&Bytes::new()).unwrap(), None);
        assert_eq!(
            toggle_current::<bool>(&Bytes::from_static(br#"{"current":true}"#)).unwrap(),
            Some(true)
        );
        assert!(toggle_current::<bool>(&Bytes::from_static(b"nope")).is_err());
    }

    #[test]
    fn toggle_body_without_current_uses_stored_value() {
        assert_eq!(toggle_current::<bool>(&Bytes::from_static(b"{}")).unwrap(), None);
        assert_eq!(
            toggle_current::<FeedbackStatus>(&Bytes::from_static(br#"{"current":"read"}"#))
                .unwrap(),
            Some(FeedbackStatus::Read)
        );
    }

    #[test]
    fn error_response_omits_missing_message() {
        let json = serde_json::to_string(&ErrorResponse::new("Unauthorized", None)).unwrap();
        assert_eq!(json, r#"{"error":"Unauthorized"}"#);
    }
}
