/**
 * Health Routes
 * Liveness ping and store-backed readiness check
 */
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::AppState;

// Track server start time for uptime calculation
lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Initialize the server start time
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Store check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCheck {
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
}

/// Ready check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub checks: StoreCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Simple health response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

/// GET /health - Simple health ping
pub async fn health_ping() -> Json<SimpleHealthResponse> {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/ready - 503 until the store answers
pub async fn health_ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let uptime = SERVER_START.elapsed().as_secs();

    let probe = tokio::time::timeout(state.config.store_timeout, state.backend.data.ping()).await;
    let (checks, reason) = match probe {
        Ok(Ok(duration)) => (
            StoreCheck {
                store: "healthy".to_string(),
                response_time: Some(duration.as_millis() as u64),
            },
            None,
        ),
        Ok(Err(e)) => {
            tracing::warn!("Readiness probe failed: {}", e);
            (
                StoreCheck {
                    store: "unhealthy".to_string(),
                    response_time: None,
                },
                Some(e.to_string()),
            )
        }
        Err(_) => (
            StoreCheck {
                store: "unhealthy".to_string(),
                response_time: None,
            },
            Some("Store did not respond in time".to_string()),
        ),
    };

    let (status, label) = if reason.is_none() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    };

    let response = ReadyResponse {
        status: label.to_string(),
        timestamp: Utc::now(),
        uptime,
        checks,
        reason,
    };

    (status, Json(response))
}
