/**
 * Authentication Routes
 * Password sign-in against the store's auth service, plus session cookie handling
 */
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::ErrorResponse;
use crate::guard::{session_token, SESSION_COOKIE};
use crate::store::{AuthUser, StoreError};
use crate::AppState;

/// Login attempts allowed per client IP inside one window.
const LOGIN_ATTEMPTS_PER_WINDOW: usize = 10;

const RATE_LIMIT_WINDOW_SECS: i64 = 60;

// ============================================================================
// Rate limiting
// ============================================================================

/// Sliding-window counter of login attempts per client IP.
#[derive(Default)]
pub struct LoginLimiter {
    attempts: Mutex<HashMap<IpAddr, Vec<i64>>>,
}

impl LoginLimiter {
    /// Record an attempt at `now`; `false` once the window is full.
    pub async fn allow(&self, ip: IpAddr, now: i64) -> bool {
        let mut attempts = self.attempts.lock().await;

        // Forget IPs whose whole window has expired.
        attempts.retain(|_, times| {
            times.retain(|t| now - *t < RATE_LIMIT_WINDOW_SECS);
            !times.is_empty()
        });

        let times = attempts.entry(ip).or_default();
        if times.len() >= LOGIN_ATTEMPTS_PER_WINDOW {
            return false;
        }
        times.push(now);
        true
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub user: AuthUser,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
}

// ============================================================================
// Cookie helpers
// ============================================================================

fn session_cookie(token: &str, max_age: Option<i64>, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token);
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age.max(0)));
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Session cookie is not a valid header value: {}", e),
    }
    response
}

fn error(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(ErrorResponse::new(error, Some(message.to_string())))).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
pub async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Response {
    if !state.login_limiter.allow(addr.ip(), Utc::now().timestamp()).await {
        tracing::warn!(ip = %addr.ip(), "Login rate limit hit");
        return error(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests",
            "Too many login attempts. Please try again later.",
        );
    }

    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return error(
            StatusCode::BAD_REQUEST,
            "Validation failed",
            "Email and password are required",
        );
    }
    if !email.contains('@') {
        return error(StatusCode::BAD_REQUEST, "Validation failed", "Invalid email format");
    }

    let attempt = tokio::time::timeout(
        state.config.store_timeout,
        state.backend.auth.sign_in_with_password(email, &payload.password),
    )
    .await;

    let session = match attempt {
        Ok(Ok(session)) => session,
        Ok(Err(StoreError::InvalidCredentials)) => {
            tracing::warn!(ip = %addr.ip(), "Failed login attempt for: {}", email);
            return error(StatusCode::UNAUTHORIZED, "Unauthorized", "Invalid credentials");
        }
        Ok(Err(e)) => {
            tracing::error!("Auth service error during login: {}", e);
            return error(
                StatusCode::BAD_GATEWAY,
                "Data store error",
                "Authentication service temporarily unavailable.",
            );
        }
        Err(_) => {
            tracing::error!("Auth service timed out during login");
            return error(
                StatusCode::BAD_GATEWAY,
                "Data store error",
                "Authentication service temporarily unavailable.",
            );
        }
    };

    tracing::info!(user_id = %session.user.id, "Successful login");

    let max_age = session.expires_at.map(|exp| exp - Utc::now().timestamp());
    let cookie = session_cookie(
        &session.access_token,
        max_age,
        state.config.is_production(),
    );
    let response = Json(LoginResponse {
        success: true,
        user: session.user,
        access_token: session.access_token,
        expires_at: session.expires_at,
    })
    .into_response();
    with_cookie(response, &cookie)
}

/// POST /api/auth/logout - always succeeds and clears the cookie
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        match tokio::time::timeout(state.config.store_timeout, state.backend.auth.sign_out(&token))
            .await
        {
            Ok(Ok(())) => tracing::info!("Session signed out"),
            Ok(Err(e)) => tracing::warn!("Sign-out failed, clearing cookie anyway: {}", e),
            Err(_) => tracing::warn!("Sign-out timed out, clearing cookie anyway"),
        }
    }

    let cookie = session_cookie("", Some(0), state.config.is_production());
    with_cookie(super::SuccessResponse::ok().into_response(), &cookie)
}

/// GET /api/auth/session - who the caller is, if anyone
pub async fn session(State(state): State<AppState>, headers: HeaderMap) -> Json<SessionResponse> {
    let Some(token) = session_token(&headers) else {
        return Json(SessionResponse {
            authenticated: false,
            user: None,
        });
    };

    let user = match tokio::time::timeout(
        state.config.store_timeout,
        state.backend.auth.get_session(&token),
    )
    .await
    {
        Ok(Ok(Some(session))) => Some(session.user),
        Ok(Ok(None)) => None,
        Ok(Err(e)) => {
            tracing::warn!("Session lookup failed: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("Session lookup timed out");
            None
        }
    };

    Json(SessionResponse {
        authenticated: user.is_some(),
        user,
    })
}
