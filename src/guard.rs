//! Admin gate: an active session whose profile carries the admin role.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::repo::models::{Profile, ADMIN_ROLE};
use crate::repo::{Entity, Repository};
use crate::routes::ErrorResponse;
use crate::store::{AuthProvider, DataStore, Session};
use crate::AppState;

/// Cookie set by the login endpoint for browser sessions.
pub const SESSION_COOKIE: &str = "access_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Login,
    Home,
}

impl Redirect {
    pub fn location(self) -> &'static str {
        match self {
            Redirect::Login => "/admin/login",
            Redirect::Home => "/",
        }
    }
}

#[derive(Debug, Clone)]
pub enum GuardOutcome {
    Authorized(Session),
    Redirected(Redirect),
}

pub struct SessionGuard {
    auth: Arc<dyn AuthProvider>,
    data: Arc<dyn DataStore>,
    timeout: Duration,
}

impl SessionGuard {
    pub fn new(auth: Arc<dyn AuthProvider>, data: Arc<dyn DataStore>, timeout: Duration) -> Self {
        Self {
            auth,
            data,
            timeout,
        }
    }

    /// One check per protected entry. Every failure fails closed.
    pub async fn check(&self, token: Option<&str>) -> GuardOutcome {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return GuardOutcome::Redirected(Redirect::Login);
        };

        let session = match tokio::time::timeout(self.timeout, self.auth.get_session(token)).await {
            Ok(Ok(Some(session))) => session,
            Ok(Ok(None)) => return GuardOutcome::Redirected(Redirect::Login),
            Ok(Err(e)) => {
                tracing::warn!("Session lookup failed: {}", e);
                return GuardOutcome::Redirected(Redirect::Login);
            }
            Err(_) => {
                tracing::warn!("Session lookup timed out");
                return GuardOutcome::Redirected(Redirect::Login);
            }
        };

        let profiles = Repository::<Profile>::new(
            self.data.clone().with_access_token(&session.access_token),
            self.timeout,
        );
        match profiles.role_of(&session.user.id).await {
            Ok(Some(role)) if role == ADMIN_ROLE => GuardOutcome::Authorized(session),
            Ok(Some(role)) => {
                tracing::warn!(user_id = %session.user.id, role = %role, "Non-admin denied");
                GuardOutcome::Redirected(Redirect::Home)
            }
            Ok(None) => {
                tracing::warn!(user_id = %session.user.id, "No profile for session");
                GuardOutcome::Redirected(Redirect::Home)
            }
            Err(e) => {
                tracing::warn!(user_id = %session.user.id, "Profile lookup failed: {}", e);
                GuardOutcome::Redirected(Redirect::Home)
            }
        }
    }
}

/// Bearer token from `Authorization`, else the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    bearer.or_else(|| cookie_value(headers, SESSION_COOKIE))
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

/// Middleware for `/api/admin`: 401 without a session, 403 without the admin role.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = session_token(request.headers());
    match state.guard().check(token.as_deref()).await {
        GuardOutcome::Authorized(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        GuardOutcome::Redirected(Redirect::Login) => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Unauthorized", None)),
        )
            .into_response(),
        GuardOutcome::Redirected(Redirect::Home) => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new("Forbidden", None)),
        )
            .into_response(),
    }
}

/// Handler access to the authorized session and repositories scoped to it.
pub struct Admin {
    pub session: Session,
    data: Arc<dyn DataStore>,
    timeout: Duration,
}

impl Admin {
    pub fn repo<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.data.clone(), self.timeout)
    }
}

impl FromRequestParts<AppState> for Admin {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Unauthorized", None)),
            )
                .into_response()
        })?;
        let data = state
            .backend
            .data
            .clone()
            .with_access_token(&session.access_token);
        Ok(Self {
            session,
            data,
            timeout: state.config.store_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_backend, ADMIN_EMAIL, EDITOR_EMAIL, PASSWORD};
    use crate::store::memory::MemoryStore;
    use axum::http::HeaderValue;

    async fn guard_and_login(email: &str) -> (SessionGuard, String, Arc<MemoryStore>) {
        let (backend, store) = test_backend().await;
        let session = backend
            .auth
            .sign_in_with_password(email, PASSWORD)
            .await
            .unwrap();
        let guard = SessionGuard::new(
            backend.auth.clone(),
            backend.data.clone(),
            Duration::from_secs(5),
        );
        (guard, session.access_token, store)
    }

    #[tokio::test]
    async fn no_session_redirects_to_login() {
        let (guard, _, _) = guard_and_login(ADMIN_EMAIL).await;
        assert!(matches!(
            guard.check(None).await,
            GuardOutcome::Redirected(Redirect::Login)
        ));
        assert!(matches!(
            guard.check(Some("garbage")).await,
            GuardOutcome::Redirected(Redirect::Login)
        ));
    }

    #[tokio::test]
    async fn non_admin_redirects_home() {
        let (guard, token, _) = guard_and_login(EDITOR_EMAIL).await;
        assert!(matches!(
            guard.check(Some(token.as_str())).await,
            GuardOutcome::Redirected(Redirect::Home)
        ));
    }

    #[tokio::test]
    async fn admin_is_authorized() {
        let (guard, token, _) = guard_and_login(ADMIN_EMAIL).await;
        match guard.check(Some(token.as_str())).await {
            GuardOutcome::Authorized(session) => {
                assert_eq!(session.user.email.as_deref(), Some(ADMIN_EMAIL))
            }
            other => panic!("expected authorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn profile_lookup_failure_redirects_home() {
        let (guard, token, store) = guard_and_login(ADMIN_EMAIL).await;
        store.set_fail_reads(true);
        assert!(matches!(
            guard.check(Some(token.as_str())).await,
            GuardOutcome::Redirected(Redirect::Home)
        ));
    }

    #[test]
    fn token_comes_from_bearer_or_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access_token=abc"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn redirect_locations() {
        assert_eq!(Redirect::Login.location(), "/admin/login");
        assert_eq!(Redirect::Home.location(), "/");
    }
}
