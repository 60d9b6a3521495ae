/**
 * Settings Routes
 * Site-wide switches, currently the project availability flag
 */
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::ApiResult;
use crate::guard::Admin;
use crate::repo::models::SiteSetting;
use crate::repo::optimistic::AvailabilityToggle;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub is_available: bool,
}

/// GET /api/settings/availability - defaults to available when unset
pub async fn get_availability(State(state): State<AppState>) -> Json<AvailabilityResponse> {
    let is_available = state.repo::<SiteSetting>().availability().await;
    Json(AvailabilityResponse { is_available })
}

/// POST /api/admin/settings/availability/toggle
pub async fn toggle_availability(admin: Admin) -> ApiResult<Json<AvailabilityResponse>> {
    let mut switch = AvailabilityToggle::load(admin.repo::<SiteSetting>()).await;
    let is_available = switch.toggle().await?;
    Ok(Json(AvailabilityResponse { is_available }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_app;
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn availability_defaults_true_then_toggles() {
        let app = test_app().await;
        let (status, body) = app.get("/api/settings/availability").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isAvailable"], true);

        let token = app.admin_token().await;
        let uri = "/api/admin/settings/availability/toggle";
        let (status, body) = app.send(Method::POST, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isAvailable"], false);

        let (_, body) = app.get("/api/settings/availability").await;
        assert_eq!(body["isAvailable"], false);
    }

    #[tokio::test]
    async fn failed_toggle_leaves_setting_unchanged() {
        let app = test_app().await;
        let token = app.admin_token().await;
        app.store.set_fail_writes(true);
        let (status, _) = app
            .send(Method::POST, "/api/admin/settings/availability/toggle", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        app.store.set_fail_writes(false);

        let (_, body) = app.get("/api/settings/availability").await;
        assert_eq!(body["isAvailable"], true);
    }

    #[tokio::test]
    async fn toggle_requires_admin() {
        let app = test_app().await;
        let (status, _) = app
            .send(Method::POST, "/api/admin/settings/availability/toggle", None, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
