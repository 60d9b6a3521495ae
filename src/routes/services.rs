/**
 * Service Routes
 * Service categories used to tag featured work
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{ApiResult, ListResponse, SuccessResponse};
use crate::guard::Admin;
use crate::repo::models::{NewService, Service};
use crate::repo::ListOptions;
use crate::AppState;

/// GET /api/services
pub async fn list_services_public(
    State(state): State<AppState>,
) -> ApiResult<Json<ListResponse<Service>>> {
    let services = state.repo::<Service>().list(ListOptions::new()).await?;
    Ok(Json(services.into()))
}

/// GET /api/admin/services
pub async fn list_services(admin: Admin) -> ApiResult<Json<ListResponse<Service>>> {
    let services = admin.repo::<Service>().list(ListOptions::new()).await?;
    Ok(Json(services.into()))
}

/// POST /api/admin/services
pub async fn create_service(
    admin: Admin,
    Json(payload): Json<NewService>,
) -> ApiResult<(StatusCode, Json<Service>)> {
    let service = admin.repo::<Service>().create(payload).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

/// DELETE /api/admin/services/:id
///
/// Featured work tagged with this name keeps its category text.
pub async fn delete_service(
    admin: Admin,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    admin.repo::<Service>().delete(&id).await?;
    Ok(SuccessResponse::ok())
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_app;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn deleting_a_service_leaves_featured_work_category() {
        let app = test_app().await;
        let token = app.admin_token().await;

        let (status, service) = app
            .send(
                Method::POST,
                "/api/admin/services",
                Some(&token),
                Some(json!({ "name": " Branding " })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(service["name"], "Branding");

        app.send(
            Method::POST,
            "/api/admin/featured-work",
            Some(&token),
            Some(json!({ "title": "Rebrand", "category": "Branding", "image_url": "/uploads/a.png" })),
        )
        .await;

        let uri = format!("/api/admin/services/{}", service["id"].as_str().unwrap());
        let (status, _) = app.send(Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, services) = app.get("/api/services").await;
        assert!(services["items"].as_array().unwrap().is_empty());
        let (_, work) = app.get("/api/featured-work").await;
        assert_eq!(work["items"][0]["category"], "Branding");
    }

    #[tokio::test]
    async fn blank_service_name_is_rejected() {
        let app = test_app().await;
        let token = app.admin_token().await;
        let (status, _) = app
            .send(
                Method::POST,
                "/api/admin/services",
                Some(&token),
                Some(json!({ "name": "   " })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
