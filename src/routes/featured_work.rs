/**
 * Featured Work Routes
 * Case study cards shown on the public site
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{ApiResult, ListResponse, SuccessResponse};
use crate::guard::Admin;
use crate::repo::models::{FeaturedWork, FeaturedWorkPatch, NewFeaturedWork};
use crate::repo::ListOptions;
use crate::AppState;

/// GET /api/featured-work
pub async fn list_featured_work_public(
    State(state): State<AppState>,
) -> ApiResult<Json<ListResponse<FeaturedWork>>> {
    let work = state.repo::<FeaturedWork>().list(ListOptions::new()).await?;
    Ok(Json(work.into()))
}

/// GET /api/admin/featured-work
pub async fn list_featured_work(admin: Admin) -> ApiResult<Json<ListResponse<FeaturedWork>>> {
    let work = admin.repo::<FeaturedWork>().list(ListOptions::new()).await?;
    Ok(Json(work.into()))
}

/// POST /api/admin/featured-work
pub async fn create_featured_work(
    admin: Admin,
    Json(payload): Json<NewFeaturedWork>,
) -> ApiResult<(StatusCode, Json<FeaturedWork>)> {
    let work = admin.repo::<FeaturedWork>().create(payload).await?;
    Ok((StatusCode::CREATED, Json(work)))
}

/// PATCH /api/admin/featured-work/:id
pub async fn update_featured_work(
    admin: Admin,
    Path(id): Path<String>,
    Json(payload): Json<FeaturedWorkPatch>,
) -> ApiResult<Json<FeaturedWork>> {
    let work = admin.repo::<FeaturedWork>().update(&id, payload).await?;
    Ok(Json(work))
}

/// DELETE /api/admin/featured-work/:id
pub async fn delete_featured_work(
    admin: Admin,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    admin.repo::<FeaturedWork>().delete(&id).await?;
    Ok(SuccessResponse::ok())
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_app;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn create_update_and_missing_fields() {
        let app = test_app().await;
        let token = app.admin_token().await;

        let (status, body) = app
            .send(
                Method::POST,
                "/api/admin/featured-work",
                Some(&token),
                Some(json!({ "title": "Launch", "category": "Web" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("image_url"));

        let (status, work) = app
            .send(
                Method::POST,
                "/api/admin/featured-work",
                Some(&token),
                Some(json!({
                    "title": "Launch",
                    "category": "Web",
                    "image_url": "/uploads/launch.png",
                    "color": "#ff0066"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/admin/featured-work/{}", work["id"].as_str().unwrap());
        let (status, updated) = app
            .send(Method::PATCH, &uri, Some(&token), Some(json!({ "subject": "E-commerce" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["subject"], "E-commerce");
        assert_eq!(updated["title"], "Launch");
        assert_eq!(updated["color"], "#ff0066");
    }

    #[tokio::test]
    async fn updating_unknown_id_is_not_found() {
        let app = test_app().await;
        let token = app.admin_token().await;
        let (status, _) = app
            .send(
                Method::PATCH,
                "/api/admin/featured-work/missing",
                Some(&token),
                Some(json!({ "title": "x" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
