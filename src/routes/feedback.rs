/**
 * Feedback Routes
 * Client feedback moderation and the public testimonials feed
 */
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{toggle_current, ApiResult, ListResponse, SuccessResponse};
use crate::guard::Admin;
use crate::repo::models::{Feedback, FeedbackPatch, FeedbackStatus, NewFeedback, Testimonial};
use crate::repo::ListOptions;
use crate::AppState;

/// GET /api/testimonials - approved feedback only
pub async fn list_testimonials(
    State(state): State<AppState>,
) -> ApiResult<Json<ListResponse<Testimonial>>> {
    let approved = state.repo::<Feedback>().list_approved().await?;
    Ok(Json(approved.into()))
}

/// GET /api/admin/feedback
pub async fn list_feedback(admin: Admin) -> ApiResult<Json<ListResponse<Feedback>>> {
    let feedback = admin.repo::<Feedback>().list(ListOptions::new()).await?;
    Ok(Json(feedback.into()))
}

/// POST /api/admin/feedback
pub async fn create_feedback(
    admin: Admin,
    Json(payload): Json<NewFeedback>,
) -> ApiResult<(StatusCode, Json<Feedback>)> {
    let feedback = admin.repo::<Feedback>().create(payload).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

/// PATCH /api/admin/feedback/:id
pub async fn update_feedback(
    admin: Admin,
    Path(id): Path<String>,
    Json(payload): Json<FeedbackPatch>,
) -> ApiResult<Json<Feedback>> {
    let feedback = admin.repo::<Feedback>().update(&id, payload).await?;
    Ok(Json(feedback))
}

/// POST /api/admin/feedback/:id/toggle-read - body `{"current": "unread"}`
pub async fn toggle_read(
    admin: Admin,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Feedback>> {
    let repo = admin.repo::<Feedback>();
    let current = match toggle_current::<FeedbackStatus>(&body)? {
        Some(status) => status,
        None => repo.get(&id).await?.status,
    };
    Ok(Json(repo.toggle_read(&id, current).await?))
}

/// POST /api/admin/feedback/:id/toggle-approved - body `{"current": false}`
pub async fn toggle_approved(
    admin: Admin,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Feedback>> {
    let repo = admin.repo::<Feedback>();
    let current = match toggle_current::<bool>(&body)? {
        Some(approved) => approved,
        None => repo.get(&id).await?.approved,
    };
    let feedback = repo.toggle_boolean(&id, "approved", current).await?;
    tracing::info!(feedback_id = %id, approved = feedback.approved, "Testimonial visibility changed");
    Ok(Json(feedback))
}

/// DELETE /api/admin/feedback/:id
pub async fn delete_feedback(
    admin: Admin,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    admin.repo::<Feedback>().delete(&id).await?;
    Ok(SuccessResponse::ok())
}
