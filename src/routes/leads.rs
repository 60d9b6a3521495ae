/**
 * Lead Routes
 * Public contact form submission and admin lead management
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{ApiResult, ListResponse, SuccessResponse};
use crate::guard::Admin;
use crate::repo::models::{Lead, LeadStatus, NewLead};
use crate::repo::ListOptions;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: LeadStatus,
}

/// POST /api/leads - contact form
pub async fn submit_lead(
    State(state): State<AppState>,
    Json(payload): Json<NewLead>,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    let lead = state.repo::<Lead>().create(payload).await?;
    tracing::info!(lead_id = %lead.id, "Contact form submitted");
    Ok((StatusCode::CREATED, Json(lead)))
}

/// GET /api/admin/leads
pub async fn list_leads(admin: Admin) -> ApiResult<Json<ListResponse<Lead>>> {
    let leads = admin.repo::<Lead>().list(ListOptions::new()).await?;
    Ok(Json(leads.into()))
}

/// PATCH /api/admin/leads/:id/status
pub async fn update_status(
    admin: Admin,
    Path(id): Path<String>,
    Json(payload): Json<StatusRequest>,
) -> ApiResult<Json<Lead>> {
    let lead = admin.repo::<Lead>().set_status(&id, payload.status).await?;
    Ok(Json(lead))
}

/// DELETE /api/admin/leads/:id
pub async fn delete_lead(admin: Admin, Path(id): Path<String>) -> ApiResult<Json<SuccessResponse>> {
    admin.repo::<Lead>().delete(&id).await?;
    Ok(SuccessResponse::ok())
}
