/**
 * Blog Routes
 * Public reading of published posts and admin post management
 */
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{toggle_current, ApiResult, ListResponse, SuccessResponse};
use crate::guard::Admin;
use crate::repo::models::{BlogPost, BlogPostPatch, NewBlogPost};
use crate::repo::ListOptions;
use crate::AppState;

/// GET /api/blog - published posts, newest first
pub async fn list_published_posts(
    State(state): State<AppState>,
) -> ApiResult<Json<ListResponse<BlogPost>>> {
    let posts = state.repo::<BlogPost>().list_published().await?;
    Ok(Json(posts.into()))
}

/// GET /api/blog/:slug - counts a view
pub async fn get_published_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<BlogPost>> {
    let posts = state.repo::<BlogPost>();
    let post = posts.find_published(&slug).await?;
    posts.record_view(&post).await;
    Ok(Json(post))
}

/// GET /api/admin/blog - drafts included
pub async fn list_all_posts(admin: Admin) -> ApiResult<Json<ListResponse<BlogPost>>> {
    let posts = admin.repo::<BlogPost>().list(ListOptions::new()).await?;
    Ok(Json(posts.into()))
}

/// GET /api/admin/blog/:id
pub async fn get_post_by_id(admin: Admin, Path(id): Path<String>) -> ApiResult<Json<BlogPost>> {
    Ok(Json(admin.repo::<BlogPost>().get(&id).await?))
}

/// POST /api/admin/blog
pub async fn create_post(
    admin: Admin,
    Json(payload): Json<NewBlogPost>,
) -> ApiResult<(StatusCode, Json<BlogPost>)> {
    let post = admin.repo::<BlogPost>().create(payload).await?;
    tracing::info!(slug = %post.slug, author = %admin.session.user.id, "Blog post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// PATCH /api/admin/blog/:id
pub async fn update_post(
    admin: Admin,
    Path(id): Path<String>,
    Json(payload): Json<BlogPostPatch>,
) -> ApiResult<Json<BlogPost>> {
    let post = admin.repo::<BlogPost>().update(&id, payload).await?;
    Ok(Json(post))
}

/// POST /api/admin/blog/:id/toggle-published - body `{"current": false}`
pub async fn toggle_published(
    admin: Admin,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<BlogPost>> {
    let repo = admin.repo::<BlogPost>();
    let current = match toggle_current::<bool>(&body)? {
        Some(published) => published,
        None => repo.get(&id).await?.published,
    };
    let post = repo.toggle_boolean(&id, "published", current).await?;
    tracing::info!(slug = %post.slug, published = post.published, "Blog post visibility changed");
    Ok(Json(post))
}

/// DELETE /api/admin/blog/:id
pub async fn delete_post(admin: Admin, Path(id): Path<String>) -> ApiResult<Json<SuccessResponse>> {
    admin.repo::<BlogPost>().delete(&id).await?;
    Ok(SuccessResponse::ok())
}
