/**
 * Upload Routes
 * Image uploads for testimonials, featured work and blog covers
 */
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};

use super::ApiResult;
use crate::error::DataError;
use crate::guard::Admin;
use crate::repo::slug::is_valid_slug;
use crate::AppState;

const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const DEFAULT_PREFIX: &str = "image";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub path: String,
    pub size: usize,
    pub mime_type: String,
}

/// Sniff the image type from its leading bytes.
fn validate_image_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// `<prefix>-<16 random alphanumerics>.<ext>`
fn object_name(prefix: &str, ext: &str) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        Alphanumeric.sample_string(&mut rand::rng(), 16),
        ext
    )
}

/// Check an upload and return its extension and sniffed content type.
fn check_image(filename: &str, bytes: &[u8]) -> ApiResult<(String, &'static str)> {
    let ext = extension_of(filename).ok_or_else(|| {
        DataError::validation("Unsupported file type. Allowed: JPEG, PNG, WebP, GIF.")
    })?;
    if bytes.is_empty() {
        return Err(DataError::validation("Empty file"));
    }
    if bytes.len() > MAX_FILE_SIZE {
        return Err(DataError::validation("File too large. Maximum size is 5MB."));
    }
    let mime = validate_image_magic_bytes(bytes).ok_or_else(|| {
        DataError::validation("File content does not match an allowed image type.")
    })?;
    if mime_for_extension(&ext) != Some(mime) {
        return Err(DataError::validation("File extension does not match its content."));
    }
    Ok((ext, mime))
}

/// POST /api/admin/uploads - multipart `file` plus optional `prefix`
pub async fn upload_image(
    admin: Admin,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut prefix = DEFAULT_PREFIX.to_string();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Multipart error: {}", e);
        DataError::validation("Invalid multipart data")
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("prefix") => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| DataError::validation("Invalid prefix"))?;
                let value = value.trim();
                if !is_valid_slug(value) {
                    return Err(DataError::validation(
                        "Prefix must be lowercase letters, numbers, and hyphens",
                    ));
                }
                prefix = value.to_string();
            }
            Some("file") => {
                let name = field.file_name().unwrap_or("unknown").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::error!("Failed to read upload bytes: {}", e);
                    DataError::validation("Failed to read file data")
                })?;
                file = Some((name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (original_name, bytes) = file.ok_or_else(|| DataError::validation("No file provided"))?;
    let (ext, mime) = check_image(&original_name, &bytes)?;
    let size = bytes.len();

    let path = state
        .backend
        .storage
        .upload(&object_name(&prefix, &ext), bytes, mime)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store upload: {}", e);
            DataError::from(e)
        })?;
    let url = state.backend.storage.public_url(&path);

    tracing::info!(path = %path, size, uploader = %admin.session.user.id, "Image uploaded");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url,
            path,
            size,
            mime_type: mime.to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::store::Backend;
    use crate::test_support::{test_app, ADMIN_EMAIL, PASSWORD};
    use crate::create_app;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    fn multipart_body(boundary: &str, prefix: Option<&str>, filename: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(prefix) = prefix {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"prefix\"\r\n\r\n{prefix}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    #[test]
    fn magic_bytes_are_sniffed() {
        assert_eq!(validate_image_magic_bytes(PNG), Some("image/png"));
        assert_eq!(validate_image_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(validate_image_magic_bytes(b"GIF89a"), Some("image/gif"));
        assert_eq!(validate_image_magic_bytes(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(validate_image_magic_bytes(b"%PDF-1.7"), None);
        assert_eq!(validate_image_magic_bytes(&[0xFF]), None);
    }

    #[test]
    fn object_names_follow_prefix_random_ext() {
        let name = object_name("testimonial", "png");
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "png");
        let random = stem.strip_prefix("testimonial-").unwrap();
        assert_eq!(random.len(), 16);
        assert!(random.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn check_image_rejects_bad_input() {
        assert!(check_image("photo.PNG", PNG).is_ok());
        assert!(check_image("photo.svg", PNG).is_err());
        assert!(check_image("noext", PNG).is_err());
        assert!(check_image("photo.png", &[]).is_err());
        assert!(check_image("photo.jpg", PNG).is_err());
        assert!(check_image("photo.png", &vec![0x89; MAX_FILE_SIZE + 1]).is_err());
    }

    #[tokio::test]
    async fn upload_stores_object_and_returns_public_url() {
        let app = test_app().await;
        let token = app.admin_token().await;
        let boundary = "XBOUNDARY";
        let req = Request::post("/api/admin/uploads")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(multipart_body(boundary, Some("blog"), "cover.png", PNG)))
            .unwrap();
        let res = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: UploadResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.path.starts_with("blog-"));
        assert!(body.path.ends_with(".png"));
        assert_eq!(body.url, format!("/uploads/{}", body.path));
        assert_eq!(body.mime_type, "image/png");
        assert_eq!(app.store.object(&body.path).await.as_deref(), Some(PNG));
    }

    #[tokio::test]
    async fn uploaded_url_is_served_in_memory_mode() {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().to_string_lossy().to_string();
        let password_hash = bcrypt::hash(PASSWORD, 4).unwrap();
        let config = AppConfig::from_lookup(|key| match key {
            "STORE_URL" => Some("memory://".to_string()),
            "STORE_API_KEY" => Some("test-key".to_string()),
            "STATIC_DIR" => Some("target/no-such-dist".to_string()),
            "UPLOAD_DIR" => Some(upload_dir.clone()),
            "ADMIN_EMAIL" => Some(ADMIN_EMAIL.to_string()),
            "ADMIN_PASSWORD_HASH" => Some(password_hash.clone()),
            _ => None,
        })
        .unwrap();
        let backend = Backend::connect(&config).await.unwrap();
        let token = backend
            .auth
            .sign_in_with_password(ADMIN_EMAIL, PASSWORD)
            .await
            .unwrap()
            .access_token;
        let router = create_app(AppState::new(backend, config));

        let boundary = "XBOUNDARY";
        let req = Request::post("/api/admin/uploads")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(multipart_body(boundary, None, "photo.png", PNG)))
            .unwrap();
        let res = router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: UploadResponse = serde_json::from_slice(&bytes).unwrap();

        let res = router
            .oneshot(Request::get(&body.url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let served = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&served[..], PNG);
    }

    #[tokio::test]
    async fn upload_rejects_non_images() {
        let app = test_app().await;
        let token = app.admin_token().await;
        let boundary = "XBOUNDARY";
        let req = Request::post("/api/admin/uploads")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(multipart_body(boundary, None, "evil.png", b"<?php echo 1; ?>")))
            .unwrap();
        let res = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_requires_admin() {
        let app = test_app().await;
        let req = Request::post("/api/admin/uploads")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=X")
            .body(Body::from("--X--\r\n"))
            .unwrap();
        let res = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
