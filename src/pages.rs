//! Browser page routes.
//!
//! Pages are rendered client-side from the static bundle; the server only
//! decides whether a path is a page at all, applies the bare `/admin`
//! redirect, and guards admin pages before handing out the shell.

use std::path::Path;

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect as HttpRedirect, Response},
    Json,
};

use crate::error::DataError;
use crate::guard::{session_token, GuardOutcome};
use crate::repo::models::BlogPost;
use crate::routes::ErrorResponse;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Home,
    Services,
    Contact,
    CaseStudies,
    About,
    Testimonials,
    Blog,
    BlogPost(String),
    AdminLogin,
    AdminLeads,
    AdminServices,
    AdminFeaturedWork,
    AdminFeedback,
    AdminBlog,
    AdminBlogNew,
    AdminBlogEdit(String),
}

impl Page {
    /// Everything under `/admin` except the login page.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Page::AdminLeads
                | Page::AdminServices
                | Page::AdminFeaturedWork
                | Page::AdminFeedback
                | Page::AdminBlog
                | Page::AdminBlogNew
                | Page::AdminBlogEdit(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Page(Page),
    Redirect(&'static str),
}

/// Map a request path to a page. `None` means the path is not a page.
pub fn resolve(path: &str) -> Option<Route> {
    let trimmed = path.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').skip(1).collect();

    let page = match segments.as_slice() {
        [] => Page::Home,
        ["services"] => Page::Services,
        ["contact"] => Page::Contact,
        ["case-studies"] => Page::CaseStudies,
        ["about"] => Page::About,
        ["testimonials"] => Page::Testimonials,
        ["blog"] => Page::Blog,
        ["blog", slug] if !slug.is_empty() => Page::BlogPost(slug.to_string()),
        ["admin"] => return Some(Route::Redirect("/admin/leads")),
        ["admin", "login"] => Page::AdminLogin,
        ["admin", "leads"] => Page::AdminLeads,
        ["admin", "services"] => Page::AdminServices,
        ["admin", "featured-work"] => Page::AdminFeaturedWork,
        ["admin", "feedback"] => Page::AdminFeedback,
        ["admin", "blog"] => Page::AdminBlog,
        ["admin", "blog", "new"] => Page::AdminBlogNew,
        ["admin", "blog", "edit", id] if !id.is_empty() => Page::AdminBlogEdit(id.to_string()),
        _ => return None,
    };
    Some(Route::Page(page))
}

const FALLBACK_SHELL: &str = r#"<!doctype html>
<html lang="en">
  <head><meta charset="utf-8" /><title>Agency</title></head>
  <body><div id="root"></div><script type="module" src="/assets/index.js"></script></body>
</html>
"#;

async fn app_shell(static_dir: &Path) -> Html<String> {
    match tokio::fs::read_to_string(static_dir.join("index.html")).await {
        Ok(html) => Html(html),
        Err(e) => {
            tracing::debug!("index.html unavailable, serving fallback shell: {}", e);
            Html(FALLBACK_SHELL.to_string())
        }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Not found", None)),
    )
        .into_response()
}

/// Router fallback: serves pages, rejects everything else with 404.
pub async fn serve_page(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return not_found();
    }
    let page = match resolve(uri.path()) {
        Some(Route::Page(page)) => page,
        Some(Route::Redirect(to)) => return HttpRedirect::to(to).into_response(),
        None => return not_found(),
    };

    if page.requires_admin() {
        let token = session_token(&headers);
        if let GuardOutcome::Redirected(redirect) = state.guard().check(token.as_deref()).await {
            return HttpRedirect::to(redirect.location()).into_response();
        }
    }

    let shell = app_shell(&state.config.static_dir).await;

    if let Page::BlogPost(slug) = &page {
        if let Err(DataError::NotFound(_)) = state.repo::<BlogPost>().find_published(slug).await {
            return (StatusCode::NOT_FOUND, shell).into_response();
        }
    }

    shell.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_app, EDITOR_EMAIL};
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    #[test]
    fn public_pages_resolve() {
        assert_eq!(resolve("/"), Some(Route::Page(Page::Home)));
        assert_eq!(resolve("/case-studies"), Some(Route::Page(Page::CaseStudies)));
        assert_eq!(resolve("/blog/"), Some(Route::Page(Page::Blog)));
        assert_eq!(
            resolve("/blog/hello-world"),
            Some(Route::Page(Page::BlogPost("hello-world".into())))
        );
    }

    #[test]
    fn bare_admin_redirects_to_leads() {
        assert_eq!(resolve("/admin"), Some(Route::Redirect("/admin/leads")));
        assert_eq!(resolve("/admin/"), Some(Route::Redirect("/admin/leads")));
    }

    #[test]
    fn admin_pages_resolve_and_require_admin() {
        let edit = resolve("/admin/blog/edit/42");
        assert_eq!(edit, Some(Route::Page(Page::AdminBlogEdit("42".into()))));
        assert!(Page::AdminBlogNew.requires_admin());
        assert!(!Page::AdminLogin.requires_admin());
        assert!(!Page::Blog.requires_admin());
    }

    #[test]
    fn unknown_paths_are_not_pages() {
        for path in ["/nope", "/admin/users", "/blog/a/b", "/admin/blog/edit"] {
            assert_eq!(resolve(path), None, "{}", path);
        }
    }

    async fn fetch(uri: &str, cookie: Option<String>) -> Response {
        let app = test_app().await;
        let mut req = Request::get(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        app.router.oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
    }

    fn location(res: &Response) -> Option<&str> {
        res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn admin_page_without_session_redirects_to_login() {
        let res = fetch("/admin/leads", None).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some("/admin/login"));
    }

    #[tokio::test]
    async fn admin_page_for_non_admin_redirects_home() {
        let app = test_app().await;
        let token = app.token_for(EDITOR_EMAIL).await;
        let req = Request::get("/admin/feedback")
            .header(header::COOKIE, format!("access_token={}", token))
            .body(Body::empty())
            .unwrap();
        let res = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some("/"));
    }

    #[tokio::test]
    async fn admin_page_for_admin_serves_shell() {
        let app = test_app().await;
        let token = app.admin_token().await;
        let req = Request::get("/admin/leads")
            .header(header::COOKIE, format!("access_token={}", token))
            .body(Body::empty())
            .unwrap();
        let res = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_page_and_bare_admin() {
        assert_eq!(fetch("/admin/login", None).await.status(), StatusCode::OK);
        let res = fetch("/admin", None).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some("/admin/leads"));
    }

    #[tokio::test]
    async fn missing_blog_post_page_is_not_found() {
        assert_eq!(fetch("/blog/no-such-post", None).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(fetch("/definitely-not-a-page", None).await.status(), StatusCode::NOT_FOUND);
    }
}
