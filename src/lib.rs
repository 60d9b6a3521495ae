//! Agency CMS - library for app logic and testing

pub mod config;
pub mod error;
pub mod guard;
pub mod logging;
pub mod pages;
pub mod repo;
pub mod routes;
pub mod store;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use thiserror::Error;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use config::{AppConfig, ConfigError};
use guard::SessionGuard;
use repo::{Entity, Repository};
use routes::auth::LoginLimiter;
use store::{Backend, StoreError};

/// Request bodies above this are refused before any handler runs.
const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub backend: Backend,
    pub config: Arc<AppConfig>,
    pub login_limiter: Arc<LoginLimiter>,
}

impl AppState {
    pub fn new(backend: Backend, config: AppConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            login_limiter: Arc::new(LoginLimiter::default()),
        }
    }

    /// Repository acting with the store's public key, for public endpoints.
    pub fn repo<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.backend.data.clone(), self.config.store_timeout)
    }

    pub fn guard(&self) -> SessionGuard {
        SessionGuard::new(
            self.backend.auth.clone(),
            self.backend.data.clone(),
            self.config.store_timeout,
        )
    }
}

/// CORS from `ALLOWED_ORIGINS` / `FRONTEND_ORIGIN`; unparsable origins are skipped.
pub fn configure_cors(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

fn admin_router(state: &AppState) -> Router<AppState> {
    use routes::{blog, feedback, featured_work, leads, services, settings, upload};

    Router::new()
        .route("/leads", get(leads::list_leads))
        .route("/leads/{id}", delete(leads::delete_lead))
        .route("/leads/{id}/status", patch(leads::update_status))
        .route(
            "/feedback",
            get(feedback::list_feedback).post(feedback::create_feedback),
        )
        .route(
            "/feedback/{id}",
            patch(feedback::update_feedback).delete(feedback::delete_feedback),
        )
        .route("/feedback/{id}/toggle-read", post(feedback::toggle_read))
        .route("/feedback/{id}/toggle-approved", post(feedback::toggle_approved))
        .route(
            "/services",
            get(services::list_services).post(services::create_service),
        )
        .route("/services/{id}", delete(services::delete_service))
        .route(
            "/featured-work",
            get(featured_work::list_featured_work).post(featured_work::create_featured_work),
        )
        .route(
            "/featured-work/{id}",
            patch(featured_work::update_featured_work).delete(featured_work::delete_featured_work),
        )
        .route("/blog", get(blog::list_all_posts).post(blog::create_post))
        .route(
            "/blog/{id}",
            get(blog::get_post_by_id)
                .patch(blog::update_post)
                .delete(blog::delete_post),
        )
        .route("/blog/{id}/toggle-published", post(blog::toggle_published))
        .route(
            "/settings/availability/toggle",
            post(settings::toggle_availability),
        )
        .route(
            "/uploads",
            post(upload::upload_image).layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_admin,
        ))
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    use routes::{auth, blog, featured_work, feedback, health, leads, services, settings};

    let cors = configure_cors(&state.config);
    let assets = ServeDir::new(state.config.static_dir.join("assets"));
    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .route("/api/leads", post(leads::submit_lead))
        .route("/api/services", get(services::list_services_public))
        .route("/api/featured-work", get(featured_work::list_featured_work_public))
        .route("/api/testimonials", get(feedback::list_testimonials))
        .route("/api/blog", get(blog::list_published_posts))
        .route("/api/blog/{slug}", get(blog::get_published_post))
        .route("/api/settings/availability", get(settings::get_availability))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/session", get(auth::session))
        .route("/health", get(health::health_ping))
        .route("/health/ready", get(health::health_ready))
        .nest("/api/admin", admin_router(&state))
        .nest_service("/assets", assets)
        .nest_service("/uploads", uploads)
        .fallback(pages::serve_page)
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
}

#[derive(Error, Debug)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn serve(config: AppConfig) -> Result<(), StartupError> {
    let addr = config.bind_addr()?;
    let backend = Backend::connect(&config).await?;
    let app = create_app(AppState::new(backend, config));

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

/// Run the server (used by main).
pub async fn run() -> ExitCode {
    dotenvy::dotenv().ok();

    // Held until return so buffered log lines are flushed.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("FATAL: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("FATAL: {}", e);
            ExitCode::FAILURE
        }
    }
}
