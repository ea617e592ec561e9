//! API layer - HTTP handlers and routing
//!
//! All JSON endpoints live under `/api`; stored uploads are served from
//! `/uploads`.

pub mod admin;
pub mod auth;
pub mod categories;
pub mod common;
pub mod middleware;
pub mod models;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};
use tracing::warn;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAnalyticsRepository, SqlxCategoryRepository, SqlxModelRepository, SqlxSessionRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{CategoryService, ModelService, UploadStore, UserService};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Wire repositories, the cache and services into the shared state.
pub fn build_state(pool: DynDatabasePool, config: &Config) -> AppState {
    let cache = create_cache(&config.cache);

    let user_service = Arc::new(UserService::with_session_expiration(
        SqlxUserRepository::boxed(pool.clone()),
        SqlxSessionRepository::boxed(pool.clone()),
        config.session.expiration_days,
    ));
    let model_service = Arc::new(ModelService::new(
        SqlxModelRepository::boxed(pool.clone()),
        SqlxAnalyticsRepository::boxed(pool.clone()),
        cache.clone(),
    ));
    let category_service = Arc::new(CategoryService::new(
        SqlxCategoryRepository::boxed(pool.clone()),
        cache,
    ));

    AppState {
        pool,
        user_service,
        model_service,
        category_service,
        upload_store: Arc::new(UploadStore::from_config(&config.upload)),
        upload_config: Arc::new(config.upload.clone()),
    }
}

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = admin::router()
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Moderation queue (moderator or admin)
    let moderation_routes = admin::moderation_router()
        .route_layer(axum_middleware::from_fn(middleware::require_moderator))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .merge(auth::protected_router())
        .merge(models::protected_router())
        .merge(upload::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .merge(auth::public_router())
        .merge(models::public_router())
        .merge(categories::router())
        .merge(admin_routes)
        .merge(moderation_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(state.upload_config.request_body_limit()))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => warn!(origin = cors_origin, error = %e, "Invalid CORS origin, cross-origin requests disabled"),
    }

    let uploads = ServeDir::new(state.upload_store.root());

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .nest_service("/uploads", uploads)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_router(cors_origin: &str, upload_root: &std::path::Path) -> Router {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let mut config = Config::default();
        config.upload.path = upload_root.to_path_buf();
        build_router(build_state(pool, &config), cors_origin)
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router("http://localhost:5173", dir.path()).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/models")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5173"
        );
    }

    #[tokio::test]
    async fn test_invalid_cors_origin_still_serves() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_router("not\na header", dir.path()).await;

        let response = app
            .oneshot(Request::get("/api/categories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_uploads_are_served_from_upload_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("thumbnails")).unwrap();
        std::fs::write(dir.path().join("thumbnails/1-2.png"), b"png").unwrap();
        let app = test_router("http://localhost:5173", dir.path()).await;

        let found = app
            .clone()
            .oneshot(Request::get("/uploads/thumbnails/1-2.png").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);

        let missing = app
            .oneshot(Request::get("/uploads/thumbnails/none.png").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
