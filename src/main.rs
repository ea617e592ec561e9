//! MeshMart server

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshmart::{api, config::Config, db, services::UserService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshmart=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MeshMart...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    let state = api::build_state(pool, &config);
    state.upload_store.ensure_dirs().await?;
    tracing::info!("Upload root: {}", state.upload_store.root().display());

    spawn_session_purge(
        state.user_service.clone(),
        Duration::from_secs(config.session.purge_interval_seconds.max(1)),
    );

    let app = api::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically delete expired sessions.
fn spawn_session_purge(user_service: std::sync::Arc<UserService>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match user_service.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Purged expired sessions"),
                Err(e) => tracing::warn!("Session purge failed: {}", e),
            }
        }
    });
}
