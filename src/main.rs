//! wxr-export - Filtered WordPress eXtended RSS export service

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wxr_export::{
    api::{self, AppState},
    config::Config,
    db::{self, SqlxContentRepository},
    export::{ExportHooks, Exporter},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wxr_export=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting wxr-export {}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = std::env::var("WXR_EXPORT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yml"));
    let config = Config::load_with_env(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    tracing::info!("Configuration loaded");

    if config.auth.export_token.is_none() {
        tracing::warn!("No export token configured; export requests will be refused");
    }

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let exporter = Exporter::new(
        SqlxContentRepository::boxed(pool.clone()),
        Arc::new(ExportHooks::new()),
        config.site.clone(),
        config.export.clone(),
    );

    let state = AppState {
        pool: pool.clone(),
        exporter: Arc::new(exporter),
        auth: Arc::new(config.auth.clone()),
    };

    // Build router
    let app = api::build_router(state, config.server.cors_origin.as_deref())?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
