//! API layer - HTTP handlers and routing
//!
//! - `GET /api/v1/admin/export`: export download, behind the capability check
//! - `GET /api/v1/health`: content store reachability

pub mod export;
pub mod health;
pub mod middleware;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState};

/// Build the API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        .route("/admin/export", get(export::export_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_export_capability,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(admin_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: Option<&str>) -> Result<Router> {
    let mut router = Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = cors_origin {
        let origin = origin
            .parse::<HeaderValue>()
            .with_context(|| format!("Invalid CORS origin: {}", origin))?;
        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET])
            .allow_headers([header::AUTHORIZATION])
            .expose_headers([header::CONTENT_DISPOSITION]);
        router = router.layer(cors);
    }

    Ok(router.with_state(state))
}
