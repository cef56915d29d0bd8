//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::handlers::{
    add_subtitles, api_schema, download_video, get_video, health, list_dead_letters, ready,
    render_video, trim_video, upload_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, propagate_request_id_layer, rate_limit_middleware, request_logging,
    security_headers, set_request_id_layer, ClientRateLimiter,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let video_routes = Router::new()
        .route("/video/upload", post(upload_video))
        .route("/video/:video_id", get(get_video))
        .route("/video/:video_id/trim", post(trim_video))
        .route("/video/:video_id/subtitles", post(add_subtitles))
        .route("/video/:video_id/render", post(render_video))
        .route("/video/:video_id/download", get(download_video));

    let admin_routes =
        Router::new().route("/admin/dead-letters/:kind", get(list_dead_letters));

    let rate_limiter = Arc::new(ClientRateLimiter::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(video_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let layout = state.layout().clone();

    Router::new()
        .route("/", get(|| async { "Welcome to the vedit video editing API" }))
        .route("/api-docs/schema.json", get(api_schema))
        .nest("/api", api_routes)
        .nest_service("/uploads", ServeDir::new(layout.uploads_dir()))
        .nest_service("/rendered", ServeDir::new(layout.rendered_dir()))
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads are streamed, so the limit replaces axum's 2MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
