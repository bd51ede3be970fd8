//! REST surface of the monitor.

mod error;
mod routes;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use tgm_core::service::MonitorService;

pub use error::{ApiError, ApiResult};

pub const API_VERSION: &str = "1.0.0";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MonitorService>,
}

pub fn router(service: Arc<MonitorService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::root))
        .route("/status", get(routes::status))
        .route("/api/health", get(routes::health))
        .route("/api/posts", get(routes::posts))
        .route("/channels", get(routes::list_channels).post(routes::add_channel))
        .route("/channels/{username}", get(routes::channel_posts))
        .route("/refresh/{username}", get(routes::refresh_channel))
        .fallback(routes::no_route)
        .method_not_allowed_fallback(routes::wrong_method)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { service })
}
