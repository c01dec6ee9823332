mod focus;
mod health;
mod history;
mod metrics;
mod scan_image;
mod upload;
pub mod views;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(upload::index))
        .route("/scan", post(upload::scan_upload))
        .route("/scans/{key}/{image}", get(scan_image::scan_image))
        .route("/history", get(history::history))
        .route("/events/focus", post(focus::window_focus))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
