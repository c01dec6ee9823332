use crate::server::SharedState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn scan_image(
    State(state): State<SharedState>,
    Path((key, image)): Path<(String, String)>,
) -> Response {
    let Some(scan) = state.scans.lookup(&key) else {
        return (StatusCode::NOT_FOUND, "Scan not found").into_response();
    };

    let body = match image.as_str() {
        "original.png" => scan.original_png.clone(),
        "annotated.png" => scan.annotated_png.clone(),
        _ => return (StatusCode::NOT_FOUND, "Unknown image").into_response(),
    };

    ([(header::CONTENT_TYPE, "image/png")], body).into_response()
}
