use crate::{routes::views, server::SharedState, store::StoreError};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn history(State(state): State<SharedState>) -> Result<Html<String>, StoreError> {
    state.metrics.record_request("/history");

    let Some(store) = state.scans.store().get() else {
        return Ok(Html(views::history_page(None)));
    };

    let limit = state.history_limit;
    let scans = tokio::task::spawn_blocking(move || store.recent_scans(limit)).await??;

    Ok(Html(views::history_page(Some(&scans))))
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        tracing::error!("Failed to read scan history: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(views::error_page(&format!("Something went wrong: {}", self))),
        )
            .into_response()
    }
}
