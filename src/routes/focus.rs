use crate::server::SharedState;
use axum::{extract::State, http::StatusCode};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn window_focus(State(state): State<SharedState>) -> StatusCode {
    let invalidated = state.scans.cache().on_window_focus();
    tracing::debug!("Window focus marked {} cached scans stale", invalidated);
    StatusCode::NO_CONTENT
}
