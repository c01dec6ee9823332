use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    detector: String,
    store_ready: bool,
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    let detector = if state.scans.detector().is_demo() {
        "demo"
    } else {
        "remote"
    };
    Json(Status {
        status: "Available".into(),
        detector: detector.into(),
        store_ready: state.scans.store().is_ready(),
    })
}
