use crate::{
    backend::IMAGE_FIELD,
    routes::views,
    scan::ScanError,
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("No image was uploaded")]
    MissingImage,
    #[error("{0}")]
    Scan(#[from] ScanError),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match self {
            UploadError::Multipart(_) | UploadError::MissingImage => StatusCode::BAD_REQUEST,
            UploadError::Scan(ScanError::Decode(_)) => StatusCode::BAD_REQUEST,
            UploadError::Scan(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Html(views::error_page(&self.to_string()))).into_response()
    }
}

#[instrument(skip(state))]
pub async fn index(State(state): State<SharedState>) -> Html<String> {
    state.metrics.record_request("/");
    Html(views::index_page(
        state.scans.detector().is_demo(),
        state.scans.cache().refetch_on_focus(),
    ))
}

#[instrument(skip(state, multipart))]
pub async fn scan_upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Html<String>, UploadError> {
    state.metrics.record_request("/scan");

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            upload = Some(field.bytes().await?);
            break;
        }
    }
    let upload = upload
        .filter(|bytes| !bytes.is_empty())
        .ok_or(UploadError::MissingImage)?;

    let scan = state.scans.scan(upload).await?;
    tracing::info!(
        "Scan {} produced {} detections",
        scan.key,
        scan.detections.len()
    );

    Ok(Html(views::scan_page(
        &scan,
        state.scans.cache().refetch_on_focus(),
    )))
}
