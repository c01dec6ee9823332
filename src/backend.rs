use crate::config::BackendConfig;
use crate::detection::DetectionResult;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

pub const IMAGE_FIELD: &str = "image";
pub const UPLOAD_FILENAME: &str = "upload.jpg";
const FORM_BOUNDARY: &str = "safety-scanner-form-boundary";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("request to backend failed: {0}")]
    Transport(String),
    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("backend task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Client for the remote detection API.
#[derive(Clone, Debug)]
pub struct BackendClient {
    endpoint: Option<String>,
    agent: ureq::Agent,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            endpoint: config.endpoint().map(str::to_string),
            agent,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Posts `image_data` to the endpoint as a JPEG form upload.
    ///
    /// Returns `Ok(None)` without touching the network when no endpoint is
    /// configured. A single attempt is made.
    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub fn invoke(&self, image_data: &[u8]) -> Result<Option<DetectionResult>, BackendError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing::debug!("No backend endpoint configured, skipping request");
            return Ok(None);
        };

        let body = multipart_body(image_data);
        let response = self
            .agent
            .post(endpoint)
            .set("Content-Type", &multipart_content_type())
            .send_bytes(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => BackendError::Status(code),
                ureq::Error::Transport(transport) => BackendError::Transport(transport.to_string()),
            })?;

        let result: DetectionResult = serde_json::from_reader(response.into_reader())?;
        tracing::debug!("Backend returned {} detections", result.results.len());

        Ok(Some(result))
    }

    /// Runs [`BackendClient::invoke`] on the blocking pool.
    pub async fn invoke_async(
        &self,
        image_data: Vec<u8>,
    ) -> Result<Option<DetectionResult>, BackendError> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.invoke(&image_data)).await?
    }
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", FORM_BOUNDARY)
}

fn multipart_body(image_data: &[u8]) -> Vec<u8> {
    let part_header = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
        FORM_BOUNDARY, IMAGE_FIELD, UPLOAD_FILENAME
    );
    let mut body = part_header.into_bytes();
    body.extend_from_slice(image_data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", FORM_BOUNDARY).as_bytes());
    body
}
