use crate::backend::{BackendClient, BackendError};
use crate::config::BackendConfig;
use crate::detection::{demo_detections, Detection};

#[derive(Debug, Clone, PartialEq)]
pub enum DetectorOutcome {
    Detected {
        detections: Vec<Detection>,
        demo: bool,
    },
    /// The backend answered but reported an error of its own.
    Rejected(String),
}

/// Detection strategy, chosen once from configuration.
#[derive(Debug, Clone)]
pub enum Detector {
    Remote(BackendClient),
    Demo,
}

impl Detector {
    pub fn from_config(config: &BackendConfig) -> Self {
        match config.endpoint() {
            Some(endpoint) => {
                tracing::info!("Using remote detector at {}", endpoint);
                Detector::Remote(BackendClient::new(config))
            }
            None => {
                tracing::warn!("No backend URL set, using the demo detector");
                Detector::Demo
            }
        }
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, Detector::Demo)
    }

    pub async fn detect(&self, jpeg: Vec<u8>) -> Result<DetectorOutcome, BackendError> {
        let client = match self {
            Detector::Demo => {
                return Ok(DetectorOutcome::Detected {
                    detections: demo_detections(),
                    demo: true,
                })
            }
            Detector::Remote(client) => client,
        };

        match client.invoke_async(jpeg).await? {
            Some(result) => match result.reported_error() {
                Some(message) => Ok(DetectorOutcome::Rejected(message.to_string())),
                None => Ok(DetectorOutcome::Detected {
                    detections: result.results,
                    demo: false,
                }),
            },
            None => Ok(DetectorOutcome::Detected {
                detections: demo_detections(),
                demo: true,
            }),
        }
    }
}
