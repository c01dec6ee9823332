use crate::detection::Detection;
use crate::detector::{Detector, DetectorOutcome};
use crate::overlay::{render_detections, LabelFont};
use crate::query_cache::QueryClient;
use crate::store::StoreHandle;
use crate::telemetry::Metrics;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Could not read the uploaded image: {0}")]
    Decode(image::ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),
    #[error("Scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Message shown next to a scan result.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanNotice {
    Demo,
    BackendError(String),
    TransportError(String),
}

impl ScanNotice {
    pub fn is_failure(&self) -> bool {
        !matches!(self, ScanNotice::Demo)
    }
}

#[derive(Debug, Clone)]
pub struct Scan {
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
    pub notice: Option<ScanNotice>,
    pub original_png: Bytes,
    pub annotated_png: Bytes,
}

impl Scan {
    pub fn is_demo(&self) -> bool {
        matches!(self.notice, Some(ScanNotice::Demo))
    }
}

pub fn scan_key(upload: &[u8]) -> String {
    hex::encode(Sha256::digest(upload))
}

pub struct ScanService {
    detector: Detector,
    font: Arc<LabelFont>,
    cache: Arc<QueryClient<Arc<Scan>>>,
    store: StoreHandle,
    metrics: Arc<Metrics>,
}

impl ScanService {
    pub fn new(
        detector: Detector,
        font: LabelFont,
        cache: Arc<QueryClient<Arc<Scan>>>,
        store: StoreHandle,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            detector,
            font: Arc::new(font),
            cache,
            store,
            metrics,
        }
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn cache(&self) -> &QueryClient<Arc<Scan>> {
        &self.cache
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// A previously produced scan, if it is still cached.
    pub fn lookup(&self, key: &str) -> Option<Arc<Scan>> {
        self.cache.get_fresh(key)
    }

    /// Decodes the upload, runs the detector and renders the overlay. Backend
    /// failures are reported on the returned scan rather than as errors.
    #[instrument(skip(self, upload), fields(bytes = upload.len()))]
    pub async fn scan(&self, upload: Bytes) -> Result<Arc<Scan>, ScanError> {
        let key = scan_key(&upload);
        if let Some(scan) = self.cache.get_fresh(&key) {
            tracing::debug!("Serving cached scan {}", key);
            self.metrics.record_scan_outcome("cached");
            return Ok(scan);
        }

        let (image, jpeg) = tokio::task::spawn_blocking(move || prepare_upload(&upload)).await??;

        let started = Instant::now();
        let outcome = self.detector.detect(jpeg).await;
        let detector_name = if self.detector.is_demo() { "demo" } else { "remote" };
        self.metrics
            .record_detection_duration(started.elapsed().as_millis() as u64, detector_name);

        let (detections, notice) = match outcome {
            Ok(DetectorOutcome::Detected { detections, demo }) => {
                (detections, demo.then_some(ScanNotice::Demo))
            }
            Ok(DetectorOutcome::Rejected(message)) => {
                tracing::warn!("Backend reported an error: {}", message);
                (Vec::new(), Some(ScanNotice::BackendError(message)))
            }
            Err(e) => {
                tracing::error!("Error calling backend: {}", e);
                (Vec::new(), Some(ScanNotice::TransportError(e.to_string())))
            }
        };

        let (width, height) = (image.width(), image.height());
        let font = self.font.clone();
        let to_render = detections.clone();
        let (original_png, annotated_png) = tokio::task::spawn_blocking(move || {
            let annotated = render_detections(&image, &to_render, &font);
            let original_png = encode(&image, ImageFormat::Png)?;
            let annotated_png = encode(&DynamicImage::ImageRgba8(annotated), ImageFormat::Png)?;
            Ok::<_, ScanError>((original_png, annotated_png))
        })
        .await??;

        let scan = Arc::new(Scan {
            key: key.clone(),
            width,
            height,
            detections,
            notice,
            original_png,
            annotated_png,
        });

        let failed = scan.notice.as_ref().is_some_and(ScanNotice::is_failure);
        self.metrics
            .record_scan_outcome(if failed { "failed" } else { detector_name });

        // Failed attempts are not cached so the next upload retries the backend.
        if !failed {
            self.cache.insert(key, scan.clone());
            self.record(&scan).await;
        }

        Ok(scan)
    }

    async fn record(&self, scan: &Arc<Scan>) {
        let Some(store) = self.store.get() else {
            tracing::debug!("Local store not ready, scan {} not recorded", scan.key);
            return;
        };
        let scan = scan.clone();
        let result = tokio::task::spawn_blocking(move || {
            store.record_scan(&scan.key, scan.is_demo(), &scan.detections)
        })
        .await;
        match result {
            Ok(Ok(id)) => tracing::debug!("Recorded scan as row {}", id),
            Ok(Err(e)) => tracing::error!("Failed to record scan: {}", e),
            Err(e) => tracing::error!("Failed to record scan: {}", e),
        }
    }
}

fn prepare_upload(upload: &[u8]) -> Result<(DynamicImage, Vec<u8>), ScanError> {
    let image = image::load_from_memory(upload).map_err(ScanError::Decode)?;
    let image = DynamicImage::ImageRgb8(image.to_rgb8());
    let jpeg = encode(&image, ImageFormat::Jpeg)?;
    Ok((image, jpeg.to_vec()))
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Bytes, ScanError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).map_err(ScanError::Encode)?;
    Ok(Bytes::from(buf.into_inner()))
}
