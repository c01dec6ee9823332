use crate::{
    config::Config,
    detector::Detector,
    overlay::LabelFont,
    query_cache::QueryClient,
    routes::api_routes,
    scan::ScanService,
    server::SharedState,
    store::StoreHandle,
    telemetry::{Metrics, TelemetryError},
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Everything the HTTP layer needs, wired once at startup.
pub struct AppShell {
    pub router: Router,
    pub state: SharedState,
    /// Background store initialization. Nothing waits on it during normal
    /// operation.
    pub store_init: JoinHandle<()>,
}

impl AppShell {
    /// Must be called from within a tokio runtime.
    pub fn bootstrap(config: &Config) -> Result<Self, TelemetryError> {
        let (store, store_init) = StoreHandle::spawn_init(config.store.path.clone());

        let cache = Arc::new(QueryClient::from_config(&config.cache));
        let metrics = Arc::new(Metrics::new()?);
        let detector = Detector::from_config(&config.backend);
        let font = LabelFont::load(&config.render);

        let scans = Arc::new(ScanService::new(
            detector,
            font,
            cache,
            store,
            metrics.clone(),
        ));

        let state = SharedState {
            scans,
            metrics,
            history_limit: config.store.history_limit,
        };

        let metrics_layer = HttpMetricsLayerBuilder::new().build();
        let router = Router::new()
            .merge(api_routes())
            .with_state(state.clone())
            .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
            .layer(metrics_layer);

        Ok(Self {
            router,
            state,
            store_init,
        })
    }
}
