use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use safety_scanner::{
    backend::{BackendClient, BackendError},
    config::{
        BackendConfig, CacheConfig, Config, LogLevel, RenderConfig, ServerConfig, StoreConfig,
    },
    detection::demo_detections,
    overlay::{PixelRect, OUTLINE_COLOR},
    scan::scan_key,
    server::HttpServer,
    shell::AppShell,
};
use serde_json::{json, Value};
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::{net::TcpListener, sync::broadcast};

const BOUNDARY: &str = "scan-flow-test-boundary";

#[derive(Clone)]
struct StubBackend {
    status: StatusCode,
    body: Value,
    calls: Arc<AtomicUsize>,
}

async fn stub_detect(State(stub): State<StubBackend>, mut multipart: Multipart) -> Response {
    stub.calls.fetch_add(1, Ordering::SeqCst);
    let Ok(Some(field)) = multipart.next_field().await else {
        return (StatusCode::BAD_REQUEST, "missing field").into_response();
    };
    let well_formed = field.name() == Some("image")
        && field.file_name() == Some("upload.jpg")
        && field.content_type() == Some("image/jpeg");
    let Ok(data) = field.bytes().await else {
        return (StatusCode::BAD_REQUEST, "unreadable field").into_response();
    };
    if !well_formed || image::guess_format(&data).ok() != Some(ImageFormat::Jpeg) {
        return (StatusCode::BAD_REQUEST, "expected a jpeg upload").into_response();
    }
    (stub.status, Json(stub.body.clone())).into_response()
}

async fn spawn_stub_backend(status: StatusCode, body: Value) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let stub = StubBackend {
        status,
        body,
        calls: calls.clone(),
    };
    let router = Router::new()
        .route("/api/detect", post(stub_detect))
        .with_state(stub);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}/api/detect", addr), calls)
}

fn test_config(backend_url: Option<String>, store_dir: &Path) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            max_upload_bytes: 10 * 1024 * 1024,
        },
        log_level: LogLevel::Info,
        backend: BackendConfig {
            url: backend_url,
            timeout_secs: 5,
        },
        render: RenderConfig {
            font_paths: vec![],
            font_size: 14.0,
        },
        cache: CacheConfig::default(),
        store: StoreConfig {
            path: store_dir.join("scans.sqlite"),
            history_limit: 10,
        },
    }
}

struct TestApp {
    addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
}

impl TestApp {
    async fn start(config: &Config) -> (Self, AppShell) {
        let shell = AppShell::bootstrap(config).unwrap();
        let server = HttpServer::new(shell.router.clone(), &config.server)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown, rx) = broadcast::channel(1);
        server.run(rx).await.unwrap();
        (Self { addr, shutdown }, shell)
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

fn png_upload(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 200) as u8, (y % 200) as u8, 40]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn form_body(field: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"site.png\"\r\nContent-Type: image/png\r\n\r\n",
        BOUNDARY, field
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn into_parts(result: Result<ureq::Response, ureq::Error>) -> (u16, Vec<u8>) {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(e) => panic!("request failed: {}", e),
    };
    let status = response.status();
    let mut body = Vec::new();
    response.into_reader().read_to_end(&mut body).unwrap();
    (status, body)
}

async fn upload(url: String, field: &'static str, data: Vec<u8>) -> (u16, String) {
    tokio::task::spawn_blocking(move || {
        let result = ureq::post(&url)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .send_bytes(&form_body(field, &data));
        let (status, body) = into_parts(result);
        (status, String::from_utf8(body).unwrap())
    })
    .await
    .unwrap()
}

async fn get(url: String) -> (u16, Vec<u8>) {
    tokio::task::spawn_blocking(move || into_parts(ureq::get(&url).call()))
        .await
        .unwrap()
}

async fn get_png(app: &TestApp, key: &str, name: &str) -> DynamicImage {
    let (status, body) = get(app.url(&format!("/scans/{}/{}", key, name))).await;
    assert_eq!(status, 200);
    image::load_from_memory_with_format(&body, ImageFormat::Png).unwrap()
}

fn detection_count(page: &str) -> usize {
    page.matches("class=\"detection\"").count()
}

#[tokio::test(flavor = "multi_thread")]
async fn demo_mode_shows_two_canned_detections() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(None, dir.path());
    let (app, _shell) = TestApp::start(&config).await;

    let (status, index) = get(app.url("/")).await;
    assert_eq!(status, 200);
    assert!(String::from_utf8(index).unwrap().contains("No backend URL set"));

    let (width, height) = (320, 200);
    let data = png_upload(width, height);
    let (status, page) = upload(app.url("/scan"), "image", data.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(detection_count(&page), 2);
    assert!(page.contains("<strong>hardhat</strong> 92.0%"));
    assert!(page.contains("<strong>person</strong> 88.0%"));
    assert!(page.contains("showing demo detection (not real)"));
    assert!(page.contains("Demo Detections"));

    let annotated = get_png(&app, &scan_key(&data), "annotated.png").await.to_rgba8();
    assert_eq!(annotated.dimensions(), (width, height));
    for detection in demo_detections() {
        let rect = PixelRect::from_normalized(&detection.bbox.unwrap(), width, height);
        let mid_y = (rect.y + rect.height / 2) as u32;
        assert_eq!(*annotated.get_pixel(rect.x as u32, mid_y), OUTLINE_COLOR);
        assert_eq!(*annotated.get_pixel(rect.right() as u32, mid_y), OUTLINE_COLOR);
        assert_eq!(
            *annotated.get_pixel(rect.x as u32 + rect.width as u32 / 2, rect.bottom() as u32),
            OUTLINE_COLOR
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_backend_result_leaves_image_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (endpoint, calls) = spawn_stub_backend(StatusCode::OK, json!({ "results": [] })).await;
    let config = test_config(Some(endpoint), dir.path());
    let (app, _shell) = TestApp::start(&config).await;

    let data = png_upload(120, 90);
    let (status, page) = upload(app.url("/scan"), "image", data.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(detection_count(&page), 0);
    assert!(!page.contains("demo detection"));

    let key = scan_key(&data);
    let original = get_png(&app, &key, "original.png").await.to_rgba8();
    let annotated = get_png(&app, &key, "annotated.png").await.to_rgba8();
    assert_eq!(original, annotated);
}

#[tokio::test(flavor = "multi_thread")]
async fn backend_detections_are_drawn_and_listed() {
    let dir = tempfile::tempdir().unwrap();
    let body = json!({
        "results": [
            { "label": "vest", "confidence": 0.5, "box": { "x": 0.25, "y": 0.5, "w": 0.5, "h": 0.25 } },
            { "label": "goggles", "confidence": 0.75 }
        ]
    });
    let (endpoint, calls) = spawn_stub_backend(StatusCode::OK, body).await;
    let config = test_config(Some(endpoint), dir.path());
    let (app, _shell) = TestApp::start(&config).await;

    let data = png_upload(200, 200);
    let (status, page) = upload(app.url("/scan"), "image", data.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(detection_count(&page), 2);
    assert!(page.contains("<strong>vest</strong> 50.0%"));
    assert!(page.contains("<strong>goggles</strong> 75.0%"));

    let annotated = get_png(&app, &scan_key(&data), "annotated.png").await.to_rgba8();
    assert_eq!(*annotated.get_pixel(50, 125), OUTLINE_COLOR);
    assert_eq!(*annotated.get_pixel(150, 125), OUTLINE_COLOR);
    assert_ne!(*annotated.get_pixel(100, 125), OUTLINE_COLOR);

    // A second upload of the same bytes is served from the query cache.
    let (status, _) = upload(app.url("/scan"), "image", data).await;
    assert_eq!(status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn backend_http_500_is_a_visible_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (endpoint, calls) = spawn_stub_backend(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "detail": "boom" }),
    )
    .await;
    let config = test_config(Some(endpoint), dir.path());
    let (app, _shell) = TestApp::start(&config).await;

    let data = png_upload(64, 64);
    let (status, page) = upload(app.url("/scan"), "image", data.clone()).await;
    assert_eq!(status, 200);
    assert!(page.contains("Error calling backend"));
    assert!(page.contains("500"));
    assert_eq!(detection_count(&page), 0);

    // Failures are not cached, so the next attempt reaches the backend again.
    let _ = upload(app.url("/scan"), "image", data).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn backend_reported_error_is_distinct_from_transport_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (endpoint, _) =
        spawn_stub_backend(StatusCode::OK, json!({ "error": "model offline" })).await;
    let config = test_config(Some(endpoint), dir.path());
    let (app, _shell) = TestApp::start(&config).await;

    let (status, page) = upload(app.url("/scan"), "image", png_upload(32, 32)).await;
    assert_eq!(status, 200);
    assert!(page.contains("Backend error: model offline"));
    assert!(!page.contains("Error calling backend"));
    assert_eq!(detection_count(&page), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn backend_client_reports_status_failure() {
    let (endpoint, _) =
        spawn_stub_backend(StatusCode::INTERNAL_SERVER_ERROR, json!({})).await;
    let client = BackendClient::new(&BackendConfig::with_url(endpoint));
    let jpeg = {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    };
    let err = client.invoke_async(jpeg).await.unwrap_err();
    assert!(matches!(err, BackendError::Status(500)));
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_uploads_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(None, dir.path());
    let (app, _shell) = TestApp::start(&config).await;

    let (status, page) = upload(app.url("/scan"), "image", b"not an image".to_vec()).await;
    assert_eq!(status, 400);
    assert!(page.contains("Could not read the uploaded image"));

    let (status, page) = upload(app.url("/scan"), "photo", png_upload(8, 8)).await;
    assert_eq!(status, 400);
    assert!(page.contains("No image was uploaded"));

    let (status, _) = get(app.url("/scans/unknown/annotated.png")).await;
    assert_eq!(status, 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn scans_are_recorded_once_store_is_ready() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(None, dir.path());
    let (app, shell) = TestApp::start(&config).await;
    shell.store_init.await.unwrap();

    let data = png_upload(48, 48);
    let (status, _) = upload(app.url("/scan"), "image", data.clone()).await;
    assert_eq!(status, 200);

    let (status, history) = get(app.url("/history")).await;
    assert_eq!(status, 200);
    let history = String::from_utf8(history).unwrap();
    assert!(history.contains(&scan_key(&data)[..12]));
    assert!(history.contains("(demo): hardhat 92.0%, person 88.0%"));

    let (status, health) = get(app.url("/health")).await;
    assert_eq!(status, 200);
    let health: Value = serde_json::from_slice(&health).unwrap();
    assert_eq!(health["detector"], "demo");
    assert_eq!(health["store_ready"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn store_failure_does_not_block_scanning() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(None, dir.path());
    config.store.path = dir.path().join("no").join("such").join("dir.sqlite");
    let (app, shell) = TestApp::start(&config).await;
    shell.store_init.await.unwrap();

    let (status, page) = upload(app.url("/scan"), "image", png_upload(16, 16)).await;
    assert_eq!(status, 200);
    assert_eq!(detection_count(&page), 2);

    let (status, history) = get(app.url("/history")).await;
    assert_eq!(status, 200);
    assert!(String::from_utf8(history)
        .unwrap()
        .contains("Local store unavailable"));
}
