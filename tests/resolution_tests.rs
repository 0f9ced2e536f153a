/// End-to-end tests: mock Tailscale API, resolver, and annotated router
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tailnet_auth::{
    config::TailnetConfig, context::AppContext, server::build_router, Device, DirectorySnapshot,
    ResolutionCache, SnapshotStore,
};
use tempfile::tempdir;

const DATE: &str = "Mon, 02 Jun 2025 10:00:00 GMT";

/// Stand-in for the Tailscale devices endpoint
#[derive(Clone, Default)]
struct MockDirectory {
    calls: Arc<AtomicUsize>,
    devices: Arc<Mutex<Value>>,
    failing: Arc<Mutex<bool>>,
}

impl MockDirectory {
    fn set_devices(&self, devices: Value) {
        *self.devices.lock().unwrap() = devices;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn list_devices(State(mock): State<MockDirectory>) -> axum::response::Response {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    if *mock.failing.lock().unwrap() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let devices = mock.devices.lock().unwrap().clone();
    ([(header::DATE, DATE)], Json(json!({ "devices": devices }))).into_response()
}

async fn spawn(router: Router, connect_info: bool) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if connect_info {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        } else {
            axum::serve(listener, router).await.unwrap();
        }
    });
    format!("http://{}", addr)
}

async fn spawn_directory(mock: MockDirectory) -> String {
    spawn(
        Router::new()
            .route("/api/v2/tailnet/:tailnet/devices", get(list_devices))
            .with_state(mock),
        false,
    )
    .await
}

fn config(api_url: String, cache_file: std::path::PathBuf) -> TailnetConfig {
    let mut config = TailnetConfig::new("tskey-test", "example.com");
    config.directory.api_base_url = api_url;
    config.directory.cache_file = cache_file;
    config
}

async fn whoami(app: &str, client_ip: &str) -> Value {
    reqwest::Client::new()
        .get(format!("{}/whoami", app))
        .header("X-Forwarded-For", client_ip)
        .header("X-Tailscale-Device-ID", "forged")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_hit_then_miss_then_refresh() {
    let dir = tempdir().unwrap();
    let cache_file = dir.path().join("devices.json");

    // Warm snapshot on disk with one device
    SnapshotStore::new(&cache_file)
        .save(&DirectorySnapshot::from_devices(
            vec![Device {
                id: "d1".to_string(),
                addresses: vec!["100.64.0.5".to_string()],
                authorized: Some(true),
                ..Device::default()
            }],
            DATE,
        ))
        .await
        .unwrap();

    let mock = MockDirectory::default();
    mock.set_devices(json!([
        { "id": "d1", "addresses": ["100.64.0.5"], "authorized": true },
        { "id": "d2", "addresses": ["100.64.0.9"], "authorized": false, "hostname": "ci-runner" }
    ]));
    let api_url = spawn_directory(mock.clone()).await;

    let ctx = AppContext::new(config(api_url, cache_file.clone())).await.unwrap();
    let resolver = Arc::clone(&ctx.resolver);
    let app = spawn(build_router(ctx), true).await;

    let known = whoami(&app, "100.64.0.5").await;
    assert_eq!(known["headers"]["x-tailscale-device-id"], "d1");
    assert_eq!(known["headers"]["x-tailscale-device-authorized"], "true");
    assert_eq!(mock.calls(), 0);

    let fresh = whoami(&app, "100.64.0.9").await;
    assert_eq!(fresh["headers"]["x-tailscale-device-id"], "d2");
    assert_eq!(fresh["headers"]["x-tailscale-device-authorized"], "false");
    assert_eq!(fresh["headers"]["x-tailscale-device-addresses"], "100.64.0.9");
    assert_eq!(fresh["headers"]["x-tailscale-device-hostname"], "ci-runner");
    assert!(fresh["headers"].get("x-tailscale-device-tags").is_none());
    assert_eq!(fresh["device"]["id"], "d2");
    assert_eq!(mock.calls(), 1);

    // The refreshed directory reached the disk
    resolver.persist_pending().await;
    let on_disk = SnapshotStore::new(&cache_file).load().await.unwrap();
    assert_eq!(on_disk.get("100.64.0.9").unwrap().id, "d2");
    assert_eq!(on_disk.last_update(), DATE);
}

#[tokio::test]
async fn test_unknown_address_passes_through_unannotated() {
    let dir = tempdir().unwrap();
    let mock = MockDirectory::default();
    mock.set_devices(json!([]));
    let api_url = spawn_directory(mock.clone()).await;

    let ctx = AppContext::new(config(api_url, dir.path().join("devices.json")))
        .await
        .unwrap();
    let app = spawn(build_router(ctx), true).await;

    let body = whoami(&app, "100.64.0.77").await;
    assert_eq!(body["headers"], json!({}));
    assert!(body["device"].is_null());
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_directory_outage_does_not_fail_requests() {
    let dir = tempdir().unwrap();
    let mock = MockDirectory::default();
    *mock.failing.lock().unwrap() = true;
    let api_url = spawn_directory(mock.clone()).await;

    let ctx = AppContext::new(config(api_url, dir.path().join("devices.json")))
        .await
        .unwrap();
    let app = spawn(build_router(ctx), true).await;

    let response = reqwest::Client::new()
        .get(format!("{}/whoami", app))
        .header("X-Real-IP", "100.64.0.5")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["headers"], json!({}));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_restart_starts_warm() {
    let dir = tempdir().unwrap();
    let cache_file = dir.path().join("state").join("devices.json");
    let mock = MockDirectory::default();
    mock.set_devices(json!([{ "id": "d2", "addresses": ["100.64.0.9"], "authorized": true }]));
    let api_url = spawn_directory(mock.clone()).await;

    let first = ResolutionCache::from_config(&config(api_url.clone(), cache_file.clone())).unwrap();
    first.warm_start().await;
    assert_eq!(first.resolve("100.64.0.9").await.unwrap().unwrap().id, "d2");
    first.persist_pending().await;
    assert_eq!(mock.calls(), 1);

    let second = ResolutionCache::from_config(&config(api_url, cache_file)).unwrap();
    second.warm_start().await;
    assert_eq!(second.resolve("100.64.0.9").await.unwrap().unwrap().id, "d2");
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_health_is_not_annotated() {
    let dir = tempdir().unwrap();
    let mock = MockDirectory::default();
    let api_url = spawn_directory(mock.clone()).await;

    let ctx = AppContext::new(config(api_url, dir.path().join("devices.json")))
        .await
        .unwrap();
    let app = spawn(build_router(ctx), true).await;

    let body: Value = reqwest::get(format!("{}/health", app))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mode"], "cached");
    assert_eq!(body["snapshot"]["addresses"], 0);
    assert_eq!(mock.calls(), 0);
}
