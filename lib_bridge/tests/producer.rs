use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, http::StatusCode, routing::get, routing::post};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use lib_bridge::ImageStore;
use lib_bridge::assets::AssetStore;
use lib_bridge::endpoints::{BridgeState, bridge_routes, host, router};
use lib_bridge::producer::{
    CameraViewSender, ClientError, ProducerSettings, SecondaryOutcome, SendError, StaticFrameSource,
};
use lib_bridge::relay::image::WireFormat;
use tempfile::TempDir;

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn bridge_state() -> (BridgeState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let assets = AssetStore::under(dir.path());
    assets.ensure_dirs().unwrap();
    (BridgeState::new(Arc::new(ImageStore::new()), assets), dir)
}

fn sender(addr: SocketAddr, node_id: &str) -> CameraViewSender {
    CameraViewSender::new(ProducerSettings {
        server_url: format!("http://{addr}"),
        node_id: node_id.to_string(),
        ..Default::default()
    })
    .unwrap()
}

fn red_frame() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([255, 0, 0])))
}

#[tokio::test]
async fn test_primary_and_secondary_succeed_on_full_host() {
    let (state, _dir) = bridge_state();
    let addr = spawn(router(state.clone(), 8 * 1024 * 1024)).await;

    let sender = sender(addr, "n1");
    sender.connect().await.unwrap();
    assert!(sender.is_connected());

    let receipt = sender.send_frame(&red_frame()).await.unwrap();
    assert_eq!(receipt.node_id, "n1");
    assert!(receipt.bytes_sent > 0);
    let stored = state.store.get("n1").unwrap();
    assert_eq!(stored.image.dimensions(), (64, 64));

    let outcome = receipt.secondary.await.unwrap();
    assert_eq!(
        outcome,
        SecondaryOutcome::Updated {
            image_path: "blender_camera.png".to_string()
        }
    );
    // receive, then update by reference
    assert_eq!(state.store.version(), 2);
}

#[tokio::test]
async fn test_secondary_failure_does_not_fail_send() {
    let (state, _dir) = bridge_state();
    let app = bridge_routes()
        .route("/system_stats", get(host::system_stats))
        .with_state(state.clone());
    let addr = spawn(app).await;

    let sender = sender(addr, "n1");
    sender.connect().await.unwrap();
    let receipt = sender.send_frame(&red_frame()).await.unwrap();

    let outcome = receipt.secondary.await.unwrap();
    assert!(matches!(outcome, SecondaryOutcome::UploadFailed(_)));
    assert!(!outcome.is_updated());
    assert!(state.store.contains("n1"));
}

#[tokio::test]
async fn test_primary_rejection_is_an_error() {
    let app = Router::new()
        .route("/system_stats", get(|| async { "{}" }))
        .route(
            "/blender/receive_image",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "{\"error\":\"boom\"}") }),
        );
    let addr = spawn(app).await;

    let sender = sender(addr, "n1");
    sender.connect().await.unwrap();
    let err = sender.send_frame(&red_frame()).await.unwrap_err();
    match err {
        SendError::Client(ClientError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("boom"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_node_key_is_sent_verbatim() {
    let (state, _dir) = bridge_state();
    let addr = spawn(router(state.clone(), 8 * 1024 * 1024)).await;

    let sender = sender(addr, " cam 1 ");
    sender.connect().await.unwrap();
    let receipt = sender.send_frame(&red_frame()).await.unwrap();
    assert_eq!(receipt.node_id, " cam 1 ");
    receipt.secondary.await.unwrap();

    assert!(state.store.contains(" cam 1 "));
    assert!(!state.store.contains("cam 1"));
    assert_eq!(state.store.len(), 1);
}

#[tokio::test]
async fn test_plain_text_success_from_host() {
    let app = Router::new()
        .route("/system_stats", get(|| async { "ok" }))
        .route("/blender/receive_image", post(|| async { "ok" }));
    let addr = spawn(app).await;

    let sender = sender(addr, "n1");
    sender.connect().await.unwrap();
    assert!(sender.is_connected());
    let receipt = sender.send_frame(&red_frame()).await.unwrap();
    assert_eq!(receipt.node_id, "n1");

    // No upload route on this host.
    let outcome = receipt.secondary.await.unwrap();
    assert!(matches!(outcome, SecondaryOutcome::UploadFailed(_)));
}

#[tokio::test]
async fn test_failed_connect_clears_connection() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sender = sender(addr, "n1");
    assert!(sender.connect().await.is_err());
    assert!(!sender.is_connected());
    assert!(matches!(
        sender.send_frame(&red_frame()).await,
        Err(SendError::NotConnected(_))
    ));
}

#[tokio::test]
async fn test_jpeg_send_from_frame_source() {
    let (state, _dir) = bridge_state();
    let addr = spawn(router(state.clone(), 8 * 1024 * 1024)).await;

    let sender = CameraViewSender::new(ProducerSettings {
        server_url: format!("http://{addr}"),
        node_id: "cam".to_string(),
        format: WireFormat::Jpeg,
        image_quality: 90,
        ..Default::default()
    })
    .unwrap();
    sender.connect().await.unwrap();

    let source = StaticFrameSource::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        16,
        8,
        Rgba([0, 0, 255, 255]),
    )));
    let receipt = sender.send_camera_view(&source).await.unwrap();
    let outcome = receipt.secondary.await.unwrap();
    assert_eq!(
        outcome,
        SecondaryOutcome::Updated {
            image_path: "blender_camera.jpg".to_string()
        }
    );

    let stored = state.store.get("cam").unwrap();
    assert_eq!(stored.image.dimensions(), (16, 8));
    let px = stored.image.pixels().get_pixel(8, 4).0;
    assert!(px[2] > 200 && px[0] < 40, "unexpected pixel {px:?}");
}
