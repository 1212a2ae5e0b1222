//! Integration tests for the dermacam HTTP service.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use burn::prelude::*;
use dermacam_core::backend::{GradBackend, NdArray};
use dermacam_core::{
    ClassProbabilities, ImageTensor, LayerCapture, LesionClassifier, PixelScale, NUM_CLASSES,
};
use dermacam_models::{DermNetClassifier, DermNetConfig};
use dermacam_serve::{router, DiagnosisService, ServeConfig, ServerState};
use image::{ImageFormat, Rgb, RgbImage};
use reqwest::multipart::{Form, Part};
use tokio::net::TcpListener;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn small_classifier() -> DermNetClassifier<GradBackend> {
    let config = DermNetConfig::default()
        .with_filters(vec![4, 8])
        .with_hidden(vec![16])
        .with_target_layer("block2");
    DermNetClassifier::from_config(&config, &Default::default()).unwrap()
}

async fn spawn_with(service: DiagnosisService, config: ServeConfig) -> SocketAddr {
    let state = Arc::new(ServerState::new(config, service));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

async fn spawn_test_server(config: ServeConfig) -> SocketAddr {
    let service = DiagnosisService::from_dermnet(small_classifier(), &config).unwrap();
    spawn_with(service, config).await
}

fn png(image: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn gray_png() -> Vec<u8> {
    png(&RgbImage::from_pixel(50, 50, Rgb([128, 128, 128])))
}

fn gradient_png() -> Vec<u8> {
    png(&RgbImage::from_fn(80, 60, |x, y| {
        Rgb([(x * 3) as u8, (y * 4) as u8, 200])
    }))
}

async fn post_image(addr: SocketAddr, field: &str, bytes: Vec<u8>) -> reqwest::Response {
    let form = Form::new().part(field.to_string(), Part::bytes(bytes).file_name("lesion.png"));
    reqwest::Client::new()
        .post(format!("http://{}/predict", addr))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

/// Classifier that takes longer than any test deadline.
struct SlowClassifier;

impl LesionClassifier<NdArray> for SlowClassifier {
    fn input_scale(&self) -> PixelScale {
        PixelScale::Unit
    }

    fn target_layer(&self) -> &str {
        "block4"
    }

    fn predict(&self, _image: &ImageTensor) -> dermacam_core::Result<ClassProbabilities> {
        std::thread::sleep(Duration::from_millis(500));
        ClassProbabilities::new(&[1.0 / NUM_CLASSES as f32; NUM_CLASSES])
    }

    fn forward_with_gradient(
        &self,
        image: &ImageTensor,
    ) -> dermacam_core::Result<LayerCapture<NdArray>> {
        let probabilities = self.predict(image)?;
        let zeros = Tensor::<NdArray, 4>::zeros([1, 2, 7, 7], &Default::default());
        LayerCapture::new(
            "block4",
            zeros.clone(),
            zeros,
            probabilities.argmax(),
            probabilities,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_endpoint() {
    let addr = spawn_test_server(ServeConfig::default()).await;

    let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["target_layer"], "block2");
    assert_eq!(body["weights"], "fresh");
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
async fn test_predict_gray_square() {
    let addr = spawn_test_server(ServeConfig::default()).await;

    let resp = post_image(addr, "image", gray_png()).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();

    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    let probs: Vec<f64> = predictions
        .iter()
        .map(|p| p["probability"].as_f64().unwrap())
        .collect();
    assert!(probs.windows(2).all(|w| w[0] >= w[1]));
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    let labels: Vec<&str> = predictions
        .iter()
        .map(|p| p["class"].as_str().unwrap())
        .collect();
    assert!(labels.iter().all(|l| !l.is_empty()));
    assert_ne!(labels[0], labels[1]);
    assert_ne!(labels[1], labels[2]);

    let heatmap = body["explanations"]["grad_cam"].as_array().unwrap();
    assert_eq!(heatmap.len(), 224);
    let mut max = 0.0f64;
    for row in heatmap {
        let row = row.as_array().unwrap();
        assert_eq!(row.len(), 224);
        for v in row {
            let v = v.as_f64().unwrap();
            assert!((0.0..=1.0).contains(&v));
            max = max.max(v);
        }
    }
    assert!(max == 0.0 || max == 1.0);

    let visualization = body["explanations"]["visualization"].as_str().unwrap();
    assert!(!visualization.is_empty());
    assert!(!visualization.starts_with("data:"));
}

#[tokio::test]
async fn test_empty_upload_is_bad_request() {
    let addr = spawn_test_server(ServeConfig::default()).await;

    let resp = post_image(addr, "image", Vec::new()).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().is_some());
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_missing_field_is_bad_request() {
    let addr = spawn_test_server(ServeConfig::default()).await;

    let resp = post_image(addr, "file", gray_png()).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No image uploaded");
}

#[tokio::test]
async fn test_garbage_upload_is_server_error() {
    let addr = spawn_test_server(ServeConfig::default()).await;

    let resp = post_image(addr, "image", b"this is not an image".to_vec()).await;
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Failed to decode image");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_error_details_when_enabled() {
    let addr = spawn_test_server(ServeConfig::default().with_error_details(true)).await;

    let resp = post_image(addr, "image", b"this is not an image".to_vec()).await;
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    let details = body["details"].as_str().unwrap();
    assert!(details.starts_with("Failed to decode image"));
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let addr = spawn_test_server(ServeConfig::default().with_max_upload_bytes(1024)).await;

    let resp = post_image(addr, "image", vec![0u8; 8 * 1024]).await;
    assert_eq!(resp.status(), 413);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_timeout_returns_gateway_timeout() {
    let config = ServeConfig::default().with_request_timeout(Duration::from_millis(50));
    let service = DiagnosisService::new(Box::new(SlowClassifier), &config, "fresh").unwrap();
    let addr = spawn_with(service, config).await;

    let resp = post_image(addr, "image", gray_png()).await;
    assert_eq!(resp.status(), 504);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_concurrent_requests_match_sequential() {
    let addr = spawn_test_server(ServeConfig::default()).await;

    let sequential_a: serde_json::Value = post_image(addr, "image", gray_png())
        .await
        .json()
        .await
        .unwrap();
    let sequential_b: serde_json::Value = post_image(addr, "image", gradient_png())
        .await
        .json()
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        post_image(addr, "image", gray_png()),
        post_image(addr, "image", gradient_png()),
    );
    let concurrent_a: serde_json::Value = a.json().await.unwrap();
    let concurrent_b: serde_json::Value = b.json().await.unwrap();

    assert_eq!(sequential_a, concurrent_a);
    assert_eq!(sequential_b, concurrent_b);
}
