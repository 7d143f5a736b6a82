//! HTTP adapter tests against the real router
//!
//! The router is served on an ephemeral port with a stub backend and exercised
//! with multipart requests from `reqwest`.

#![cfg(feature = "server")]

use bgremove_service::{
    config::ServerConfig,
    error::{RemovalError, Result},
    inference::InferenceBackend,
    models::ModelRegistry,
    processor::RemovalSession,
    server,
};
use image::{ColorType, DynamicImage, ImageFormat, RgbImage};
use ndarray::{Array4, ArrayD, IxDyn};
use reqwest::multipart::{Form, Part};
use std::sync::Arc;

/// Foreground on the right half of the model input
struct SplitOutput;

impl InferenceBackend for SplitOutput {
    fn infer(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        let (_, _, height, width) = input.dim();
        Ok(vec![ArrayD::from_shape_fn(IxDyn(&[1, 1, height, width]), |idx| {
            if idx[3] < width / 2 {
                -2.0
            } else {
                6.0
            }
        })])
    }

    fn name(&self) -> &str {
        "split"
    }
}

struct BrokenRuntime;

impl InferenceBackend for BrokenRuntime {
    fn infer(&self, _input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        Err(RemovalError::inference("runtime exploded"))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

async fn spawn_server<B: InferenceBackend + 'static>(backend: B, max_upload_bytes: usize) -> String {
    let descriptor = ModelRegistry::builtin().get("u2netp").unwrap();
    let session = Arc::new(RemovalSession::new(descriptor, backend).unwrap());
    let config = ServerConfig {
        max_upload_bytes,
        ..ServerConfig::default()
    };
    let app = server::router(session, &config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn png_upload(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([40, 90, 200])));
    let mut buffer = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

fn file_form(bytes: Vec<u8>) -> Form {
    Form::new().part(
        "file",
        Part::bytes(bytes)
            .file_name("upload.png")
            .mime_str("image/png")
            .unwrap(),
    )
}

async fn error_code(response: reqwest::Response) -> String {
    let body: serde_json::Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_remove_returns_png_cutout() {
    let base = spawn_server(SplitOutput, ServerConfig::DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/remove"))
        .multipart(file_form(png_upload(64, 32)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "image/png"
    );

    let bytes = response.bytes().await.unwrap();
    let output = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
    assert_eq!((output.width(), output.height()), (64, 32));
    assert_eq!(output.color(), ColorType::Rgba8);

    let rgba = output.to_rgba8();
    assert!(rgba.get_pixel(1, 16)[3] <= 10);
    assert!(rgba.get_pixel(62, 16)[3] >= 245);
}

#[tokio::test]
async fn test_only_mask_query_returns_grayscale() {
    let base = spawn_server(SplitOutput, ServerConfig::DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/remove?only_mask=true"))
        .multipart(file_form(png_upload(40, 40)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let bytes = response.bytes().await.unwrap();
    let output = image::load_from_memory(&bytes).unwrap();
    assert_eq!(output.color(), ColorType::L8);
    assert_eq!((output.width(), output.height()), (40, 40));
}

#[tokio::test]
async fn test_bgcolor_query_fills_background() {
    let base = spawn_server(SplitOutput, ServerConfig::DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/remove?bgcolor=255,0,0"))
        .multipart(file_form(png_upload(40, 20)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let rgba = image::load_from_memory(&response.bytes().await.unwrap())
        .unwrap()
        .to_rgba8();
    assert!(rgba.pixels().all(|p| p[3] == 255));
    assert!(rgba.get_pixel(0, 10)[0] >= 245);
}

#[tokio::test]
async fn test_missing_file_field_is_bad_request() {
    let base = spawn_server(SplitOutput, ServerConfig::DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/remove"))
        .multipart(Form::new().text("comment", "no image here"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "INVALID_INPUT");
}

#[tokio::test]
async fn test_undecodable_upload_is_bad_request() {
    let base = spawn_server(SplitOutput, ServerConfig::DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/remove"))
        .multipart(file_form(b"this is not an image".to_vec()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "IMAGE_DECODE_ERROR");
}

#[tokio::test]
async fn test_invalid_bgcolor_is_bad_request() {
    let base = spawn_server(SplitOutput, ServerConfig::DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/remove?bgcolor=300,0,0"))
        .multipart(file_form(png_upload(8, 8)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inference_failure_is_server_error() {
    let base = spawn_server(BrokenRuntime, ServerConfig::DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/remove"))
        .multipart(file_form(png_upload(8, 8)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(response).await, "INFERENCE_ERROR");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let base = spawn_server(SplitOutput, 1024).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/remove"))
        .multipart(file_form(vec![0u8; 8 * 1024]))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_health_reports_model() {
    let base = spawn_server(SplitOutput, ServerConfig::DEFAULT_MAX_UPLOAD_BYTES).await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: serde_json::Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "u2netp");
    assert_eq!(body["backend"], "split");
    assert!(body["timestamp"].is_string());
}
