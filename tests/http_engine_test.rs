//! Tests for the HTTP engine client against a stubbed sidecar

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use img_transform_gateway::config::EngineConfig;
use img_transform_gateway::engine::{
    http::HttpEngine, Device, EngineError, InferenceEngine, ModelParams,
};
use std::io::Cursor;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine_for(server: &MockServer) -> HttpEngine {
    HttpEngine::new(&EngineConfig {
        kind: img_transform_gateway::config::EngineKind::Http,
        endpoint: Some(server.uri()),
        timeout_ms: 5_000,
    })
    .unwrap()
}

fn params() -> ModelParams {
    ModelParams {
        num_inference_steps: 10,
        image_guidance_scale: 7.0,
    }
}

fn png_b64(width: u32, height: u32) -> String {
    let image = RgbImage::from_pixel(width, height, image::Rgb([7, 7, 7]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    STANDARD.encode(bytes)
}

async fn loaded(server: &MockServer) -> (HttpEngine, img_transform_gateway::engine::EngineHandle) {
    Mock::given(method("POST"))
        .and(path("/v1/models/load"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    let engine = engine_for(server);
    let handle = engine.load("ckpt", Device::Cpu).await.unwrap();
    (engine, handle)
}

#[tokio::test]
async fn test_run_round_trips_image() {
    let server = MockServer::start().await;
    let (engine, handle) = loaded(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/transform"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "image_b64": png_b64(5, 4) })),
        )
        .mount(&server)
        .await;

    let input = RgbImage::new(5, 4);
    let output = engine.run(&handle, &input, "night", &params()).await.unwrap();
    assert_eq!(output.dimensions(), (5, 4));
}

#[tokio::test]
async fn test_load_failure_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/models/load"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            serde_json::json!({ "message": "no such checkpoint" }),
        ))
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    let err = engine.load("missing", Device::Cpu).await.unwrap_err();
    assert!(matches!(err, EngineError::LoadFailed { .. }));
}

#[tokio::test]
async fn test_bad_request_maps_to_invalid_argument() {
    let server = MockServer::start().await;
    let (engine, handle) = loaded(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/transform"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            serde_json::json!({ "message": "bad shapes" }),
        ))
        .mount(&server)
        .await;

    let err = engine
        .run(&handle, &RgbImage::new(1, 1), "p", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_out_of_memory_maps_to_resource_exhausted() {
    let server = MockServer::start().await;
    let (engine, handle) = loaded(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/transform"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            serde_json::json!({ "code": "out_of_memory", "message": "CUDA OOM" }),
        ))
        .mount(&server)
        .await;

    let err = engine
        .run(&handle, &RgbImage::new(1, 1), "p", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ResourceExhausted(_)));
}

#[tokio::test]
async fn test_other_failures_map_to_runtime_failure() {
    let server = MockServer::start().await;
    let (engine, handle) = loaded(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/transform"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = engine
        .run(&handle, &RgbImage::new(1, 1), "p", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RuntimeFailure(_)));
}
