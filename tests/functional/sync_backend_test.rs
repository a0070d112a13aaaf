//! Synchronous backend against a mocked provider

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use draw_gateway::backend::sync_backend::SyncHttpBackend;
use draw_gateway::backend::traits::ImageBackend;
use draw_gateway::config::SyncHttpConfig;
use draw_gateway::AppError;

fn backend_config(server: &MockServer) -> SyncHttpConfig {
    SyncHttpConfig {
        name: "siliconflow".to_string(),
        endpoint: format!("{}/v1/images/generations", server.uri()),
        api_key: "sk-test".to_string(),
        model: "flux-schnell".to_string(),
        timeout_ms: 2_000,
        max_retries: 3,
        retry_delay_ms: 0,
    }
}

fn generation_body(server: &MockServer) -> serde_json::Value {
    json!({
        "images": [{ "url": format!("{}/files/cat.png", server.uri()) }],
        "timings": { "inference": 2.5 }
    })
}

#[tokio::test]
async fn test_generate_downloads_image() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "flux-schnell",
            "prompt": "a fluffy cat",
            "image_size": "1024x1024",
            "num_inference_steps": 20
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(generation_body(&server)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/cat.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let backend = SyncHttpBackend::new(&backend_config(&server)).unwrap();
    let image = backend.generate("a fluffy cat", "1024x1024", 20).await.unwrap();

    assert_eq!(image.bytes, b"PNGDATA");
    assert!((image.inference_secs - 2.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_recovers_after_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(generation_body(&server)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/cat.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
        .mount(&server)
        .await;

    let backend = SyncHttpBackend::new(&backend_config(&server)).unwrap();
    let image = backend.generate("a cat", "1024x1024", 20).await.unwrap();
    assert_eq!(image.bytes, b"PNGDATA");
}

#[tokio::test]
async fn test_timeouts_exhaust_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(generation_body(&server))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let mut config = backend_config(&server);
    config.timeout_ms = 100;
    let backend = SyncHttpBackend::new(&config).unwrap();

    let err = backend.generate("a cat", "1024x1024", 20).await.unwrap_err();
    match err {
        AppError::ProviderUnavailable { backend, reason } => {
            assert_eq!(backend, "siliconflow");
            assert!(reason.contains("timed out"), "unexpected reason: {}", reason);
        }
        other => panic!("expected ProviderUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_image_is_download_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(generation_body(&server)))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/cat.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = backend_config(&server);
    config.max_retries = 2;
    let backend = SyncHttpBackend::new(&config).unwrap();

    let err = backend.generate("a cat", "1024x1024", 20).await.unwrap_err();
    assert!(matches!(err, AppError::DownloadFailed { .. }), "got {:?}", err);
    assert_eq!(err.abort_reason(), "download_failed");
}

#[tokio::test]
async fn test_empty_image_list_is_provider_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "images": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = backend_config(&server);
    config.max_retries = 1;
    let backend = SyncHttpBackend::new(&config).unwrap();

    let err = backend.generate("a cat", "1024x1024", 20).await.unwrap_err();
    assert!(matches!(err, AppError::ProviderUnavailable { .. }));
}
