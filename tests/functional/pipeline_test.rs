//! End-to-end draw pipeline scenarios

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use draw_gateway::backend::registry::BackendRegistry;
use draw_gateway::config::{
    AspectRatios, OptimizerFailurePolicy, ProviderConfig, QueueConfig, SyncHttpConfig,
};
use draw_gateway::error::FilterStage;
use draw_gateway::gateway::control::DrawControl;
use draw_gateway::gateway::orchestrator::Orchestrator;
use draw_gateway::gateway::request::DrawInput;
use draw_gateway::AppError;

use crate::support::{input, registry_with, settings, GatedBackend, StubBackend};

fn orchestrator(
    settings: &draw_gateway::config::Settings,
    registry: Arc<BackendRegistry>,
) -> Arc<Orchestrator> {
    let control = Arc::new(DrawControl::new(
        settings.draw.enabled,
        settings.draw.default_service.clone(),
    ));
    Arc::new(Orchestrator::new(settings, registry, control).unwrap())
}

async fn mount_optimizer(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_defaults_flow_through_to_provider() {
    let optimizer = MockServer::start().await;
    let provider = MockServer::start().await;
    mount_optimizer(&optimizer, "a small cat").await;

    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_partial_json(json!({
            "prompt": "a small cat",
            "image_size": "1024x1024",
            "num_inference_steps": 20
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{ "url": format!("{}/files/cat.png", provider.uri()) }],
            "timings": { "inference": 1.25 }
        })))
        .expect(1)
        .mount(&provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/cat.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
        .expect(1)
        .mount(&provider)
        .await;

    let mut settings = settings(&optimizer.uri());
    settings.draw.pipeline_deadline_ms = None;
    settings.providers = vec![ProviderConfig::SyncHttp(SyncHttpConfig {
        name: "stub".to_string(),
        endpoint: format!("{}/v1/images/generations", provider.uri()),
        api_key: "sk".to_string(),
        model: "flux-schnell".to_string(),
        timeout_ms: 2_000,
        max_retries: 2,
        retry_delay_ms: 0,
    })];

    let registry = Arc::new(BackendRegistry::new());
    registry.initialize_from_config(&settings.providers).unwrap();
    let orchestrator = orchestrator(&settings, registry);

    // derived from optimizer and provider budgets
    assert!(orchestrator.deadline().is_some());

    let result = orchestrator.draw(input("u1", "a cat")).await.unwrap();

    assert_eq!(result.image_bytes, b"PNGDATA");
    assert_eq!(result.original_prompt, "a cat");
    assert_eq!(result.optimized_prompt, "a small cat");
    assert_eq!(result.size, "1024x1024");
    assert_eq!(result.steps, 20);
    assert_eq!(result.service, "stub");
    assert!(!orchestrator.gate().is_busy());
}

#[tokio::test]
async fn test_slow_queue_job_fits_derived_deadline() {
    let provider = MockServer::start().await;
    let slow = Duration::from_millis(500);

    Mock::given(method("POST"))
        .and(path("/fal-ai/flux-pro"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "request_id": "req-1" }))
                .set_delay(slow),
        )
        .expect(1)
        .mount(&provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux-pro/requests/req-1/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "COMPLETED" }))
                .set_delay(slow),
        )
        .mount(&provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux-pro/requests/req-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "images": [{ "url": format!("{}/files/fox.jpg", provider.uri()) }]
                }))
                .set_delay(slow),
        )
        .mount(&provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/fox.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"JPEGDATA".to_vec())
                .set_delay(slow),
        )
        .mount(&provider)
        .await;

    let mut settings = settings("");
    settings.draw.pipeline_deadline_ms = None;
    settings.providers = vec![ProviderConfig::Queue(QueueConfig {
        name: "stub".to_string(),
        queue_base: provider.uri(),
        api_key: "fal".to_string(),
        model: "fal-ai/flux-pro".to_string(),
        enable_safety_checker: false,
        safety_tolerance: "5".to_string(),
        output_format: "jpeg".to_string(),
        sync_mode: true,
        aspect_ratios: AspectRatios::default(),
        poll_interval_ms: 10,
        timeout_ms: 600,
        max_retries: 1,
        retry_delay_ms: 0,
    })];

    let registry = Arc::new(BackendRegistry::new());
    registry.initialize_from_config(&settings.providers).unwrap();
    let orchestrator = orchestrator(&settings, registry);

    // every upstream call finishes inside its own timeout, four of them in a row
    assert_eq!(orchestrator.deadline(), Some(Duration::from_millis(2_400)));

    let result = orchestrator.draw(input("u1", "a red fox")).await.unwrap();
    assert_eq!(result.image_bytes, b"JPEGDATA");
    assert!(!orchestrator.gate().is_busy());
}

#[tokio::test]
async fn test_forbidden_keyword_never_reaches_upstream() {
    let optimizer = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&optimizer)
        .await;

    let backend = StubBackend::ok("stub", b"PNGDATA");
    let orchestrator = orchestrator(&settings(&optimizer.uri()), registry_with("stub", backend.clone()));

    let err = orchestrator
        .draw(input("u1", "draw some GORE please"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ContentRejected { stage: FilterStage::Raw }));
    assert_eq!(backend.calls(), 0);
    assert_eq!(orchestrator.cooldown().tracked_users(), 0);
}

#[tokio::test]
async fn test_optimized_prompt_is_filtered_again() {
    let optimizer = MockServer::start().await;
    mount_optimizer(&optimizer, "a knight covered in blood").await;

    let backend = StubBackend::ok("stub", b"PNGDATA");
    let orchestrator = orchestrator(&settings(&optimizer.uri()), registry_with("stub", backend.clone()));

    let err = orchestrator.draw(input("u1", "a knight")).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::ContentRejected { stage: FilterStage::Optimized }
    ));
    assert_eq!(backend.calls(), 0);
    assert!(!orchestrator.gate().is_busy());
}

#[tokio::test]
async fn test_optimizer_timeouts_release_the_gate() {
    let optimizer = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(6)
        .mount(&optimizer)
        .await;

    let mut settings = settings(&optimizer.uri());
    settings.optimizer.timeout_ms = 100;
    let backend = StubBackend::ok("stub", b"PNGDATA");
    let orchestrator = orchestrator(&settings, registry_with("stub", backend.clone()));

    let err = orchestrator.draw(input("u1", "a cat")).await.unwrap_err();
    assert!(matches!(err, AppError::OptimizationFailed(_)));
    assert!(!orchestrator.gate().is_busy());

    // same user: no cooldown was recorded and the gate is free again
    let err = orchestrator.draw(input("u1", "a cat")).await.unwrap_err();
    assert!(matches!(err, AppError::OptimizationFailed(_)), "got {:?}", err);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_fallback_policy_uses_raw_prompt() {
    let optimizer = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&optimizer)
        .await;

    let mut settings = settings(&optimizer.uri());
    settings.optimizer.on_failure = OptimizerFailurePolicy::FallbackToRaw;
    let backend = StubBackend::ok("stub", b"PNGDATA");
    let orchestrator = orchestrator(&settings, registry_with("stub", backend.clone()));

    let result = orchestrator.draw(input("u1", "a cat")).await.unwrap();

    assert_eq!(result.optimized_prompt, "a cat");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_second_request_is_busy_while_first_generates() {
    let backend = GatedBackend::new();
    let orchestrator = orchestrator(&settings(""), registry_with("stub", backend.clone()));

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.draw(input("alice", "a cat")).await }
    });
    backend.started.notified().await;
    assert!(orchestrator.gate().is_busy());

    // must be rejected immediately instead of queueing behind the first request
    let second = tokio::time::timeout(
        Duration::from_millis(500),
        orchestrator.draw(input("bob", "a dog")),
    )
    .await
    .expect("busy rejection should not wait");
    assert!(matches!(second, Err(AppError::ConcurrencyBusy)));

    backend.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.image_bytes, b"GATED");
    assert!(!orchestrator.gate().is_busy());
}

#[tokio::test]
async fn test_cooldown_after_success_only() {
    let backend = StubBackend::ok("stub", b"PNGDATA");
    let orchestrator = orchestrator(&settings(""), registry_with("stub", backend.clone()));

    orchestrator.draw(input("u1", "a cat")).await.unwrap();

    match orchestrator.draw(input("u1", "another cat")).await {
        Err(AppError::CooldownActive { remaining_secs }) => {
            assert!(remaining_secs > 0 && remaining_secs < 60)
        }
        other => panic!("expected CooldownActive, got {:?}", other),
    }

    // other users are unaffected
    orchestrator.draw(input("u2", "a dog")).await.unwrap();
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_provider_failure_records_no_cooldown() {
    let backend = StubBackend::failing("stub");
    let orchestrator = orchestrator(&settings(""), registry_with("stub", backend.clone()));

    for _ in 0..2 {
        let err = orchestrator.draw(input("u1", "a cat")).await.unwrap_err();
        assert_eq!(err.abort_reason(), "provider_error");
    }
    assert_eq!(backend.calls(), 2);
    assert_eq!(orchestrator.cooldown().tracked_users(), 0);
}

#[tokio::test]
async fn test_unknown_service_fails_before_the_gate() {
    let backend = StubBackend::ok("stub", b"PNGDATA");
    let orchestrator = orchestrator(&settings(""), registry_with("stub", backend.clone()));

    let err = orchestrator
        .draw(DrawInput {
            service: Some("nope".to_string()),
            ..input("u1", "a cat")
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UnknownServiceRequested(ref name) if name == "nope"));
    assert!(!orchestrator.gate().is_busy());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_disabled_drawing_rejects_everything() {
    let mut settings = settings("");
    settings.draw.enabled = false;
    let backend = StubBackend::ok("stub", b"PNGDATA");
    let orchestrator = orchestrator(&settings, registry_with("stub", backend.clone()));

    let err = orchestrator.draw(input("u1", "a cat")).await.unwrap_err();
    assert!(matches!(err, AppError::DrawingDisabled));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_unusable_size_and_steps_fall_back_to_defaults() {
    let orchestrator = orchestrator(&settings(""), registry_with("stub", StubBackend::ok("stub", b"x")));

    let result = orchestrator
        .draw(DrawInput {
            size: Some("panorama".to_string()),
            steps: Some(500),
            ..input("u1", "a cat")
        })
        .await
        .unwrap();
    assert_eq!(result.size, "1024x1024");
    assert_eq!(result.steps, 20);

    let err = orchestrator.draw(input("u2", "   ")).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_explicit_size_and_steps_are_forwarded() {
    let backend = StubBackend::ok("stub", b"PNGDATA");
    let orchestrator = orchestrator(&settings(""), registry_with("stub", backend));

    let result = orchestrator
        .draw(DrawInput {
            size: Some("portrait".to_string()),
            steps: Some(30),
            ..input("u1", "a tower")
        })
        .await
        .unwrap();

    assert_eq!(result.size, "576x1024");
    assert_eq!(result.steps, 30);
}

#[tokio::test]
async fn test_deadline_aborts_stuck_generation() {
    let mut settings = settings("");
    settings.draw.pipeline_deadline_ms = Some(100);
    let backend = GatedBackend::new();
    let orchestrator = orchestrator(&settings, registry_with("stub", backend));

    let err = orchestrator.draw(input("u1", "a cat")).await.unwrap_err();

    assert!(matches!(err, AppError::Timeout(_)));
    assert!(!orchestrator.gate().is_busy());
    assert_eq!(orchestrator.cooldown().tracked_users(), 0);
}
