//! HTTP tests for the discovery endpoints, run against mock sources.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use lead_discovery::{
    Configuration, DiscoveryPipeline, LeadSource, ManualClock, MemoryStore, MockSource,
    MockTransport, PipelineSettings, SourceKind,
};
use serde_json::Value;
use server_core::server::build_app;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    pipeline: Arc<DiscoveryPipeline>,
}

async fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let pipeline = DiscoveryPipeline::builder(store.clone(), store.clone())
        .settings(PipelineSettings::default().with_enrichment(false))
        .clock(Arc::new(ManualClock::default()))
        .transport(Arc::new(MockTransport::new()))
        .sources(vec![Arc::new(MockSource::new(SourceKind::Tavily).with_hit(
            "Hyatt plans 150-room hotel in Denver, CO",
            "https://news.example.com/hyatt-denver",
            "Hyatt Hotels Corporation is developing a 150-room hotel.",
        )) as Arc<dyn LeadSource>])
        .build()
        .await
        .unwrap();
    let pipeline = Arc::new(pipeline);
    TestApp {
        router: build_app(pipeline.clone(), &[]),
        store,
        pipeline,
    }
}

async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn wait_for_stage(app: &TestApp, job_id: &str, stage: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(
            &app.router,
            Method::GET,
            &format!("/api/discovery/jobs/{}", job_id),
        )
        .await;
        if status == StatusCode::OK && body["stage"] == stage {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached {}", job_id, stage);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_now_returns_accepted_with_job_id() {
    let app = test_app().await;
    let owner = Uuid::new_v4();
    let config = Configuration::new(owner, "Hotels", ["hotel", "construction"])
        .with_sources([SourceKind::Tavily]);
    app.store.insert_configuration(config.clone());

    let (status, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/discovery/configurations/{}/run", config.id),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["jobId"].as_str().unwrap().to_string();
    assert!(job_id.starts_with("config-"));
    assert_eq!(body["configSummary"]["name"], "Hotels");
    assert_eq!(body["configSummary"]["keywords"][1], "construction");

    let progress = wait_for_stage(&app, &job_id, "completed").await;
    assert_eq!(progress["percentage"], 100);

    let (status, jobs) = send(
        &app.router,
        Method::GET,
        &format!("/api/discovery/users/{}/jobs", owner),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert_eq!(jobs[0]["id"], job_id.as_str());
    assert_eq!(jobs[0]["summary"]["savedLeads"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_now_error_statuses() {
    let app = test_app().await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/discovery/configurations/{}/run", Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let owner = Uuid::new_v4();
    let empty = Configuration::new(owner, "Empty", Vec::<String>::new());
    app.store.insert_configuration(empty.clone());
    let (status, _) = send(
        &app.router,
        Method::POST,
        &format!("/api/discovery/configurations/{}/run", empty.id),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let inactive_owner = Uuid::new_v4();
    let config = Configuration::new(inactive_owner, "Hotels", ["hotel"]);
    app.store.insert_configuration(config.clone());
    app.store.set_user_active(inactive_owner, false);
    let (status, _) = send(
        &app.router,
        Method::POST,
        &format!("/api/discovery/configurations/{}/run", config.id),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert!(app.pipeline.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_job_is_404() {
    let app = test_app().await;
    let (status, body) = send(&app.router, Method::GET, "/api/discovery/jobs/config-x-1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app.router,
        Method::GET,
        "/api/discovery/jobs/config-x-1/stream",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_stream_ends_after_terminal_stage() {
    let app = test_app().await;
    let config = Configuration::new(Uuid::new_v4(), "Hotels", ["hotel"])
        .with_sources([SourceKind::Tavily]);
    app.store.insert_configuration(config.clone());
    let ticket = app.pipeline.run_now(config.id).await.unwrap();
    wait_for_stage(&app, &ticket.job_id, "completed").await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/discovery/jobs/{}/stream", ticket.job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: progress"));
    assert!(text.contains("\"stage\":\"completed\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health() {
    let app = test_app().await;
    let config = Configuration::new(Uuid::new_v4(), "Hotels", ["hotel"]);
    app.pipeline.schedule(&config).await.unwrap();

    let (status, body) = send(&app.router, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["scheduler"]["scheduled_configurations"], 1);
    assert_eq!(body["proxies"]["total"], 0);

    app.pipeline.shutdown().await.unwrap();
    let (status, body) = send(&app.router, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}
