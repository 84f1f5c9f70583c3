// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /runs/{category}  (200, 400, 409)
// - GET /runs, GET /runs/{run_id}
// - GET /records

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use realty_ingest::api::{self, AppState};
use realty_ingest::ingest::config::SourceConfig;
use realty_ingest::ingest::coordinator::{IngestionCoordinator, RunSettings};
use realty_ingest::ingest::fetcher::FetchConfig;
use realty_ingest::ingest::registry::{RegistryHandle, SourceRegistry};
use realty_ingest::ingest::repository::MemoryRepository;
use realty_ingest::ingest::scheduler::{Scheduler, TriggerKind};
use realty_ingest::ingest::types::{Category, ExtractorKind};

const BODY_LIMIT: usize = 1024 * 1024;

const PAGE: &str = r#"<html><body>
<div class="listing-item"><h3>Office loft near the central station</h3><span class="price">₪ 9,900</span><a href="/l/1">more</a></div>
<div class="listing-item"><h3>Retail corner with display windows</h3><a href="/l/2">more</a></div>
</body></html>"#;

async fn test_app(delay: Duration) -> (MockServer, Router, Scheduler) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE).set_delay(delay))
        .mount(&server)
        .await;

    let sources = vec![SourceConfig {
        id: "board".into(),
        category: Category::Property,
        endpoint: format!("{}/board", server.uri()),
        extractor: ExtractorKind::HeuristicGeneric,
        selectors: None,
        enabled: true,
    }];
    let coordinator = IngestionCoordinator::new(
        RegistryHandle::new(SourceRegistry::from_sources(&sources)),
        Arc::new(MemoryRepository::new()),
        FetchConfig::default(),
        RunSettings::default(),
    );
    let scheduler = Scheduler::new(Arc::new(coordinator));
    let router = api::router(AppState::new(scheduler.clone()));
    (server, router, scheduler)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_returns_ok() {
    let (_server, app, _) = test_app(Duration::ZERO).await;
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    assert_eq!(String::from_utf8_lossy(&bytes).trim(), "ok");
}

#[tokio::test]
async fn manual_run_then_read_back_runs_and_records() {
    let (_server, app, _) = test_app(Duration::ZERO).await;

    let (status, v) = call(&app, "POST", "/runs/property").await;
    assert_eq!(status, StatusCode::OK, "body: {v}");
    assert_eq!(v["run"]["status"], "success");
    assert_eq!(v["run"]["items_new"], 2);
    assert_eq!(v["records"].as_array().map(Vec::len), Some(2));
    let run_id = v["run"]["run_id"].as_str().expect("run_id").to_string();

    let (status, runs) = call(&app, "GET", "/runs?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs["runs"].as_array().map(Vec::len), Some(1));

    let (status, one) = call(&app, "GET", &format!("/runs/{run_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["category"], "property");
    assert_eq!(one["sources_attempted"], 1);

    let (status, recs) = call(&app, "GET", "/records?category=property&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let recs = recs["records"].as_array().expect("records array").clone();
    assert_eq!(recs.len(), 1);
    assert!(recs[0]["url"].as_str().unwrap_or_default().contains("/l/"));
    assert!(recs[0].get("first_seen_at").is_some());

    let (_, news) = call(&app, "GET", "/records?category=news").await;
    assert_eq!(news["records"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn unknown_category_and_run_are_rejected() {
    let (_server, app, _) = test_app(Duration::ZERO).await;

    let (status, v) = call(&app, "POST", "/runs/weather").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["error"].as_str().unwrap_or_default().contains("weather"));

    let (status, _) = call(&app, "GET", "/records?category=weather").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "GET",
        "/runs/7f0c3f5e-5d1a-4c1e-9a38-3b8c1f1e2d00",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "GET", "/runs/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn manual_trigger_conflicts_with_run_in_flight() {
    let (_server, app, scheduler) = test_app(Duration::from_millis(400)).await;

    let bg = scheduler.clone();
    let scheduled =
        tokio::spawn(async move { bg.trigger(Category::Property, TriggerKind::Scheduled).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, v) = call(&app, "POST", "/runs/property").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(v["error"].as_str().unwrap_or_default().contains("in progress"));

    scheduled.await.unwrap().expect("scheduled run");
    let (_, runs) = call(&app, "GET", "/runs").await;
    assert_eq!(runs["runs"].as_array().map(Vec::len), Some(1));
}
