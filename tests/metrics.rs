// tests/metrics.rs
//
// Installs the global Prometheus recorder, so this file holds a single test.

use std::sync::Arc;

use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use realty_ingest::ingest::config::SourceConfig;
use realty_ingest::ingest::coordinator::{IngestionCoordinator, RunSettings};
use realty_ingest::ingest::fetcher::FetchConfig;
use realty_ingest::ingest::registry::{RegistryHandle, SourceRegistry};
use realty_ingest::ingest::repository::MemoryRepository;
use realty_ingest::ingest::types::{Category, ExtractorKind};
use realty_ingest::metrics::Metrics;

#[tokio::test]
async fn metrics_endpoint_contains_expected_series() {
    let metrics = Metrics::init().expect("recorder");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let sources = vec![SourceConfig {
        id: "wire".into(),
        category: Category::News,
        endpoint: format!("{}/rss", server.uri()),
        extractor: ExtractorKind::RssFeed,
        selectors: None,
        enabled: true,
    }];
    let coordinator = IngestionCoordinator::new(
        RegistryHandle::new(SourceRegistry::from_sources(&sources)),
        Arc::new(MemoryRepository::new()),
        FetchConfig::default(),
        RunSettings {
            retry_backoff_ms: 0,
            ..RunSettings::default()
        },
    );
    coordinator.run(Category::News).await;

    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = metrics.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(
        body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();

    for series in [
        "ingest_runs_total",
        "ingest_source_errors_total",
        "ingest_fetch_ms",
        "ingest_run_ms",
        "ingest_last_run_ts",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(text.contains(r#"status="failed""#));
}
