// src/ingest/fetcher.rs
//! One bounded GET per source. Never fails past its boundary: every transport,
//! timeout or non-2xx condition becomes a non-ok `RawFetchResult` without body.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::histogram;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::Deserialize;

use crate::ingest::error::IngestError;
use crate::ingest::types::{FetchStatus, RawFetchResult};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Client settings shared by every request of a run.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        for (k, v) in [
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
            ("Accept-Language", "he-IL,he;q=0.9,en-US;q=0.8,en;q=0.5"),
            ("Cache-Control", "max-age=0"),
        ] {
            headers.insert(k.to_string(), v.to_string());
        }
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// HTTP session owned by exactly one run; dropped with it.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        for (k, v) in &cfg.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| IngestError::Configuration(format!("header name '{k}': {e}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| IngestError::Configuration(format!("header '{k}' value: {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| IngestError::Configuration(format!("http client: {e}")))?;

        Ok(Self { client })
    }

    pub async fn fetch(&self, source_id: &str, endpoint: &str) -> RawFetchResult {
        let t0 = Instant::now();
        let (status, url, body) = self.get(endpoint).await;
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if !status.is_ok() {
            tracing::debug!(source = source_id, endpoint, ?status, "fetch failed");
        }
        RawFetchResult {
            source_id: source_id.to_string(),
            status,
            url,
            body,
            fetched_at: Utc::now(),
        }
    }

    async fn get(&self, endpoint: &str) -> (FetchStatus, String, Option<String>) {
        let resp = match self.client.get(endpoint).send().await {
            Ok(r) => r,
            Err(e) => return (classify(&e), endpoint.to_string(), None),
        };

        let final_url = resp.url().to_string();
        let code = resp.status();
        if !code.is_success() {
            return (
                FetchStatus::HttpError {
                    status: code.as_u16(),
                },
                final_url,
                None,
            );
        }

        match resp.text().await {
            Ok(body) => (FetchStatus::Ok, final_url, Some(body)),
            Err(e) => (classify(&e), final_url, None),
        }
    }
}

fn classify(e: &reqwest::Error) -> FetchStatus {
    if e.is_timeout() {
        FetchStatus::Timeout
    } else {
        FetchStatus::NetworkError {
            message: e.to_string(),
        }
    }
}
