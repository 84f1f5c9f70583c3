// src/ingest/types.rs
//! Data model shared by every stage of a run: source descriptors, raw fetch
//! results, candidate and persisted records, and the per-run log.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::error::IngestError;

/// Ingestion class of a source; decides schedule interval and record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Property,
    News,
    Social,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Property, Category::News, Category::Social];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Property => "property",
            Category::News => "news",
            Category::Social => "social",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "property" | "properties" => Ok(Category::Property),
            "news" => Ok(Category::News),
            "social" => Ok(Category::Social),
            other => Err(IngestError::Configuration(format!(
                "unknown category '{other}'"
            ))),
        }
    }
}

/// Which extraction strategy a source uses. Resolved to a concrete
/// extractor once, when the registry is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    StructuredCss,
    HeuristicGeneric,
    SocialText,
    RssFeed,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::StructuredCss => "structured_css",
            ExtractorKind::HeuristicGeneric => "heuristic_generic",
            ExtractorKind::SocialText => "social_text",
            ExtractorKind::RssFeed => "rss_feed",
        }
    }
}

/// Immutable description of one external origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub category: Category,
    pub endpoint: String,
    pub extractor_kind: ExtractorKind,
}

/// Outcome of a single HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    HttpError { status: u16 },
    NetworkError { message: String },
    Timeout,
}

impl FetchStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchStatus::Ok)
    }
}

/// What the fetcher hands to an extractor. `body` is present iff `status` is ok.
#[derive(Debug, Clone)]
pub struct RawFetchResult {
    pub source_id: String,
    pub status: FetchStatus,
    /// Final URL after redirects; relative links resolve against this.
    pub url: String,
    pub body: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl RawFetchResult {
    /// The error a source task reports for a failed fetch; `None` when ok.
    pub fn failure(&self) -> Option<IngestError> {
        match &self.status {
            FetchStatus::Ok => None,
            FetchStatus::HttpError { status } => Some(IngestError::Protocol { status: *status }),
            FetchStatus::NetworkError { message } => Some(IngestError::Transport(message.clone())),
            FetchStatus::Timeout => Some(IngestError::Transport("request timed out".into())),
        }
    }
}

/// Normalized record produced by an extractor, not yet deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub category: Category,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub source_id: String,
    pub observed_at: DateTime<Utc>,
    pub content_fingerprint: String,
}

impl CandidateRecord {
    /// A record must carry a title, or both a price and a location.
    pub fn is_identifiable(&self) -> bool {
        !self.title.trim().is_empty() || (self.price.is_some() && self.location.is_some())
    }
}

/// Stored record; `url` is the uniqueness key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub record: CandidateRecord,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Run state machine: `Pending -> Running -> {Success, Partial, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Partial | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    /// Terminal status from per-source outcomes.
    pub fn from_counts(attempted: usize, failed: usize) -> RunStatus {
        if failed == 0 {
            RunStatus::Success
        } else if failed >= attempted {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        }
    }
}

/// Provenance for one run. Frozen once `end_time` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: Uuid,
    pub category: Category,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub sources_attempted: usize,
    pub sources_failed: usize,
    pub items_seen: usize,
    pub items_new: usize,
    pub per_source_errors: BTreeMap<String, String>,
    /// Run-level failure (configuration or persistence), if any.
    pub error: Option<String>,
}

impl RunLog {
    pub fn open(category: Category) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            category,
            start_time: Utc::now(),
            end_time: None,
            status: RunStatus::Pending,
            sources_attempted: 0,
            sources_failed: 0,
            items_seen: 0,
            items_new: 0,
            per_source_errors: BTreeMap::new(),
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn mark_running(&mut self, sources_attempted: usize) {
        if self.is_finished() {
            return;
        }
        self.status = RunStatus::Running;
        self.sources_attempted = sources_attempted;
    }

    pub fn record_source_error(&mut self, source_id: &str, err: &IngestError) {
        if self.is_finished() {
            return;
        }
        self.per_source_errors
            .insert(source_id.to_string(), err.to_string());
        self.sources_failed = self.per_source_errors.len();
    }

    pub fn fail_run(&mut self, err: &IngestError) {
        if self.is_finished() {
            return;
        }
        self.error = Some(err.to_string());
    }

    /// Set the terminal status and `end_time`. Later calls are ignored.
    pub fn finish(&mut self, status: RunStatus) {
        if self.is_finished() || !status.is_terminal() {
            return;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_from_counts() {
        assert_eq!(RunStatus::from_counts(5, 0), RunStatus::Success);
        assert_eq!(RunStatus::from_counts(5, 2), RunStatus::Partial);
        assert_eq!(RunStatus::from_counts(5, 5), RunStatus::Failed);
    }

    #[test]
    fn run_log_is_frozen_after_finish() {
        let mut log = RunLog::open(Category::News);
        log.mark_running(2);
        log.record_source_error("a", &IngestError::Protocol { status: 503 });
        log.finish(RunStatus::Partial);
        let end = log.end_time;

        log.record_source_error("b", &IngestError::Transport("boom".into()));
        log.finish(RunStatus::Failed);

        assert_eq!(log.status, RunStatus::Partial);
        assert_eq!(log.sources_failed, 1);
        assert_eq!(log.end_time, end);
    }

    #[test]
    fn identifiable_requires_title_or_price_and_location() {
        let mut rec = CandidateRecord {
            category: Category::Property,
            title: "  ".into(),
            description: None,
            price: Some(4500.0),
            location: None,
            url: "https://example.test/1".into(),
            image_url: None,
            source_id: "s".into(),
            observed_at: Utc::now(),
            content_fingerprint: String::new(),
        };
        assert!(!rec.is_identifiable());
        rec.location = Some("Tel Aviv".into());
        assert!(rec.is_identifiable());
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("NEWS".parse::<Category>().unwrap(), Category::News);
        assert!("weather".parse::<Category>().is_err());
    }
}
