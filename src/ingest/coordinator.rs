// src/ingest/coordinator.rs
//! One run over one category.
//!
//! Flow: resolve sources → open a run-scoped HTTP session → spawn one
//! fetch+extract task per source → join all of them (bounded by the run
//! deadline) → merge in dispatch order → dedup → upsert → write the RunLog.
//! The deadline also bounds the persist phase; the RunLog write gets a short
//! grace period of its own.
//!
//! Source failures are isolated: they land in `per_source_errors` and never
//! abort sibling tasks. Only configuration and persistence errors fail the run
//! as a whole. Exactly one RunLog is appended per run, on every exit path.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::ingest::dedup::dedup_with_report;
use crate::ingest::ensure_metrics_described;
use crate::ingest::error::IngestError;
use crate::ingest::fetcher::{FetchConfig, Fetcher};
use crate::ingest::registry::{RegistryHandle, SourceEntry};
use crate::ingest::repository::Repository;
use crate::ingest::types::{CandidateRecord, Category, RunLog, RunStatus, UpsertOutcome};

/// Run-level knobs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    /// Deadline for the whole run; unfinished sources are cancelled.
    pub timeout_secs: u64,
    /// Global cap on concurrently fetching sources. `None` = one task per source, unbounded.
    pub max_concurrency: Option<usize>,
    /// Extra attempts for transport and 5xx failures.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_concurrency: None,
            max_retries: 1,
            retry_backoff_ms: 500,
        }
    }
}

impl RunSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Upper bound for appending the RunLog once the run has ended.
const LOG_WRITE_GRACE: Duration = Duration::from_secs(5);

type SourceOutcome = Result<Vec<CandidateRecord>, IngestError>;

pub struct IngestionCoordinator {
    registry: RegistryHandle,
    repo: Arc<dyn Repository>,
    fetch: FetchConfig,
    settings: RunSettings,
}

impl IngestionCoordinator {
    pub fn new(
        registry: RegistryHandle,
        repo: Arc<dyn Repository>,
        fetch: FetchConfig,
        settings: RunSettings,
    ) -> Self {
        Self {
            registry,
            repo,
            fetch,
            settings,
        }
    }

    pub fn repository(&self) -> Arc<dyn Repository> {
        self.repo.clone()
    }

    /// Execute one run and return its finished RunLog.
    pub async fn run(&self, category: Category) -> RunLog {
        ensure_metrics_described();
        let log = RunLog::open(category);
        let span = tracing::info_span!("ingest_run", run_id = %log.run_id, %category);
        self.run_inner(log).instrument(span).await
    }

    async fn run_inner(&self, mut log: RunLog) -> RunLog {
        let t0 = Instant::now();
        let deadline = tokio::time::Instant::now() + self.settings.timeout();
        let category = log.category;

        // Pending -> Running. The snapshot stays fixed for this run.
        let sources = match self.registry.snapshot().resolve(category) {
            Ok(s) => s,
            Err(e) => return self.abort_run(log, e).await,
        };
        let fetcher = match Fetcher::new(&self.fetch) {
            Ok(f) => f,
            Err(e) => return self.abort_run(log, e).await,
        };
        log.mark_running(sources.len());

        let outcomes = self.fan_out(&fetcher, &sources, deadline).await;
        // Session closes here; nothing after this point touches the network.
        drop(fetcher);

        let mut merged = Vec::new();
        for (entry, outcome) in sources.iter().zip(outcomes) {
            match outcome {
                Ok(records) => merged.extend(records.into_iter().filter(|r| r.is_identifiable())),
                Err(e) => {
                    tracing::warn!(
                        source = %entry.descriptor.id,
                        extractor = entry.descriptor.extractor_kind.as_str(),
                        error = %e,
                        "source failed"
                    );
                    counter!("ingest_source_errors_total", "category" => category.as_str())
                        .increment(1);
                    log.record_source_error(&entry.descriptor.id, &e);
                }
            }
        }
        log.items_seen = merged.len();

        let mut status = RunStatus::from_counts(log.sources_attempted, log.sources_failed);
        let persisted = tokio::time::timeout_at(deadline, self.persist(category, merged))
            .await
            .unwrap_or_else(|_| {
                Err((0, IngestError::Persistence("run deadline exceeded".into())))
            });
        match persisted {
            Ok(created) => log.items_new = created,
            Err((created, e)) => {
                tracing::error!(error = %e, "persisting records failed");
                log.items_new = created;
                log.fail_run(&e);
                status = RunStatus::Failed;
            }
        }

        log.finish(status);
        self.write_log(&log).await;
        self.observe(&log, t0);
        log
    }

    /// Spawn one task per source and join them all. Results come back in
    /// dispatch order regardless of completion order.
    async fn fan_out(
        &self,
        fetcher: &Fetcher,
        sources: &[SourceEntry],
        deadline: tokio::time::Instant,
    ) -> Vec<SourceOutcome> {
        let limiter = self
            .settings
            .max_concurrency
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        let handles: Vec<JoinHandle<SourceOutcome>> = sources
            .iter()
            .map(|entry| {
                let task = SourceTask {
                    fetcher: fetcher.clone(),
                    entry: entry.clone(),
                    limiter: limiter.clone(),
                    max_retries: self.settings.max_retries,
                    backoff: Duration::from_millis(self.settings.retry_backoff_ms),
                };
                tokio::spawn(task.run())
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for mut handle in handles {
            let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(res)) => res,
                Ok(Err(join_err)) => Err(IngestError::Extraction(format!(
                    "source task aborted: {join_err}"
                ))),
                Err(_) => {
                    handle.abort();
                    Err(IngestError::Transport(
                        "cancelled: run deadline exceeded".into(),
                    ))
                }
            };
            out.push(outcome);
        }
        out
    }

    /// Single-threaded persist phase. New records are inserted first, then
    /// candidates whose key is already stored are upserted again so their
    /// `last_seen_at` moves. On failure returns how many records were created
    /// before the error.
    async fn persist(
        &self,
        category: Category,
        merged: Vec<CandidateRecord>,
    ) -> Result<usize, (usize, IngestError)> {
        if merged.is_empty() {
            return Ok(0);
        }
        let existing = self
            .repo
            .existing_keys(category)
            .await
            .map_err(|e| (0, e))?;
        let mut seen_again: Vec<CandidateRecord> = Vec::new();
        let mut touched: HashSet<&str> = HashSet::new();
        for c in merged.iter().filter(|c| existing.contains(&c.url)) {
            if touched.insert(c.url.as_str()) {
                seen_again.push(c.clone());
            }
        }

        let (unique, report) = dedup_with_report(merged, &existing);
        counter!("ingest_dedup_dropped_total").increment(report.total() as u64);
        tracing::debug!(
            unique = unique.len(),
            dropped_key = report.dropped_key,
            seen_again = seen_again.len(),
            dropped_near_duplicate = report.dropped_near_duplicate,
            "dedup done"
        );

        let mut created = 0usize;
        for rec in unique.iter().chain(&seen_again) {
            match self.repo.upsert(category, rec).await {
                Ok(UpsertOutcome::Created) => created += 1,
                Ok(UpsertOutcome::Updated) => {}
                Err(e) => return Err((created, e)),
            }
        }
        Ok(created)
    }

    /// Fail before any dispatch (configuration): zero sources attempted.
    async fn abort_run(&self, mut log: RunLog, err: IngestError) -> RunLog {
        let t0 = Instant::now();
        tracing::error!(error = %err, "run failed before dispatch");
        log.fail_run(&err);
        log.finish(RunStatus::Failed);
        self.write_log(&log).await;
        self.observe(&log, t0);
        log
    }

    async fn write_log(&self, log: &RunLog) {
        match tokio::time::timeout(LOG_WRITE_GRACE, self.repo.append_run_log(log)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, run_id = %log.run_id, "run log not persisted"),
            Err(_) => tracing::error!(run_id = %log.run_id, "run log write timed out"),
        }
    }

    fn observe(&self, log: &RunLog, t0: Instant) {
        let category = log.category.as_str();
        counter!("ingest_runs_total", "category" => category, "status" => log.status.as_str())
            .increment(1);
        counter!("ingest_items_seen_total").increment(log.items_seen as u64);
        counter!("ingest_items_new_total").increment(log.items_new as u64);
        histogram!("ingest_run_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("ingest_last_run_ts", "category" => category)
            .set(chrono::Utc::now().timestamp().max(0) as f64);

        tracing::info!(
            target: "ingest",
            status = log.status.as_str(),
            attempted = log.sources_attempted,
            failed = log.sources_failed,
            seen = log.items_seen,
            new = log.items_new,
            "run finished"
        );
    }
}

/// Fetch + extract for one source, with the coordinator's retry policy.
struct SourceTask {
    fetcher: Fetcher,
    entry: SourceEntry,
    limiter: Option<Arc<Semaphore>>,
    max_retries: u32,
    backoff: Duration,
}

impl SourceTask {
    async fn run(self) -> SourceOutcome {
        let _permit = match &self.limiter {
            Some(sem) => Some(sem.clone().acquire_owned().await.map_err(|_| {
                IngestError::Transport("concurrency limiter closed".into())
            })?),
            None => None,
        };

        let d = &self.entry.descriptor;
        let mut attempt = 0u32;
        loop {
            let raw = self.fetcher.fetch(&d.id, &d.endpoint).await;
            match raw.failure() {
                None => return self.entry.extractor.extract(&raw, d),
                Some(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(source = %d.id, attempt, error = %e, "retrying fetch");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Some(e) => return Err(e),
            }
        }
    }
}
