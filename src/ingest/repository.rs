// src/ingest/repository.rs
//! Persistence boundary. The engine only needs key lookup, idempotent upsert
//! and run-log append; the read methods serve the HTTP surface.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::ingest::error::IngestError;
use crate::ingest::types::{Category, CandidateRecord, PersistedRecord, RunLog, UpsertOutcome};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn existing_keys(&self, category: Category) -> Result<HashSet<String>, IngestError>;

    /// Insert by `url`, or refresh `last_seen_at` (and content) of the stored record.
    async fn upsert(
        &self,
        category: Category,
        record: &CandidateRecord,
    ) -> Result<UpsertOutcome, IngestError>;

    async fn append_run_log(&self, log: &RunLog) -> Result<(), IngestError>;

    /// Newest first by `last_seen_at`.
    async fn records(
        &self,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<PersistedRecord>, IngestError>;

    /// Newest first by `start_time`.
    async fn run_logs(&self, limit: usize) -> Result<Vec<RunLog>, IngestError>;

    async fn run_log(&self, run_id: Uuid) -> Result<Option<RunLog>, IngestError>;
}

/// In-process repository. Each upsert commits on its own, so a failure in the
/// middle of a batch leaves earlier records intact.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<Category, HashMap<String, PersistedRecord>>>,
    runs: RwLock<Vec<RunLog>>,
    fail_writes: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make record upserts fail (run logs still append). Used to exercise
    /// the persistence-failure path.
    pub fn set_fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.records
            .read()
            .map(|m| m.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> IngestError {
    IngestError::Persistence("repository lock poisoned".into())
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn existing_keys(&self, category: Category) -> Result<HashSet<String>, IngestError> {
        let guard = self.records.read().map_err(poisoned)?;
        Ok(guard
            .get(&category)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert(
        &self,
        category: Category,
        record: &CandidateRecord,
    ) -> Result<UpsertOutcome, IngestError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IngestError::Persistence("write rejected".into()));
        }
        if record.url.is_empty() {
            return Err(IngestError::Persistence("record without key".into()));
        }

        let now = Utc::now();
        let mut guard = self.records.write().map_err(poisoned)?;
        let by_url = guard.entry(category).or_default();
        match by_url.get_mut(&record.url) {
            Some(existing) => {
                existing.record = record.clone();
                existing.last_seen_at = now;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                by_url.insert(
                    record.url.clone(),
                    PersistedRecord {
                        id: Uuid::new_v4(),
                        record: record.clone(),
                        first_seen_at: now,
                        last_seen_at: now,
                    },
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn append_run_log(&self, log: &RunLog) -> Result<(), IngestError> {
        self.runs.write().map_err(poisoned)?.push(log.clone());
        Ok(())
    }

    async fn records(
        &self,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<PersistedRecord>, IngestError> {
        let guard = self.records.read().map_err(poisoned)?;
        let mut out: Vec<PersistedRecord> = guard
            .iter()
            .filter(|(c, _)| category.map_or(true, |want| want == **c))
            .flat_map(|(_, m)| m.values().cloned())
            .collect();
        out.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn run_logs(&self, limit: usize) -> Result<Vec<RunLog>, IngestError> {
        let guard = self.runs.read().map_err(poisoned)?;
        let mut out: Vec<RunLog> = guard.iter().rev().take(limit).cloned().collect();
        out.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(out)
    }

    async fn run_log(&self, run_id: Uuid) -> Result<Option<RunLog>, IngestError> {
        let guard = self.runs.read().map_err(poisoned)?;
        Ok(guard.iter().find(|r| r.run_id == run_id).cloned())
    }
}
