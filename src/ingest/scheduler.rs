// src/ingest/scheduler.rs
//! Periodic and manual triggering, at most one in-flight run per category.
//! A trigger that finds its category busy is skipped, never queued.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::config::Intervals;
use crate::ingest::coordinator::IngestionCoordinator;
use crate::ingest::ensure_metrics_described;
use crate::ingest::types::{Category, RunLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerKind::Scheduled => "scheduled",
            TriggerKind::Manual => "manual",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("a {0} run is already in progress")]
    AlreadyRunning(Category),
    #[error("run task ended abnormally: {0}")]
    Aborted(String),
}

type InFlightSet = Arc<Mutex<HashSet<Category>>>;

fn lock(set: &InFlightSet) -> MutexGuard<'_, HashSet<Category>> {
    match set.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Releases the category when the run task finishes, however it finishes.
struct InFlight {
    set: InFlightSet,
    category: Category,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.category);
    }
}

#[derive(Clone)]
pub struct Scheduler {
    coordinator: Arc<IngestionCoordinator>,
    in_flight: InFlightSet,
}

impl Scheduler {
    pub fn new(coordinator: Arc<IngestionCoordinator>) -> Self {
        Self {
            coordinator,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn coordinator(&self) -> &Arc<IngestionCoordinator> {
        &self.coordinator
    }

    pub fn is_running(&self, category: Category) -> bool {
        lock(&self.in_flight).contains(&category)
    }

    fn claim(&self, category: Category) -> Option<InFlight> {
        if !lock(&self.in_flight).insert(category) {
            return None;
        }
        Some(InFlight {
            set: self.in_flight.clone(),
            category,
        })
    }

    /// Start a run unless one is already in flight for `category`.
    ///
    /// The run executes on its own task, so dropping the returned future
    /// (e.g. an HTTP client hanging up) does not cancel it.
    pub async fn trigger(&self, category: Category, kind: TriggerKind) -> Result<RunLog, TriggerError> {
        ensure_metrics_described();
        let Some(guard) = self.claim(category) else {
            tracing::info!(%category, %kind, "run already in flight, trigger skipped");
            counter!("ingest_triggers_skipped_total", "category" => category.as_str()).increment(1);
            return Err(TriggerError::AlreadyRunning(category));
        };

        tracing::info!(%category, %kind, "run triggered");
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            let _guard = guard;
            coordinator.run(category).await
        })
        .await
        .map_err(|e| TriggerError::Aborted(e.to_string()))
    }

    /// Fire a scheduled trigger for `category` every `every`. Ticks that land
    /// while a run is in flight are skipped; late ticks are not bunched up.
    ///
    /// A zero interval schedules nothing; the returned task ends at once.
    pub fn spawn(&self, category: Category, every: Duration) -> JoinHandle<()> {
        if every.is_zero() {
            tracing::warn!(%category, "zero interval, timer not started");
            return tokio::spawn(async {});
        }
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let s = this.clone();
                tokio::spawn(async move {
                    match s.trigger(category, TriggerKind::Scheduled).await {
                        // Skips are already logged and counted in `trigger`.
                        Ok(_) | Err(TriggerError::AlreadyRunning(_)) => {}
                        Err(e @ TriggerError::Aborted(_)) => {
                            tracing::error!(%category, error = %e, "scheduled run aborted");
                        }
                    }
                });
            }
        })
    }

    /// One timer per category with a non-zero interval.
    pub fn spawn_all(&self, intervals: &Intervals) -> Vec<JoinHandle<()>> {
        Category::ALL
            .iter()
            .filter_map(|&c| {
                let secs = intervals.for_category(c);
                if secs == 0 {
                    tracing::info!(category = %c, "no schedule for category");
                    return None;
                }
                Some(self.spawn(c, Duration::from_secs(secs)))
            })
            .collect()
    }
}
