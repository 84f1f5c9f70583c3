// src/ingest/dedup.rs
//! Two-stage deduplication of one run's merged batch.
//!
//! 1. Exact key: drop candidates whose `url` is already persisted, or was
//!    already accepted earlier in this batch.
//! 2. Near-duplicate: drop candidates whose title is more than
//!    `NEAR_DUPLICATE_THRESHOLD` similar to an already accepted title.
//!
//! First-seen wins in both stages and survivors keep their input order, so the
//! caller must pass candidates in dispatch (registry) order.
//!
//! Similarity: `strsim::normalized_levenshtein` over `title_key` forms.

use std::collections::HashSet;

use strsim::normalized_levenshtein;

use crate::ingest::title_key;
use crate::ingest::types::CandidateRecord;

pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.8;

/// Counts of what each stage removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    /// Key already persisted, or repeated earlier in the batch.
    pub dropped_key: usize,
    pub dropped_near_duplicate: usize,
}

impl DedupReport {
    pub fn total(&self) -> usize {
        self.dropped_key + self.dropped_near_duplicate
    }
}

pub fn titles_similar(a: &str, b: &str) -> bool {
    normalized_levenshtein(&title_key(a), &title_key(b)) > NEAR_DUPLICATE_THRESHOLD
}

pub fn dedup(
    candidates: Vec<CandidateRecord>,
    existing_keys: &HashSet<String>,
) -> Vec<CandidateRecord> {
    dedup_with_report(candidates, existing_keys).0
}

pub fn dedup_with_report(
    candidates: Vec<CandidateRecord>,
    existing_keys: &HashSet<String>,
) -> (Vec<CandidateRecord>, DedupReport) {
    let mut report = DedupReport::default();

    // Stage 1: exact key.
    let mut batch_keys: HashSet<String> = HashSet::with_capacity(candidates.len());
    let mut keyed = Vec::with_capacity(candidates.len());
    for c in candidates {
        if existing_keys.contains(&c.url) || !batch_keys.insert(c.url.clone()) {
            report.dropped_key += 1;
            continue;
        }
        keyed.push(c);
    }

    // Stage 2: near-duplicate titles against accepted ones.
    let mut accepted_titles: Vec<String> = Vec::new();
    let mut keep = Vec::with_capacity(keyed.len());
    for c in keyed {
        let key = title_key(&c.title);
        // Records identified only by price+location have nothing to compare.
        if key.is_empty() {
            keep.push(c);
            continue;
        }
        let near_dup = accepted_titles
            .iter()
            .any(|t| normalized_levenshtein(t, &key) > NEAR_DUPLICATE_THRESHOLD);
        if near_dup {
            tracing::trace!(url = %c.url, source = %c.source_id, "near-duplicate title dropped");
            report.dropped_near_duplicate += 1;
            continue;
        }
        accepted_titles.push(key);
        keep.push(c);
    }

    (keep, report)
}
