// src/ingest/registry.rs
//! Source registry: configured sources validated once and paired with their
//! extractor. A run takes an `Arc` snapshot at start, so a reload never
//! changes the sources of a run already in flight.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};

use url::Url;

use crate::ingest::config::{IngestConfig, SourceConfig};
use crate::ingest::error::IngestError;
use crate::ingest::extract::{build_extractor, Extractor};
use crate::ingest::types::{Category, SourceDescriptor};

/// A descriptor with its resolved strategy.
#[derive(Clone)]
pub struct SourceEntry {
    pub descriptor: SourceDescriptor,
    pub extractor: Arc<dyn Extractor>,
}

enum Slot {
    Resolved(SourceEntry),
    Unresolvable {
        id: String,
        category: Category,
        reason: String,
    },
}

impl Slot {
    fn category(&self) -> Category {
        match self {
            Slot::Resolved(e) => e.descriptor.category,
            Slot::Unresolvable { category, .. } => *category,
        }
    }
}

pub struct SourceRegistry {
    slots: Vec<Slot>,
}

impl SourceRegistry {
    /// Validate every enabled source. Invalid sources are kept with the
    /// reason, so the runs of their category fail instead of silently
    /// running without them.
    pub fn from_sources(sources: &[SourceConfig]) -> Self {
        let mut seen = HashSet::new();
        let mut slots = Vec::with_capacity(sources.len());
        for sc in sources.iter().filter(|s| s.enabled) {
            let slot = if !seen.insert(sc.id.clone()) {
                Slot::Unresolvable {
                    id: sc.id.clone(),
                    category: sc.category,
                    reason: format!("duplicate source id '{}'", sc.id),
                }
            } else {
                match resolve_one(sc) {
                    Ok(entry) => Slot::Resolved(entry),
                    Err(e) => {
                        tracing::warn!(source = %sc.id, error = %e, "unresolvable source");
                        Slot::Unresolvable {
                            id: sc.id.clone(),
                            category: sc.category,
                            reason: e.to_string(),
                        }
                    }
                }
            };
            slots.push(slot);
        }
        Self { slots }
    }

    pub fn from_config(cfg: &IngestConfig) -> Self {
        Self::from_sources(&cfg.sources)
    }

    /// Sources of `category` in configuration order.
    pub fn resolve(&self, category: Category) -> Result<Vec<SourceEntry>, IngestError> {
        let mut out = Vec::new();
        for slot in self.slots.iter().filter(|s| s.category() == category) {
            match slot {
                Slot::Resolved(e) => out.push(e.clone()),
                Slot::Unresolvable { id, reason, .. } => {
                    return Err(IngestError::Configuration(format!(
                        "source '{id}': {reason}"
                    )))
                }
            }
        }
        if out.is_empty() {
            return Err(IngestError::Configuration(format!(
                "no sources configured for category '{category}'"
            )));
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn resolve_one(sc: &SourceConfig) -> Result<SourceEntry, IngestError> {
    if sc.id.trim().is_empty() {
        return Err(IngestError::Configuration("empty source id".into()));
    }
    let endpoint = Url::parse(sc.endpoint.trim())
        .map_err(|e| IngestError::Configuration(format!("endpoint '{}': {e}", sc.endpoint)))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(IngestError::Configuration(format!(
            "endpoint '{}' is not http(s)",
            sc.endpoint
        )));
    }
    let extractor = build_extractor(sc.extractor, sc.selectors.as_ref())?;

    Ok(SourceEntry {
        descriptor: SourceDescriptor {
            id: sc.id.trim().to_string(),
            category: sc.category,
            endpoint: endpoint.to_string(),
            extractor_kind: sc.extractor,
        },
        extractor,
    })
}

/// Shared, swappable registry snapshot.
#[derive(Clone)]
pub struct RegistryHandle {
    inner: Arc<RwLock<Arc<SourceRegistry>>>,
}

impl RegistryHandle {
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    pub fn snapshot(&self) -> Arc<SourceRegistry> {
        match self.inner.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Takes effect on the next run.
    pub fn replace(&self, registry: SourceRegistry) {
        match self.inner.write() {
            Ok(mut g) => *g = Arc::new(registry),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(registry),
        }
    }
}

fn hot_reload_enabled() -> bool {
    std::env::var("INGEST_HOT_RELOAD").ok().as_deref() == Some("1")
}

/// Poll the config file and swap the registry when it changes.
/// Enabled by `INGEST_HOT_RELOAD=1`. Unparseable edits are logged and ignored.
pub fn start_config_reload_thread(handle: RegistryHandle, path: PathBuf) {
    if !hot_reload_enabled() {
        return;
    }

    thread::spawn(move || {
        let poll = Duration::from_secs(2);
        let mut last_mtime: Option<SystemTime> = None;

        loop {
            if let Ok(mtime) = fs::metadata(&path).and_then(|m| m.modified()) {
                let changed = match last_mtime {
                    None => {
                        last_mtime = Some(mtime);
                        false
                    }
                    Some(prev) => mtime > prev,
                };
                if changed {
                    match IngestConfig::load_from(&path) {
                        Ok(cfg) => {
                            handle.replace(SourceRegistry::from_config(&cfg));
                            tracing::info!(path = %path.display(), "source registry reloaded");
                        }
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "config reload failed");
                        }
                    }
                    last_mtime = Some(mtime);
                }
            }
            thread::sleep(poll);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::extract::SelectorRules;
    use crate::ingest::types::ExtractorKind;

    fn sc(id: &str, category: Category, kind: ExtractorKind) -> SourceConfig {
        SourceConfig {
            id: id.into(),
            category,
            endpoint: format!("https://{id}.example.test/"),
            extractor: kind,
            selectors: None,
            enabled: true,
        }
    }

    #[test]
    fn resolve_keeps_configuration_order() {
        let reg = SourceRegistry::from_sources(&[
            sc("b", Category::News, ExtractorKind::HeuristicGeneric),
            sc("p", Category::Property, ExtractorKind::HeuristicGeneric),
            sc("a", Category::News, ExtractorKind::RssFeed),
        ]);
        let ids: Vec<_> = reg
            .resolve(Category::News)
            .unwrap()
            .into_iter()
            .map(|e| e.descriptor.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn unresolvable_source_fails_its_category_only() {
        let mut bad = sc("bad", Category::Property, ExtractorKind::StructuredCss);
        bad.selectors = None;
        let reg = SourceRegistry::from_sources(&[
            bad,
            sc("n", Category::News, ExtractorKind::HeuristicGeneric),
        ]);
        assert!(matches!(
            reg.resolve(Category::Property),
            Err(IngestError::Configuration(_))
        ));
        assert!(reg.resolve(Category::News).is_ok());
    }

    #[test]
    fn empty_category_and_bad_endpoints_are_configuration_errors() {
        let mut ftp = sc("f", Category::News, ExtractorKind::HeuristicGeneric);
        ftp.endpoint = "ftp://files.example.test/".into();
        let reg = SourceRegistry::from_sources(&[ftp]);
        assert!(reg.resolve(Category::News).is_err());
        assert!(reg.resolve(Category::Social).is_err());
    }

    #[test]
    fn duplicate_ids_and_disabled_sources() {
        let mut off = sc("off", Category::News, ExtractorKind::HeuristicGeneric);
        off.enabled = false;
        let mut css = sc("css", Category::Property, ExtractorKind::StructuredCss);
        css.selectors = Some(SelectorRules {
            item: ".card".into(),
            title: Some("h2".into()),
            price: None,
            location: None,
            url: None,
            image: None,
            description: None,
        });
        let reg = SourceRegistry::from_sources(&[
            off,
            css.clone(),
            sc("n", Category::News, ExtractorKind::HeuristicGeneric),
            sc("n", Category::News, ExtractorKind::HeuristicGeneric),
        ]);
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.resolve(Category::Property).unwrap().len(), 1);
        assert!(reg.resolve(Category::News).is_err());
    }

    #[test]
    fn handle_swaps_snapshot_for_next_reader() {
        let handle = RegistryHandle::new(SourceRegistry::from_sources(&[]));
        let before = handle.snapshot();
        handle.replace(SourceRegistry::from_sources(&[sc(
            "n",
            Category::News,
            ExtractorKind::HeuristicGeneric,
        )]));
        assert!(before.resolve(Category::News).is_err());
        assert!(handle.snapshot().resolve(Category::News).is_ok());
    }
}
