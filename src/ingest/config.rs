// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::coordinator::RunSettings;
use crate::ingest::extract::SelectorRules;
use crate::ingest::fetcher::FetchConfig;
use crate::ingest::types::{Category, ExtractorKind};

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_TOML: &str = "config/sources.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/sources.json";

/// One configured source, as written in the config file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub id: String,
    pub category: Category,
    pub endpoint: String,
    pub extractor: ExtractorKind,
    #[serde(default)]
    pub selectors: Option<SelectorRules>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Seconds between scheduled runs, per category. `0` disables the timer.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Intervals {
    pub property: u64,
    pub news: u64,
    pub social: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            property: 3600,
            news: 1800,
            social: 3600,
        }
    }
}

impl Intervals {
    pub fn for_category(&self, c: Category) -> u64 {
        match c {
            Category::Property => self.property,
            Category::News => self.news,
            Category::Social => self.social,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IngestConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub intervals: Intervals,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl IngestConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading ingest config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing ingest config {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $INGEST_CONFIG_PATH
    /// 2) config/sources.toml
    /// 3) config/sources.json
    /// 4) built-in seed
    ///
    /// Returns the path it was loaded from, if any (for hot reload).
    pub fn load_default() -> Result<(Self, Option<PathBuf>)> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Ok((Self::load_from(&pb)?, Some(pb)));
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for p in [DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_JSON] {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Ok((Self::load_from(&pb)?, Some(pb)));
            }
        }
        tracing::info!("no ingest config file found, using built-in sources");
        Ok((Self::default_seed(), None))
    }

    /// Built-in sources: the real-estate news sections and listing boards
    /// the service was first written for. All use the generic extractor.
    pub fn default_seed() -> Self {
        let news = [
            ("globes", "https://www.globes.co.il/news/home.aspx?fid=607"),
            ("calcalist", "https://www.calcalist.co.il/real-estate"),
            ("themarker", "https://www.themarker.com/realestate"),
            ("bizportal", "https://www.bizportal.co.il/realestates/news"),
        ];
        let listings = [
            ("globes-board", "https://www.globes.co.il/GlobesBoard/"),
            ("menivim", "https://menivim.net/"),
            ("gevarom", "https://gevarom.co.il/properties/"),
            ("komo", "https://www.komo.co.il/"),
        ];

        let mut sources = Vec::new();
        for (category, list) in [(Category::News, &news[..]), (Category::Property, &listings[..])] {
            for (id, endpoint) in list {
                sources.push(SourceConfig {
                    id: id.to_string(),
                    category,
                    endpoint: endpoint.to_string(),
                    extractor: ExtractorKind::HeuristicGeneric,
                    selectors: None,
                    enabled: true,
                });
            }
        }

        Self {
            fetch: FetchConfig::default(),
            run: RunSettings::default(),
            intervals: Intervals::default(),
            sources,
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<IngestConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => {
            // Unknown extension: try JSON first (cheap to reject), then TOML.
            if let Ok(v) = serde_json::from_str(s) {
                return Ok(v);
            }
            toml::from_str(s).map_err(|e| anyhow!("unsupported ingest config format: {e}"))
        }
    }
}
