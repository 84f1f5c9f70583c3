// src/ingest/extract/mod.rs
//! Extraction strategies. A source names its strategy by `ExtractorKind`; the
//! registry turns that into an `Arc<dyn Extractor>` once, at build time.

pub mod heuristic_generic;
pub mod rss_feed;
pub mod social_text;
pub mod structured_css;

use std::sync::Arc;

use crate::ingest::error::IngestError;
use crate::ingest::types::{CandidateRecord, ExtractorKind, RawFetchResult, SourceDescriptor};
use crate::ingest::{clean_opt, normalize_text, resolve_url, title_fingerprint, truncate_chars};

pub use heuristic_generic::HeuristicGenericExtractor;
pub use rss_feed::RssFeedExtractor;
pub use social_text::SocialTextExtractor;
pub use structured_css::{SelectorRules, StructuredCssExtractor};

/// Max stored title length (chars).
pub const TITLE_MAX_CHARS: usize = 500;

/// Turns fetched content into candidate records for one source.
/// Implementations are pure: no I/O, no shared state.
pub trait Extractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;

    fn extract(
        &self,
        raw: &RawFetchResult,
        source: &SourceDescriptor,
    ) -> Result<Vec<CandidateRecord>, IngestError>;
}

/// Strategy table: `ExtractorKind` → extractor instance.
pub fn build_extractor(
    kind: ExtractorKind,
    selectors: Option<&SelectorRules>,
) -> Result<Arc<dyn Extractor>, IngestError> {
    Ok(match kind {
        ExtractorKind::StructuredCss => {
            let rules = selectors.ok_or_else(|| {
                IngestError::Configuration("structured_css requires [selectors]".into())
            })?;
            Arc::new(StructuredCssExtractor::new(rules)?)
        }
        ExtractorKind::HeuristicGeneric => Arc::new(HeuristicGenericExtractor),
        ExtractorKind::SocialText => Arc::new(SocialTextExtractor),
        ExtractorKind::RssFeed => Arc::new(RssFeedExtractor),
    })
}

/// Body of a successful fetch, or an extraction error if there is nothing to parse.
pub(crate) fn body_of(raw: &RawFetchResult) -> Result<&str, IngestError> {
    match raw.body.as_deref() {
        Some(b) if raw.status.is_ok() && !b.trim().is_empty() => Ok(b),
        Some(_) if raw.status.is_ok() => Err(IngestError::Extraction("empty body".into())),
        _ => Err(IngestError::Extraction(format!(
            "no content to extract ({:?})",
            raw.status
        ))),
    }
}

/// Fields pulled out of one item before URL resolution and normalization.
#[derive(Debug, Default, Clone)]
pub(crate) struct Draft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub href: Option<String>,
    pub image: Option<String>,
}

impl Draft {
    /// Normalize and resolve against the page URL. Drops the item (None) when
    /// its key URL cannot be resolved.
    pub fn finish(self, raw: &RawFetchResult, source: &SourceDescriptor) -> Option<CandidateRecord> {
        let url = resolve_url(&raw.url, self.href.as_deref()?)?;
        let title = truncate_chars(
            &normalize_text(self.title.as_deref().unwrap_or_default()),
            TITLE_MAX_CHARS,
        );
        let image_url = self
            .image
            .as_deref()
            .and_then(|src| resolve_url(&raw.url, src));

        Some(CandidateRecord {
            category: source.category,
            content_fingerprint: title_fingerprint(&title),
            title,
            description: clean_opt(self.description.as_deref()),
            price: self.price,
            location: clean_opt(self.location.as_deref()),
            url,
            image_url,
            source_id: source.id.clone(),
            observed_at: raw.fetched_at,
        })
    }
}

/// Collected text of an element, whitespace-normalized.
pub(crate) fn element_text(el: &scraper::ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::ingest::types::{Category, ExtractorKind, FetchStatus, RawFetchResult, SourceDescriptor};

    pub fn raw(url: &str, body: &str) -> RawFetchResult {
        RawFetchResult {
            source_id: "src".into(),
            status: FetchStatus::Ok,
            url: url.into(),
            body: Some(body.into()),
            fetched_at: Utc::now(),
        }
    }

    pub fn source(category: Category, kind: ExtractorKind) -> SourceDescriptor {
        SourceDescriptor {
            id: "src".into(),
            category,
            endpoint: "https://example.test/".into(),
            extractor_kind: kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{raw, source};
    use super::*;
    use crate::ingest::types::{Category, FetchStatus};

    #[test]
    fn structured_css_without_rules_is_rejected() {
        let err = build_extractor(ExtractorKind::StructuredCss, None).err();
        assert!(matches!(err, Some(IngestError::Configuration(_))));
    }

    #[test]
    fn table_resolves_each_kind() {
        for kind in [
            ExtractorKind::HeuristicGeneric,
            ExtractorKind::SocialText,
            ExtractorKind::RssFeed,
        ] {
            let ex = build_extractor(kind, None).ok().unwrap();
            assert_eq!(ex.kind(), kind);
        }
    }

    #[test]
    fn draft_without_resolvable_url_is_dropped() {
        let src = source(Category::News, ExtractorKind::HeuristicGeneric);
        let page = raw("https://news.example.test/section/", "<html></html>");
        let d = Draft {
            title: Some("Title".into()),
            href: Some("javascript:void(0)".into()),
            ..Default::default()
        };
        assert!(d.finish(&page, &src).is_none());

        let ok = Draft {
            title: Some("  Title\n here ".into()),
            href: Some("/a/1".into()),
            image: Some("//img.example.test/p.jpg".into()),
            ..Default::default()
        }
        .finish(&page, &src)
        .unwrap();
        assert_eq!(ok.url, "https://news.example.test/a/1");
        assert_eq!(ok.title, "Title here");
        assert_eq!(ok.image_url.as_deref(), Some("https://img.example.test/p.jpg"));
    }

    #[test]
    fn failed_fetch_has_no_body_to_extract() {
        let mut page = raw("https://example.test/", "");
        assert!(body_of(&page).is_err());
        page.status = FetchStatus::Timeout;
        page.body = None;
        assert!(body_of(&page).is_err());
    }
}
