// src/ingest/extract/heuristic_generic.rs
//! Generic fallback for sites without dedicated rules.
//!
//! Item selectors are tried in order and the first one that yields at least
//! one titled element wins; later selectors are not consulted. Trying them all
//! picks up navigation blocks and teaser widgets on templated pages.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{body_of, element_text, Draft, Extractor};
use crate::ingest::error::IngestError;
use crate::ingest::parse_price;
use crate::ingest::types::{CandidateRecord, ExtractorKind, RawFetchResult, SourceDescriptor};

/// Item selectors in precedence order.
pub const ITEM_SELECTORS: &[&str] = &[
    "article",
    ".article",
    ".post",
    r#"[class*="article"]"#,
    r#"[class*="post"]"#,
    r#"[class*="news"]"#,
    ".listing-item",
    r#"[class*="listing"]"#,
    ".story",
    ".entry",
    ".item",
];

struct Fields {
    items: Vec<Selector>,
    title: Selector,
    description: Selector,
    price: Selector,
    location: Selector,
    link: Selector,
    image: Selector,
}

static FIELDS: Lazy<Fields> = Lazy::new(|| {
    let sel = |css: &str| Selector::parse(css).expect("static selector");
    Fields {
        items: ITEM_SELECTORS.iter().map(|s| sel(s)).collect(),
        title: sel(r#"h1, h2, h3, h4, .title, [class*="title"], [class*="headline"]"#),
        description: sel(
            r#"p, .description, [class*="description"], [class*="summary"], [class*="excerpt"]"#,
        ),
        price: sel(r#".price, [class*="price"]"#),
        location: sel(r#".location, .address, [class*="location"], [class*="address"]"#),
        link: sel("a[href]"),
        image: sel("img"),
    }
});

pub struct HeuristicGenericExtractor;

impl HeuristicGenericExtractor {
    fn draft(item: &ElementRef<'_>) -> Draft {
        let f = &*FIELDS;
        let text_of = |sel: &Selector| {
            item.select(sel)
                .next()
                .map(|el| element_text(&el))
                .filter(|t| !t.is_empty())
        };

        let href = item
            .value()
            .attr("href")
            .or_else(|| item.select(&f.link).find_map(|a| a.value().attr("href")))
            .map(str::to_string);
        let image = item
            .select(&f.image)
            .find_map(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
            .map(str::to_string);

        Draft {
            title: text_of(&f.title),
            description: text_of(&f.description),
            price: text_of(&f.price).as_deref().and_then(parse_price),
            location: text_of(&f.location),
            href,
            image,
        }
    }
}

impl Extractor for HeuristicGenericExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::HeuristicGeneric
    }

    fn extract(
        &self,
        raw: &RawFetchResult,
        source: &SourceDescriptor,
    ) -> Result<Vec<CandidateRecord>, IngestError> {
        let body = body_of(raw)?;
        let doc = Html::parse_document(body);

        for (idx, item_sel) in FIELDS.items.iter().enumerate() {
            let titled: Vec<Draft> = doc
                .select(item_sel)
                .map(|el| Self::draft(&el))
                .filter(|d| d.title.is_some())
                .collect();
            if titled.is_empty() {
                continue;
            }
            tracing::debug!(
                source = %source.id,
                selector = ITEM_SELECTORS[idx],
                items = titled.len(),
                "generic selector matched"
            );
            return Ok(titled
                .into_iter()
                .filter_map(|d| d.finish(raw, source))
                .collect());
        }
        Ok(Vec::new())
    }
}
