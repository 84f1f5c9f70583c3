// src/ingest/extract/rss_feed.rs
use quick_xml::de::from_str;
use serde::Deserialize;

use super::{body_of, Draft, Extractor};
use crate::ingest::error::IngestError;
use crate::ingest::types::{CandidateRecord, ExtractorKind, RawFetchResult, SourceDescriptor};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
}

/// RSS 2.0 feeds (`channel/item`), common on news sites.
pub struct RssFeedExtractor;

impl Extractor for RssFeedExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::RssFeed
    }

    fn extract(
        &self,
        raw: &RawFetchResult,
        source: &SourceDescriptor,
    ) -> Result<Vec<CandidateRecord>, IngestError> {
        let body = body_of(raw)?;
        let xml_clean = scrub_html_entities_for_xml(body);
        let rss: Rss = from_str(&xml_clean)
            .map_err(|e| IngestError::Extraction(format!("parsing rss xml: {e}")))?;

        let out = rss
            .channel
            .item
            .into_iter()
            .map(|it| Draft {
                title: it.title,
                description: it.description,
                price: None,
                location: None,
                href: it.link,
                image: it.enclosure.and_then(|e| e.url),
            })
            .filter_map(|d| d.finish(raw, source))
            .collect();
        Ok(out)
    }
}

// XML only knows five named entities; feeds often carry HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
