// src/ingest/extract/social_text.rs
//! Group-feed posts: free text with prices and places mentioned inline.
//! A post without a permalink cannot be keyed and is dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{body_of, Draft, Extractor};
use crate::ingest::error::IngestError;
use crate::ingest::types::{CandidateRecord, ExtractorKind, RawFetchResult, SourceDescriptor};
use crate::ingest::{normalize_text, parse_price, truncate_chars};

/// Posts use the first 200 chars of their message as title.
pub const SOCIAL_TITLE_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    permalink_url: Option<String>,
    #[serde(default)]
    full_picture: Option<String>,
}

// Graph-style `{"data": [...]}` or a bare array of posts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Feed {
    Wrapped { data: Vec<Post> },
    Bare(Vec<Post>),
}

const AMOUNT: &str = r"(\d{1,3}(?:,\d{3})+|\d+)";

static PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"₪\s*{AMOUNT}"),
        format!(r"{AMOUNT}\s*₪"),
        format!(r"מחיר[:\s]+{AMOUNT}"),
        format!(r#"{AMOUNT}\s*(?:ש"ח|ש״ח|NIS|ILS)"#),
        format!(r"(?i)(?:NIS|ILS)\s*{AMOUNT}"),
        format!(r"\$\s*{AMOUNT}"),
        format!(r"(?i)price[:\s]+{AMOUNT}"),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static price regex"))
    .collect()
});

// Labeled phrases first; the loose "ב<place> מחיר" form last.
static LOCATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"כתובת[: ]+([א-ת ]+)",
        r"שכונת[: ]+([א-ת ]+)",
        r"(?i)(?:location|address)\s*:\s*([^\n,.;]+)",
        r"ב([א-ת ]+)מחיר",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static location regex"))
    .collect()
});

pub fn extract_price(message: &str) -> Option<f64> {
    PRICE_PATTERNS.iter().find_map(|re| {
        re.captures(message)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_price(m.as_str()))
    })
}

pub fn extract_location(message: &str) -> Option<String> {
    LOCATION_PATTERNS.iter().find_map(|re| {
        re.captures(message)
            .and_then(|c| c.get(1))
            .map(|m| normalize_text(m.as_str()))
            .filter(|s| !s.is_empty())
    })
}

pub struct SocialTextExtractor;

impl Extractor for SocialTextExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::SocialText
    }

    fn extract(
        &self,
        raw: &RawFetchResult,
        source: &SourceDescriptor,
    ) -> Result<Vec<CandidateRecord>, IngestError> {
        let body = body_of(raw)?;
        let feed: Feed = serde_json::from_str(body)
            .map_err(|e| IngestError::Extraction(format!("social feed json: {e}")))?;
        let posts = match feed {
            Feed::Wrapped { data } => data,
            Feed::Bare(v) => v,
        };

        let mut out = Vec::with_capacity(posts.len());
        for post in posts {
            let Some(text) = post.message.as_deref() else {
                continue;
            };
            let message = normalize_text(text);
            if message.is_empty() {
                continue;
            }
            // Patterns run on the raw text so line breaks still bound phrases.
            let draft = Draft {
                title: Some(truncate_chars(&message, SOCIAL_TITLE_CHARS)),
                price: extract_price(text),
                location: extract_location(text),
                description: Some(message),
                href: post.permalink_url,
                image: post.full_picture,
            };
            out.extend(draft.finish(raw, source));
        }
        Ok(out)
    }
}
