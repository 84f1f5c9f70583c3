// src/ingest/mod.rs
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod registry;
pub mod repository;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use url::Url;

pub use error::IngestError;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Finished runs by category and status.");
        describe_counter!(
            "ingest_source_errors_total",
            "Sources that failed within a run."
        );
        describe_counter!(
            "ingest_items_seen_total",
            "Identifiable candidates produced by extractors."
        );
        describe_counter!("ingest_items_new_total", "Records created by upserts.");
        describe_counter!(
            "ingest_dedup_dropped_total",
            "Candidates removed by key or near-duplicate dedup."
        );
        describe_counter!(
            "ingest_triggers_skipped_total",
            "Triggers skipped because a run for the category was in flight."
        );
        describe_histogram!("ingest_fetch_ms", "Source fetch time in milliseconds.");
        describe_histogram!("ingest_run_ms", "Whole run time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when a category last finished a run.");
    });
}

/// Normalize scraped text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. nbsp)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Like `normalize_text`, but `None` when nothing is left.
pub fn clean_opt(s: Option<&str>) -> Option<String> {
    s.map(normalize_text).filter(|t| !t.is_empty())
}

/// Cut to at most `max` chars, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Parse a displayed price into an amount.
///
/// Currency symbols, words and thousands separators are ignored; the first
/// number in the text wins. Text without a well-formed number gives `None`.
pub fn parse_price(text: &str) -> Option<f64> {
    static RE_NUM: OnceCell<Regex> = OnceCell::new();
    let re = RE_NUM.get_or_init(|| {
        Regex::new(r"(?:^|[^\d.,])(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?(?:[^\d,]|$)").unwrap()
    });
    let caps = re.captures(text)?;
    let int_part = caps.get(1)?.as_str().replace(',', "");
    let frac = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let amount: f64 = format!("{int_part}{frac}").parse().ok()?;
    amount.is_finite().then_some(amount)
}

/// Resolve `href` against the page it came from.
///
/// Handles `/path`, `//host/path` and relative paths. Fragments-only links,
/// script/mail/tel links and non-http(s) results are unresolvable.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        return None;
    }

    let resolved = match Url::parse(href) {
        Ok(abs) => abs,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base).ok()?.join(href).ok()?,
        Err(_) => return None,
    };
    match resolved.scheme() {
        "http" | "https" if resolved.host_str().is_some() => Some(resolved.to_string()),
        _ => None,
    }
}

/// Comparison form of a title: lowercase, single spaces.
pub fn title_key(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Case-insensitive content fingerprint of a title (16 hex chars of SHA-256).
pub fn title_fingerprint(title: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(title_key(title).as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
