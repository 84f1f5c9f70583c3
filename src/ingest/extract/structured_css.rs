// src/ingest/extract/structured_css.rs
//! Site-specific CSS rules. Fields whose selector finds nothing stay absent;
//! they never fail the item.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::{body_of, element_text, Draft, Extractor};
use crate::ingest::error::IngestError;
use crate::ingest::parse_price;
use crate::ingest::types::{CandidateRecord, ExtractorKind, RawFetchResult, SourceDescriptor};

/// Selector rules as written in configuration. Only `item` is required;
/// the others are evaluated inside each item element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRules {
    pub item: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Element whose `href` is the record URL. Defaults to the first `a[href]`.
    #[serde(default)]
    pub url: Option<String>,
    /// Element whose `src` is the image URL. Defaults to the first `img[src]`.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

struct Compiled {
    item: Selector,
    title: Option<Selector>,
    price: Option<Selector>,
    location: Option<Selector>,
    url: Selector,
    image: Selector,
    description: Option<Selector>,
}

pub struct StructuredCssExtractor {
    rules: Compiled,
}

fn compile(field: &str, css: &str) -> Result<Selector, IngestError> {
    Selector::parse(css)
        .map_err(|e| IngestError::Configuration(format!("selector {field} '{css}': {e}")))
}

fn compile_opt(field: &str, css: Option<&String>) -> Result<Option<Selector>, IngestError> {
    css.map(|c| compile(field, c)).transpose()
}

impl StructuredCssExtractor {
    pub fn new(rules: &SelectorRules) -> Result<Self, IngestError> {
        Ok(Self {
            rules: Compiled {
                item: compile("item", &rules.item)?,
                title: compile_opt("title", rules.title.as_ref())?,
                price: compile_opt("price", rules.price.as_ref())?,
                location: compile_opt("location", rules.location.as_ref())?,
                url: compile("url", rules.url.as_deref().unwrap_or("a[href]"))?,
                image: compile("image", rules.image.as_deref().unwrap_or("img[src]"))?,
                description: compile_opt("description", rules.description.as_ref())?,
            },
        })
    }

    fn draft(&self, item: &ElementRef<'_>) -> Draft {
        let r = &self.rules;
        let text_of = |sel: &Option<Selector>| {
            sel.as_ref()
                .and_then(|s| item.select(s).next())
                .map(|el| element_text(&el))
                .filter(|t| !t.is_empty())
        };

        // The item itself may be the link.
        let href = item
            .value()
            .attr("href")
            .or_else(|| {
                item.select(&r.url)
                    .find_map(|el| el.value().attr("href"))
            })
            .map(str::to_string);
        let image = item
            .select(&r.image)
            .find_map(|el| el.value().attr("src").or_else(|| el.value().attr("data-src")))
            .map(str::to_string);

        Draft {
            title: text_of(&r.title),
            description: text_of(&r.description),
            price: text_of(&r.price).as_deref().and_then(parse_price),
            location: text_of(&r.location),
            href,
            image,
        }
    }
}

impl Extractor for StructuredCssExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::StructuredCss
    }

    fn extract(
        &self,
        raw: &RawFetchResult,
        source: &SourceDescriptor,
    ) -> Result<Vec<CandidateRecord>, IngestError> {
        let body = body_of(raw)?;
        let doc = Html::parse_document(body);
        let out = doc
            .select(&self.rules.item)
            .map(|item| self.draft(&item))
            .filter_map(|d| d.finish(raw, source))
            .collect();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::extract::test_support::{raw, source};
    use crate::ingest::types::Category;

    const PAGE: &str = r#"
    <html><body>
      <div class="listing">
        <a class="link" href="/property/101"><h3 class="t">Office  space
            in Ramat Gan</h3></a>
        <span class="price">₪ 12,500</span>
        <span class="addr">Jabotinsky 7, Ramat Gan</span>
        <img src="/img/101.jpg">
      </div>
      <div class="listing">
        <a class="link" href="/property/102"><h3 class="t">Shop on Herzl</h3></a>
        <span class="price">Contact for price</span>
      </div>
      <div class="listing">
        <h3 class="t">No link here</h3>
      </div>
    </body></html>"#;

    fn rules() -> SelectorRules {
        SelectorRules {
            item: ".listing".into(),
            title: Some(".t".into()),
            price: Some(".price".into()),
            location: Some(".addr".into()),
            url: Some("a.link".into()),
            image: None,
            description: None,
        }
    }

    #[test]
    fn extracts_fields_and_leaves_missing_ones_absent() {
        let ex = StructuredCssExtractor::new(&rules()).unwrap();
        let src = source(Category::Property, ExtractorKind::StructuredCss);
        let out = ex
            .extract(&raw("https://board.example.test/list", PAGE), &src)
            .unwrap();

        assert_eq!(out.len(), 2, "item without link is dropped");
        assert_eq!(out[0].title, "Office space in Ramat Gan");
        assert_eq!(out[0].price, Some(12_500.0));
        assert_eq!(out[0].location.as_deref(), Some("Jabotinsky 7, Ramat Gan"));
        assert_eq!(out[0].url, "https://board.example.test/property/101");
        assert_eq!(
            out[0].image_url.as_deref(),
            Some("https://board.example.test/img/101.jpg")
        );

        assert_eq!(out[1].title, "Shop on Herzl");
        assert_eq!(out[1].price, None);
        assert_eq!(out[1].location, None);
    }

    #[test]
    fn invalid_selector_is_configuration_error() {
        let mut r = rules();
        r.price = Some("span[".into());
        assert!(matches!(
            StructuredCssExtractor::new(&r),
            Err(IngestError::Configuration(_))
        ));
    }
}
