use std::sync::LazyLock;

use carwatch_core::heuristics::{detect_block, find_mileage_text, find_price_text, parse_year};
use carwatch_core::models::CandidateListing;
use carwatch_core::traits::ListingExtractor;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};

use super::{absolutize, element_text, finalize, raw_excerpt};
use crate::search_url::MARKETPLACE_BASE_URL;

/// Listing containers, most specific first. The first selector with any
/// match decides the element set.
static CONTAINER_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"div[data-testid*="marketplace"]"#,
        r#"div[data-testid*="vehicle"]"#,
        r#"a[href*="/marketplace/item/"]"#,
        r#"div[aria-label*="vehicle"]"#,
        r#"div[aria-label*="car"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("valid selector"))
    .collect()
});

static ITEM_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/marketplace/item/"]"#).expect("valid selector"));

/// Elements inspected per page before filtering.
const MAX_ELEMENTS: usize = 30;
/// Shorter element text is navigation chrome, not a listing card.
const MIN_TEXT_CHARS: usize = 10;
const TITLE_WORDS: usize = 10;

/// Extracts listing cards from marketplace search pages.
#[derive(Debug, Clone)]
pub struct MarketplaceExtractor {
    base_url: String,
    source: String,
}

impl Default for MarketplaceExtractor {
    fn default() -> Self {
        Self::new(MARKETPLACE_BASE_URL, "marketplace")
    }
}

impl MarketplaceExtractor {
    pub fn new(base_url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            source: source.into(),
        }
    }

    fn card(&self, element: ElementRef<'_>) -> Option<CandidateListing> {
        let text = element_text(element);
        if text.chars().count() <= MIN_TEXT_CHARS {
            return None;
        }
        let price = find_price_text(&text)?;
        let mileage = find_mileage_text(&text);

        let mut remainder = text.replacen(price, " ", 1);
        if let Some(mileage) = mileage {
            remainder = remainder.replacen(mileage, " ", 1);
        }
        let title = remainder
            .split_whitespace()
            .take(TITLE_WORDS)
            .collect::<Vec<_>>()
            .join(" ");
        if title.is_empty() {
            return None;
        }

        let href = element
            .value()
            .attr("href")
            .or_else(|| element.select(&ITEM_LINK).find_map(|a| a.value().attr("href")));

        let mut candidate = CandidateListing::new(&title, price, &self.source, Utc::now())
            .with_raw_text(raw_excerpt(&text));
        if let Some(year) = parse_year(&title) {
            candidate = candidate.with_year(year.to_string());
        }
        if let Some(mileage) = mileage {
            candidate = candidate.with_mileage(mileage);
        }
        if let Some(href) = href {
            candidate = candidate.with_url(absolutize(&self.base_url, href));
        }
        Some(candidate)
    }
}

impl ListingExtractor for MarketplaceExtractor {
    fn blocked_signature(&self, raw: &str) -> Option<&'static str> {
        detect_block(raw)
    }

    fn extract(&self, raw: &str) -> Vec<CandidateListing> {
        let document = Html::parse_document(raw);
        let Some(elements) = CONTAINER_SELECTORS.iter().find_map(|selector| {
            let found: Vec<ElementRef<'_>> = document.select(selector).take(MAX_ELEMENTS).collect();
            (!found.is_empty()).then_some(found)
        }) else {
            return Vec::new();
        };

        let candidates = elements.into_iter().filter_map(|el| self.card(el)).collect();
        finalize(candidates)
    }
}
