use std::sync::LazyLock;

use carwatch_core::heuristics::{detect_block, find_mileage_text, find_price_text, parse_year};
use carwatch_core::models::CandidateListing;
use carwatch_core::traits::ListingExtractor;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};

use super::{absolutize, element_text, finalize, raw_excerpt};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static ROW: LazyLock<Selector> =
    LazyLock::new(|| selector("li.cl-static-search-result, li.cl-search-result, li.result-row"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| selector(".title, .posting-title .label, .result-title"));
static PRICE: LazyLock<Selector> = LazyLock::new(|| selector(".price, .priceinfo, .result-price"));
static META: LazyLock<Selector> = LazyLock::new(|| selector(".meta, .location, .result-hood"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

/// Extracts rows from classifieds "cars & trucks" result pages.
#[derive(Debug, Clone)]
pub struct ClassifiedsExtractor {
    base_url: String,
    source: String,
}

impl ClassifiedsExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            source: "classifieds".to_string(),
        }
    }

    fn first_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
        row.select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    }

    fn row(&self, row: ElementRef<'_>) -> Option<CandidateListing> {
        let text = element_text(row);
        let title = Self::first_text(row, &TITLE)?;
        let price = Self::first_text(row, &PRICE)
            .or_else(|| find_price_text(&text).map(str::to_string))?;

        let mut candidate =
            CandidateListing::new(&title, price, &self.source, Utc::now()).with_raw_text(raw_excerpt(&text));
        candidate.location = Self::first_text(row, &META)
            .map(|meta| meta.trim_matches(|c| c == '(' || c == ')').trim().to_string())
            .filter(|meta| !meta.is_empty());
        if let Some(year) = parse_year(&title) {
            candidate = candidate.with_year(year.to_string());
        }
        if let Some(mileage) = find_mileage_text(&text) {
            candidate = candidate.with_mileage(mileage);
        }
        if let Some(href) = row.select(&LINK).find_map(|a| a.value().attr("href")) {
            candidate = candidate.with_url(absolutize(&self.base_url, href));
        }
        Some(candidate)
    }
}

impl ListingExtractor for ClassifiedsExtractor {
    fn blocked_signature(&self, raw: &str) -> Option<&'static str> {
        detect_block(raw)
    }

    fn extract(&self, raw: &str) -> Vec<CandidateListing> {
        let document = Html::parse_document(raw);
        let candidates = document.select(&ROW).filter_map(|row| self.row(row)).collect();
        finalize(candidates)
    }
}
