//! HTML listing extractors, one per source layout.

mod classifieds;
mod marketplace;

use std::collections::HashSet;

use carwatch_core::heuristics::is_likely_vehicle;
use carwatch_core::models::CandidateListing;
use scraper::ElementRef;

pub use classifieds::ClassifiedsExtractor;
pub use marketplace::MarketplaceExtractor;

/// Candidates kept per page after relevance filtering.
pub const MAX_CANDIDATES_PER_PAGE: usize = 15;

/// Characters of source text kept on each candidate.
const RAW_TEXT_CHARS: usize = 200;

/// Visible text of an element with whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub(crate) fn raw_excerpt(text: &str) -> String {
    truncate_chars(text, RAW_TEXT_CHARS)
}

/// Resolve a possibly relative href against the source origin.
pub(crate) fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let base = base.trim_end_matches('/');
    if href.starts_with('/') {
        format!("{base}{href}")
    } else {
        format!("{base}/{href}")
    }
}

/// Drop repeats and non-vehicles, then cap the page.
pub(crate) fn finalize(candidates: Vec<CandidateListing>) -> Vec<CandidateListing> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.fingerprint()))
        .filter(|c| is_likely_vehicle(&c.text()))
        .take(MAX_CANDIDATES_PER_PAGE)
        .collect()
}
