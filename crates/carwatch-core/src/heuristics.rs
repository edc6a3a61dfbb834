//! Tolerant text heuristics shared by every extraction strategy.
//!
//! Numeric parsers never fail: anything unparseable comes back as `None`,
//! which downstream stages treat as "unknown" rather than zero.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{QualityIndicator, VehicleAttributes};
use crate::valuation::{AVERAGE_MILES_PER_YEAR, Condition, DealScore};

static PRICE_K_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\$\s*(\d+(?:\.\d+)?)\s*k\b|^\s*(\d+(?:\.\d+)?)\s*k\s*$").expect("valid regex"));
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$?\s*(\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?").expect("valid regex"));
static PRICE_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s?\d[\d,]*").expect("valid regex"));
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid regex"));
static MILEAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(k)?\s*(?:miles?|mi)\b").expect("valid regex")
});
static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

const VEHICLE_KEYWORDS: &[&str] = &[
    "car", "cars", "auto", "vehicle", "sedan", "suv", "truck", "pickup", "coupe", "wagon",
    "hatchback", "convertible", "minivan", "van", "honda", "toyota", "ford", "chevrolet", "chevy",
    "nissan", "bmw", "mercedes", "audi", "volkswagen", "hyundai", "kia", "mazda", "subaru", "jeep",
    "dodge", "gmc", "lexus", "acura", "infiniti", "tesla", "porsche", "volvo", "buick",
    "cadillac", "lincoln", "chrysler", "mitsubishi", "genesis", "jaguar", "ram", "miles", "mileage", "odometer",
    "engine", "transmission", "automatic", "manual", "awd", "4wd", "mpg", "vin",
];

const NON_VEHICLE_KEYWORDS: &[&str] = &[
    "house", "apartment", "rent", "bedroom", "furniture", "sofa", "couch", "mattress", "phone",
    "iphone", "computer", "laptop", "tablet", "clothing", "shoes", "toy", "toys", "book", "game",
    "electronics", "tv",
];

/// (label, phrases) pairs identifying pages that never reached real content.
const BLOCK_SIGNATURES: &[(&str, &[&str])] = &[
    (
        "login wall",
        &[
            "you must log in to continue",
            "log in to continue",
            "please log in",
            "log into facebook",
        ],
    ),
    ("checkpoint", &["/checkpoint/", "security check required"]),
    ("captcha", &["captcha"]),
    (
        "unusual traffic",
        &["unusual traffic", "automated queries", "suspicious activity"],
    ),
    (
        "access denied",
        &[
            "access denied",
            "request blocked",
            "you've been blocked",
            "temporarily blocked",
            "has been automatically blocked",
        ],
    ),
    ("rate limited", &["too many requests"]),
];

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

fn to_u32(value: f64) -> Option<u32> {
    (value.is_finite() && value >= 0.0 && value <= f64::from(u32::MAX)).then(|| value.round() as u32)
}

/// Parse a currency string: "$19,500", "19500", "$12.5k".
pub fn parse_price(raw: &str) -> Option<u32> {
    if let Some(caps) = PRICE_K_RE.captures(raw) {
        let num = caps.get(1).or_else(|| caps.get(2))?;
        return to_u32(parse_number(num.as_str())? * 1000.0);
    }
    let caps = PRICE_RE.captures(raw)?;
    to_u32(parse_number(caps.get(1)?.as_str())?)
}

/// First plausible model year in the text.
pub fn parse_year(raw: &str) -> Option<i32> {
    YEAR_RE.find(raw)?.as_str().parse().ok()
}

/// Parse odometer text: "30,000 miles", "30k mi", or a bare "30000".
pub fn parse_mileage(raw: &str) -> Option<u32> {
    if let Some(caps) = MILEAGE_RE.captures(raw) {
        let value = parse_number(caps.get(1)?.as_str())?;
        let multiplier = if caps.get(2).is_some() { 1000.0 } else { 1.0 };
        return to_u32(value * multiplier);
    }
    let bare = raw.trim().replace(',', "");
    if !bare.is_empty() && bare.chars().all(|c| c.is_ascii_digit()) {
        return bare.parse().ok();
    }
    None
}

/// First "$1,234"-style amount embedded in free text.
pub fn find_price_text(text: &str) -> Option<&str> {
    PRICE_IN_TEXT_RE.find(text).map(|m| m.as_str())
}

/// Mileage phrase embedded in free text, as written.
pub fn find_mileage_text(text: &str) -> Option<&str> {
    MILEAGE_RE.find(text).map(|m| m.as_str())
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    NON_ALNUM_RE
        .replace_all(&title.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Digits of the parsed price, or the normalized text when there is none.
pub fn normalize_price(price: &str) -> String {
    match parse_price(price) {
        Some(p) => p.to_string(),
        None => normalize_title(price),
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// (positive, negative) keyword scores for a piece of text.
pub fn relevance_scores(text: &str) -> (usize, usize) {
    let tokens = tokens(text);
    let count = |keywords: &[&str]| keywords.iter().filter(|k| tokens.contains(**k)).count();
    (count(VEHICLE_KEYWORDS), count(NON_VEHICLE_KEYWORDS))
}

/// Keep a candidate only when vehicle signals outweigh everything else.
pub fn is_likely_vehicle(text: &str) -> bool {
    let (positive, negative) = relevance_scores(text);
    positive > 0 && positive > negative
}

/// Label of the first block signature found in a raw response.
pub fn detect_block(raw: &str) -> Option<&'static str> {
    let lower = raw.to_lowercase();
    BLOCK_SIGNATURES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
        .map(|(label, _)| *label)
}

/// Condition hinted at by the listing text, if any.
pub fn infer_condition(text: &str) -> Option<Condition> {
    let lower = text.to_lowercase();
    let has = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));

    if has(&["for parts", "parts only", "not running", "doesn't run", "does not run"]) {
        Some(Condition::Poor)
    } else if has(&["needs work", "mechanic special", "needs repair", "project car"]) {
        Some(Condition::Fair)
    } else if has(&["like new", "mint condition", "showroom"]) {
        Some(Condition::Excellent)
    } else if has(&["excellent condition", "very clean", "well maintained", "garage kept"]) {
        Some(Condition::VeryGood)
    } else {
        None
    }
}

/// (value, tokens) tables for attribute inference; first match wins.
const FUEL_TYPES: &[(&str, &[&str])] = &[
    ("hybrid", &["hybrid", "phev"]),
    ("electric", &["electric", "ev", "bev"]),
    ("diesel", &["diesel", "tdi"]),
    ("gasoline", &["gas", "gasoline", "petrol"]),
];

const TRANSMISSIONS: &[(&str, &[&str])] = &[
    ("manual", &["manual", "stick", "stickshift"]),
    ("automatic", &["automatic", "auto", "cvt", "tiptronic"]),
];

const BODY_STYLES: &[(&str, &[&str])] = &[
    ("convertible", &["convertible", "cabriolet", "roadster"]),
    ("minivan", &["minivan", "van"]),
    ("truck", &["truck", "pickup"]),
    ("suv", &["suv", "crossover"]),
    ("wagon", &["wagon", "estate"]),
    ("hatchback", &["hatchback", "hatch"]),
    ("coupe", &["coupe"]),
    ("sedan", &["sedan"]),
];

const COLORS: &[(&str, &[&str])] = &[
    ("black", &["black"]),
    ("white", &["white"]),
    ("silver", &["silver"]),
    ("gray", &["gray", "grey", "charcoal", "gunmetal"]),
    ("red", &["red", "maroon", "burgundy"]),
    ("blue", &["blue", "navy"]),
    ("green", &["green"]),
    ("beige", &["beige", "tan"]),
    ("brown", &["brown"]),
    ("gold", &["gold"]),
    ("orange", &["orange"]),
    ("yellow", &["yellow"]),
    ("purple", &["purple"]),
];

/// Fuel type, transmission, body style and color named in the listing text.
///
/// Matches whole words only, so "blues" or "automated" never count.
pub fn infer_attributes(text: &str) -> VehicleAttributes {
    let tokens = tokens(text);
    let lookup = |table: &[(&str, &[&str])]| {
        table
            .iter()
            .find(|(_, words)| words.iter().any(|w| tokens.contains(*w)))
            .map(|(value, _)| (*value).to_string())
    };

    VehicleAttributes {
        fuel_type: lookup(FUEL_TYPES),
        transmission: lookup(TRANSMISSIONS),
        body_style: lookup(BODY_STYLES),
        color: lookup(COLORS),
    }
}

/// Indicators derived from listing text, mileage, age and the deal score.
pub fn quality_indicators(
    text: &str,
    mileage: Option<u32>,
    age_years: Option<u32>,
    deal: Option<&DealScore>,
) -> Vec<QualityIndicator> {
    let lower = text.to_lowercase();
    let has = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));
    let mut out = Vec::new();

    if let Some(miles) = mileage {
        let expected = age_years.map(|age| u64::from(age.max(1)) * u64::from(AVERAGE_MILES_PER_YEAR));
        let miles = u64::from(miles);
        let (low, high) = match expected {
            Some(expected) => (miles * 10 < expected * 6, miles * 10 > expected * 15),
            None => (miles < 30_000, miles > 150_000),
        };
        if low {
            out.push(QualityIndicator::LowMileage);
        } else if high {
            out.push(QualityIndicator::HighMileage);
        }
    }

    if let Some(deal) = deal {
        if deal.price_difference_percent >= 5.0 {
            out.push(QualityIndicator::BelowMarket);
        } else if deal.price_difference_percent <= -10.0 {
            out.push(QualityIndicator::AboveMarket);
        }
    }

    if has(&["certified", "cpo", "service records", "maintenance records", "carfax"]) {
        out.push(QualityIndicator::CertifiedDocumented);
    }

    let accident_free = has(&["no accident", "accident free", "accident-free", "never been in an accident"]);
    if !accident_free && has(&["accident", "frame damage", "flood damage", "hail damage"]) {
        out.push(QualityIndicator::AccidentIndicated);
    }

    if has(&["salvage", "rebuilt title", "branded title"]) {
        out.push(QualityIndicator::SalvageTitle);
    } else if has(&["clean title"]) {
        out.push(QualityIndicator::CleanTitle);
    }

    if has(&["one owner", "1 owner", "single owner", "1-owner"]) {
        out.push(QualityIndicator::OneOwner);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_parsing_is_tolerant() {
        assert_eq!(parse_price("$19,500"), Some(19_500));
        assert_eq!(parse_price("19500"), Some(19_500));
        assert_eq!(parse_price("$ 7,250.00"), Some(7_250));
        assert_eq!(parse_price("$12.5k"), Some(12_500));
        assert_eq!(parse_price("12k"), Some(12_000));
        assert_eq!(parse_price("Free"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn year_parsing_finds_first_model_year() {
        assert_eq!(parse_year("2021 Honda Civic LX"), Some(2021));
        assert_eq!(parse_year("Civic 1999 model"), Some(1999));
        assert_eq!(parse_year("Civic 12345"), None);
        assert_eq!(parse_year("no year"), None);
    }

    #[test]
    fn mileage_parsing_handles_common_forms() {
        assert_eq!(parse_mileage("30,000 miles"), Some(30_000));
        assert_eq!(parse_mileage("30k mi"), Some(30_000));
        assert_eq!(parse_mileage("45K Miles"), Some(45_000));
        assert_eq!(parse_mileage("88000"), Some(88_000));
        assert_eq!(parse_mileage("low miles"), None);
    }

    #[test]
    fn finds_embedded_values() {
        let text = "2018 Toyota Camry SE $15,900 Miami, FL 62,000 miles";
        assert_eq!(find_price_text(text), Some("$15,900"));
        assert_eq!(find_mileage_text(text), Some("62,000 miles"));
    }

    #[test]
    fn title_normalization_collapses_noise() {
        assert_eq!(normalize_title("  2021 Honda  Civic-LX!! "), "2021 honda civic lx");
    }

    #[test]
    fn classifier_requires_positive_majority() {
        assert!(is_likely_vehicle("2021 Honda Civic LX automatic"));
        assert!(!is_likely_vehicle("Leather sofa and couch"));
        assert!(!is_likely_vehicle("Gift card bundle"));
        // tie: one vehicle word, one non-vehicle word
        assert!(!is_likely_vehicle("toy truck"));
        assert!(is_likely_vehicle("toy truck sedan"));
    }

    #[test]
    fn detects_block_pages() {
        assert_eq!(
            detect_block("<html>You must log in to continue.</html>"),
            Some("login wall")
        );
        assert_eq!(detect_block("Please complete the CAPTCHA"), Some("captcha"));
        assert_eq!(
            detect_block("We detected unusual traffic from your network"),
            Some("unusual traffic")
        );
        assert_eq!(detect_block("<div>2021 Honda Civic $19,500</div>"), None);
    }

    #[test]
    fn infers_attributes_from_listing_text() {
        let attrs = infer_attributes("2019 Toyota Camry Hybrid SE sedan, automatic, silver, one owner");
        assert_eq!(attrs.fuel_type.as_deref(), Some("hybrid"));
        assert_eq!(attrs.transmission.as_deref(), Some("automatic"));
        assert_eq!(attrs.body_style.as_deref(), Some("sedan"));
        assert_eq!(attrs.color.as_deref(), Some("silver"));

        let attrs = infer_attributes("2016 Ford F-150 pickup 6-speed manual, grey, diesel");
        assert_eq!(attrs.fuel_type.as_deref(), Some("diesel"));
        assert_eq!(attrs.transmission.as_deref(), Some("manual"));
        assert_eq!(attrs.body_style.as_deref(), Some("truck"));
        assert_eq!(attrs.color.as_deref(), Some("gray"));
    }

    #[test]
    fn attribute_inference_needs_whole_words() {
        let attrs = infer_attributes("2021 Honda Civic, automated parking, redline blues");
        assert_eq!(attrs, VehicleAttributes::default());
    }

    #[test]
    fn infers_condition_from_phrases() {
        assert_eq!(infer_condition("Like new, garage kept"), Some(Condition::Excellent));
        assert_eq!(infer_condition("Needs work on brakes"), Some(Condition::Fair));
        assert_eq!(infer_condition("Selling for parts only"), Some(Condition::Poor));
        assert_eq!(infer_condition("Runs great"), None);
    }

    #[test]
    fn quality_indicators_combine_text_and_numbers() {
        let indicators = quality_indicators(
            "One owner, clean title, service records available",
            Some(10_000),
            Some(3),
            None,
        );
        assert!(indicators.contains(&QualityIndicator::LowMileage));
        assert!(indicators.contains(&QualityIndicator::CleanTitle));
        assert!(indicators.contains(&QualityIndicator::OneOwner));
        assert!(indicators.contains(&QualityIndicator::CertifiedDocumented));
        assert!(!indicators.contains(&QualityIndicator::AccidentIndicated));
    }

    #[test]
    fn accident_free_is_not_an_accident() {
        let clean = quality_indicators("Accident free, no issues", None, None, None);
        assert!(!clean.contains(&QualityIndicator::AccidentIndicated));

        let damaged = quality_indicators("Minor accident on rear bumper", None, None, None);
        assert!(damaged.contains(&QualityIndicator::AccidentIndicated));
    }

    #[test]
    fn high_mileage_for_age() {
        let indicators = quality_indicators("", Some(150_000), Some(4), None);
        assert_eq!(indicators, vec![QualityIndicator::HighMileage]);
    }
}
