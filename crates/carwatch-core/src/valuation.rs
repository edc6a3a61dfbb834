//! Depreciation-based market value estimates and deal scoring.
//!
//! Everything here is pure computation over fixed reference tables.
//! An engine is pinned to a reference year at construction, so the same
//! inputs always produce the same estimate.
//!
//! # Pipeline
//!
//! ```text
//! base price (make/model table → make default → global default)
//!   → compounding depreciation (floored at 10% of base)
//!   → mileage adjustment vs. 12k miles/year
//!   → condition multiplier
//!   → trade-in / private-party / dealer-retail / certified ratios
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

const DEPRECIATION_SCHEDULE: [f64; 5] = [0.15, 0.10, 0.08, 0.07, 0.06];
const DEPRECIATION_FLOOR: f64 = 0.10;

pub const AVERAGE_MILES_PER_YEAR: u32 = 12_000;
const MILEAGE_RATE_PER_1K: f64 = 0.005;
const MILEAGE_ADJUSTMENT_MIN: f64 = -0.50;
const MILEAGE_ADJUSTMENT_MAX: f64 = 0.25;

const TRADE_IN_RATIO: f64 = 0.85;
const DEALER_RETAIL_RATIO: f64 = 1.15;
const CERTIFIED_RATIO: f64 = 1.20;

pub const GLOBAL_DEFAULT_PRICE: u32 = 30_000;

/// (make, model, reference price) for models with an exact entry.
static MODEL_PRICES: &[(&str, &str, u32)] = &[
    ("honda", "civic", 30_000),
    ("honda", "accord", 34_000),
    ("honda", "cr-v", 36_000),
    ("honda", "pilot", 46_000),
    ("honda", "odyssey", 42_000),
    ("honda", "hr-v", 28_000),
    ("honda", "ridgeline", 44_000),
    ("toyota", "corolla", 27_000),
    ("toyota", "camry", 33_000),
    ("toyota", "rav4", 36_000),
    ("toyota", "highlander", 45_000),
    ("toyota", "tacoma", 38_000),
    ("toyota", "tundra", 52_000),
    ("toyota", "prius", 32_000),
    ("toyota", "sienna", 42_000),
    ("ford", "mustang", 38_000),
    ("ford", "f-150", 48_000),
    ("ford", "explorer", 44_000),
    ("ford", "escape", 32_000),
    ("ford", "edge", 40_000),
    ("ford", "ranger", 36_000),
    ("ford", "expedition", 62_000),
    ("chevrolet", "malibu", 28_000),
    ("chevrolet", "camaro", 34_000),
    ("chevrolet", "silverado", 46_000),
    ("chevrolet", "equinox", 30_000),
    ("chevrolet", "traverse", 40_000),
    ("chevrolet", "tahoe", 62_000),
    ("chevrolet", "colorado", 36_000),
    ("nissan", "altima", 29_000),
    ("nissan", "sentra", 23_000),
    ("nissan", "rogue", 32_000),
    ("nissan", "pathfinder", 40_000),
    ("nissan", "frontier", 34_000),
    ("nissan", "maxima", 40_000),
    ("nissan", "murano", 38_000),
];

static MAKE_PRICES: &[(&str, u32)] = &[
    ("honda", 32_000),
    ("toyota", 33_000),
    ("ford", 38_000),
    ("chevrolet", 36_000),
    ("nissan", 30_000),
    ("mazda", 30_000),
    ("hyundai", 28_000),
    ("kia", 27_000),
    ("subaru", 32_000),
    ("volkswagen", 33_000),
    ("jeep", 40_000),
    ("dodge", 38_000),
    ("gmc", 48_000),
    ("tesla", 48_000),
    ("bmw", 55_000),
    ("mercedes", 60_000),
    ("audi", 52_000),
    ("lexus", 52_000),
    ("acura", 42_000),
    ("infiniti", 46_000),
];

static MAKE_ALIASES: &[(&str, &str)] = &[
    ("chevy", "chevrolet"),
    ("vw", "volkswagen"),
    ("mercedes-benz", "mercedes"),
    ("benz", "mercedes"),
];

const VALUE_HOLDING_MAKES: &[&str] = &["honda", "toyota", "mazda", "subaru", "lexus"];
const LUXURY_MAKES: &[&str] = &["bmw", "mercedes", "audi", "infiniti"];

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Excellent,
    VeryGood,
    #[default]
    Good,
    Fair,
    Poor,
}

impl Condition {
    pub fn multiplier(self) -> f64 {
        match self {
            Condition::Excellent => 1.10,
            Condition::VeryGood => 1.05,
            Condition::Good => 1.00,
            Condition::Fair => 0.90,
            Condition::Poor => 0.75,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Excellent => "excellent",
            Condition::VeryGood => "very_good",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::Poor => "poor",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "excellent" => Ok(Condition::Excellent),
            "very_good" => Ok(Condition::VeryGood),
            "good" => Ok(Condition::Good),
            "fair" => Ok(Condition::Fair),
            "poor" => Ok(Condition::Poor),
            other => Err(format!("Unknown condition: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Estimates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Demand {
    High,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepreciationPace {
    Slower,
    Normal,
    Faster,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInsights {
    pub demand: Demand,
    pub depreciation: DepreciationPace,
    pub notes: Vec<String>,
}

/// Four sibling price points derived from one adjusted base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEstimate {
    pub trade_in: u32,
    pub private_party: u32,
    pub dealer_retail: u32,
    pub certified: u32,
    pub confidence: Confidence,
    pub base_price: u32,
    pub age_years: u32,
    /// Fraction applied for mileage; positive means under-driven.
    pub mileage_adjustment: f64,
    pub condition: Condition,
    pub insights: MarketInsights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealRating {
    HotDeal,
    GreatDeal,
    GoodDeal,
    Fair,
    MarketPrice,
    SlightlyOverpriced,
    Overpriced,
}

impl DealRating {
    pub fn label(self) -> &'static str {
        match self {
            DealRating::HotDeal => "hot deal",
            DealRating::GreatDeal => "great deal",
            DealRating::GoodDeal => "good deal",
            DealRating::Fair => "fair",
            DealRating::MarketPrice => "market price",
            DealRating::SlightlyOverpriced => "slightly overpriced",
            DealRating::Overpriced => "overpriced",
        }
    }
}

impl fmt::Display for DealRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Auditable deal score: the label plus the numbers it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealScore {
    pub score: u8,
    pub rating: DealRating,
    pub listing_price: u32,
    pub estimated_value: u32,
    /// Estimate minus listing price; positive means below market.
    pub price_difference: i64,
    /// `price_difference` as a percentage of the estimate, one decimal.
    pub price_difference_percent: f64,
    pub below_market: bool,
    pub savings_potential: u32,
    pub analysis: String,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ValuationEngine {
    reference_year: i32,
}

impl ValuationEngine {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    /// Engine pinned to the current calendar year.
    pub fn current() -> Self {
        Self::new(chrono::Utc::now().year())
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn age_of(&self, year: i32) -> u32 {
        u32::try_from(self.reference_year - year).unwrap_or(0)
    }

    pub fn estimate_value(
        &self,
        make: &str,
        model: &str,
        year: i32,
        mileage: Option<u32>,
        condition: Condition,
    ) -> ValueEstimate {
        let make = canonical_make(make);
        let model = canonical_model(model);
        let (base_price, confidence) = base_price(&make, &model);
        let age = self.age_of(year);

        let mut value = depreciate(f64::from(base_price), age);

        let mileage_adjustment = mileage
            .map(|miles| mileage_adjustment(miles, age))
            .unwrap_or(0.0);
        value *= 1.0 + mileage_adjustment;
        value *= condition.multiplier();

        ValueEstimate {
            trade_in: to_dollars(value * TRADE_IN_RATIO),
            private_party: to_dollars(value),
            dealer_retail: to_dollars(value * DEALER_RETAIL_RATIO),
            certified: to_dollars(value * CERTIFIED_RATIO),
            confidence,
            base_price,
            age_years: age,
            mileage_adjustment,
            condition,
            insights: market_insights(&make, age),
        }
    }

    pub fn score_deal(&self, listing_price: u32, estimate: &ValueEstimate) -> DealScore {
        let estimated_value = estimate.private_party;
        let price_difference = i64::from(estimated_value) - i64::from(listing_price);
        let percent = if estimated_value == 0 {
            0.0
        } else {
            price_difference as f64 / f64::from(estimated_value) * 100.0
        };

        let (score, rating) = match percent {
            p if p >= 20.0 => (95, DealRating::HotDeal),
            p if p >= 10.0 => (85, DealRating::GreatDeal),
            p if p >= 5.0 => (75, DealRating::GoodDeal),
            p if p >= 0.0 => (65, DealRating::Fair),
            p if p >= -5.0 => (50, DealRating::MarketPrice),
            p if p >= -10.0 => (35, DealRating::SlightlyOverpriced),
            _ => (20, DealRating::Overpriced),
        };

        DealScore {
            score,
            rating,
            listing_price,
            estimated_value,
            price_difference,
            price_difference_percent: (percent * 10.0).round() / 10.0,
            below_market: price_difference > 0,
            savings_potential: u32::try_from(price_difference.max(0)).unwrap_or(u32::MAX),
            analysis: deal_analysis(rating, percent),
        }
    }
}

impl Default for ValuationEngine {
    fn default() -> Self {
        Self::current()
    }
}

fn base_price(make: &str, model: &str) -> (u32, Confidence) {
    if let Some(&(_, _, price)) = MODEL_PRICES
        .iter()
        .find(|(mk, md, _)| *mk == make && *md == model)
    {
        return (price, Confidence::High);
    }
    match MAKE_PRICES.iter().find(|(mk, _)| *mk == make) {
        Some(&(_, price)) => (price, Confidence::Medium),
        None => (GLOBAL_DEFAULT_PRICE, Confidence::Low),
    }
}

fn depreciate(base: f64, age: u32) -> f64 {
    let mut value = base;
    for year in 1..=age {
        let idx = (year as usize - 1).min(DEPRECIATION_SCHEDULE.len() - 1);
        value *= 1.0 - DEPRECIATION_SCHEDULE[idx];
    }
    value.max(base * DEPRECIATION_FLOOR)
}

/// Fractional value change for `miles` on a car `age` years old.
fn mileage_adjustment(miles: u32, age: u32) -> f64 {
    let expected = f64::from(age) * f64::from(AVERAGE_MILES_PER_YEAR);
    let over_by_thousands = (f64::from(miles) - expected) / 1000.0;
    (-over_by_thousands * MILEAGE_RATE_PER_1K).clamp(MILEAGE_ADJUSTMENT_MIN, MILEAGE_ADJUSTMENT_MAX)
}

fn to_dollars(value: f64) -> u32 {
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

fn market_insights(make: &str, age: u32) -> MarketInsights {
    let mut insights = MarketInsights {
        demand: Demand::Average,
        depreciation: DepreciationPace::Normal,
        notes: Vec::new(),
    };

    if VALUE_HOLDING_MAKES.contains(&make) {
        insights.demand = Demand::High;
        insights.depreciation = DepreciationPace::Slower;
        insights.notes.push("Brand typically holds its value well".into());
    } else if LUXURY_MAKES.contains(&make) {
        insights.depreciation = DepreciationPace::Faster;
        insights.notes.push("Luxury vehicles typically depreciate faster".into());
    }

    if age <= 3 {
        insights.notes.push("Likely still within factory warranty".into());
    } else if age >= 7 {
        insights.notes.push("Most depreciation has already occurred".into());
    }

    insights
}

fn deal_analysis(rating: DealRating, percent: f64) -> String {
    let pct = percent.abs();
    match rating {
        DealRating::HotDeal => format!("Priced {pct:.1}% below estimated market value. Rarely lasts long."),
        DealRating::GreatDeal => format!("Priced {pct:.1}% below typical market value."),
        DealRating::GoodDeal => format!("Priced {pct:.1}% below market with some room to negotiate."),
        DealRating::Fair => format!("Priced at or slightly below market ({pct:.1}%)."),
        DealRating::MarketPrice => "Priced at about what similar vehicles sell for.".to_string(),
        DealRating::SlightlyOverpriced | DealRating::Overpriced => {
            format!("Priced {pct:.1}% above estimated market value. Consider negotiating.")
        }
    }
}

// ---------------------------------------------------------------------------
// Vehicle identification
// ---------------------------------------------------------------------------

pub(crate) fn canonical_make(make: &str) -> String {
    let make = make.trim().to_ascii_lowercase();
    MAKE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == make)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(make)
}

fn canonical_model(model: &str) -> String {
    let model = model.trim().to_ascii_lowercase();
    let squashed = squash(&model);
    MODEL_PRICES
        .iter()
        .find(|(_, md, _)| squash(md) == squashed)
        .map(|(_, md, _)| (*md).to_string())
        .unwrap_or(model)
}

fn squash(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn is_known_make(make: &str) -> bool {
    MAKE_PRICES.iter().any(|(mk, _)| *mk == make)
}

/// Best-effort (make, model) from free text such as a listing title.
///
/// A model with a table entry implies its make when the make is absent.
pub fn identify_vehicle(text: &str) -> (Option<String>, Option<String>) {
    let lower = text.to_ascii_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty())
        .collect();

    let make = tokens
        .iter()
        .map(|t| canonical_make(t))
        .find(|t| is_known_make(t));

    let model_matches = |make_filter: Option<&str>| {
        tokens.iter().find_map(|token| {
            let squashed = squash(token);
            MODEL_PRICES
                .iter()
                .filter(|(mk, _, _)| make_filter.is_none_or(|f| f == *mk))
                .find(|(_, md, _)| squash(md) == squashed)
                .map(|(mk, md, _)| ((*mk).to_string(), (*md).to_string()))
        })
    };

    match make {
        Some(make) => {
            let model = model_matches(Some(&make)).map(|(_, md)| md);
            (Some(make), model)
        }
        None => match model_matches(None) {
            Some((mk, md)) => (Some(mk), Some(md)),
            None => (None, None),
        },
    }
}
