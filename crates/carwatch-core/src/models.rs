use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::heuristics::{normalize_price, normalize_title};
use crate::valuation::{Condition, DealScore, ValueEstimate};

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Service level determining polling cadence and active-search quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Premium,
    Pro,
    Free,
}

impl Tier {
    /// Fixed processing order: fastest cadence first.
    pub const ALL: [Tier; 3] = [Tier::Premium, Tier::Pro, Tier::Free];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Premium => "premium",
            Tier::Pro => "pro",
            Tier::Free => "free",
        }
    }

    /// Contracted polling interval.
    pub fn default_interval(self) -> Duration {
        match self {
            Tier::Premium => Duration::from_secs(5 * 60),
            Tier::Pro => Duration::from_secs(15 * 60),
            Tier::Free => Duration::from_secs(25 * 60),
        }
    }

    /// Active searches polled per account on this tier.
    pub fn default_max_searches(self) -> usize {
        match self {
            Tier::Premium => 25,
            Tier::Pro => 10,
            Tier::Free => 2,
        }
    }

    /// Billing plan names that share this tier's limits.
    pub fn plan_names(self) -> &'static [&'static str] {
        match self {
            Tier::Premium => &["premium", "premium_monthly", "premium_annual"],
            Tier::Pro => &["pro", "pro_monthly", "pro_annual", "basic"],
            Tier::Free => &["free", "trial"],
        }
    }

    /// Map a billing plan name onto its tier.
    pub fn from_plan(plan: &str) -> Option<Tier> {
        let plan = plan.trim().to_ascii_lowercase();
        Tier::ALL
            .into_iter()
            .find(|tier| tier.plan_names().contains(&plan.as_str()))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::from_plan(s).ok_or_else(|| format!("Unknown tier or plan: '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// SearchSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Free-text location plus optionally resolved coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub text: String,
    pub coordinates: Option<Coordinates>,
}

impl Location {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            coordinates: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub const DEFAULT_RADIUS_MILES: u32 = 25;

/// A saved vehicle search. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpec {
    pub id: Uuid,
    pub account_id: Uuid,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub price_min: Option<u32>,
    pub price_max: Option<u32>,
    pub mileage_max: Option<u32>,
    #[serde(default)]
    pub location: Location,
    #[serde(default = "default_radius")]
    pub radius_miles: u32,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
}

fn default_radius() -> u32 {
    DEFAULT_RADIUS_MILES
}

impl SearchSpec {
    pub fn new(tier: Tier) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            make: None,
            model: None,
            year_min: None,
            year_max: None,
            price_min: None,
            price_max: None,
            mileage_max: None,
            location: Location::default(),
            radius_miles: DEFAULT_RADIUS_MILES,
            tier,
            created_at: Utc::now(),
        }
    }

    pub fn with_vehicle(mut self, make: impl Into<String>, model: impl Into<String>) -> Self {
        self.make = Some(make.into());
        self.model = Some(model.into());
        self
    }

    pub fn with_years(mut self, min: Option<i32>, max: Option<i32>) -> Self {
        self.year_min = min;
        self.year_max = max;
        self
    }

    pub fn with_prices(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.price_min = min;
        self.price_max = max;
        self
    }

    pub fn with_mileage_max(mut self, max: u32) -> Self {
        self.mileage_max = Some(max);
        self
    }

    pub fn with_location(mut self, location: Location, radius_miles: u32) -> Self {
        self.location = location;
        self.radius_miles = radius_miles;
        self
    }

    pub fn with_account(mut self, account_id: Uuid) -> Self {
        self.account_id = account_id;
        self
    }

    /// Search phrase sent to sources: "make model", or "car" when neither is set.
    pub fn query_text(&self) -> String {
        let parts: Vec<&str> = [self.make.as_deref(), self.model.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            "car".to_string()
        } else {
            parts.join(" ")
        }
    }

    /// Whether parsed listing values fall inside this search's bounds.
    ///
    /// Unknown values always pass.
    pub fn admits(&self, price: Option<u32>, year: Option<i32>, mileage: Option<u32>) -> bool {
        let within = |v: Option<i64>, lo: Option<i64>, hi: Option<i64>| match v {
            None => true,
            Some(v) => lo.is_none_or(|lo| v >= lo) && hi.is_none_or(|hi| v <= hi),
        };

        within(
            price.map(i64::from),
            self.price_min.map(i64::from),
            self.price_max.map(i64::from),
        ) && within(
            year.map(i64::from),
            self.year_min.map(i64::from),
            self.year_max.map(i64::from),
        ) && within(mileage.map(i64::from), None, self.mileage_max.map(i64::from))
    }
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleAttributes {
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub body_style: Option<String>,
    pub color: Option<String>,
}

impl VehicleAttributes {
    /// Take each attribute from `other` only where this one is unknown.
    pub fn fill_missing(&mut self, other: VehicleAttributes) {
        self.fuel_type = self.fuel_type.take().or(other.fuel_type);
        self.transmission = self.transmission.take().or(other.transmission);
        self.body_style = self.body_style.take().or(other.body_style);
        self.color = self.color.take().or(other.color);
    }
}

/// A raw listing as extracted from one source, before dedup and enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateListing {
    pub title: String,
    /// Raw currency string as shown by the source.
    pub price: String,
    pub year: Option<String>,
    pub mileage: Option<String>,
    pub url: Option<String>,
    pub source: String,
    pub location: Option<String>,
    #[serde(default)]
    pub attributes: VehicleAttributes,
    #[serde(default)]
    pub raw_text: String,
    pub captured_at: DateTime<Utc>,
}

impl CandidateListing {
    pub fn new(
        title: impl Into<String>,
        price: impl Into<String>,
        source: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            price: price.into(),
            year: None,
            mileage: None,
            url: None,
            source: source.into(),
            location: None,
            attributes: VehicleAttributes::default(),
            raw_text: String::new(),
            captured_at,
        }
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    pub fn with_mileage(mut self, mileage: impl Into<String>) -> Self {
        self.mileage = Some(mileage.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_raw_text(mut self, text: impl Into<String>) -> Self {
        self.raw_text = text.into();
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.title, &self.price)
    }

    /// Title plus raw text, for keyword heuristics.
    pub fn text(&self) -> String {
        if self.raw_text.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.raw_text)
        }
    }
}

/// Coarse dedup key: normalized title plus normalized price.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(title: &str, price: &str) -> Self {
        let key = format!("{}|{}", normalize_title(title), normalize_price(price));
        Self(compute_hash(&key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIndicator {
    LowMileage,
    HighMileage,
    BelowMarket,
    AboveMarket,
    CertifiedDocumented,
    AccidentIndicated,
    SalvageTitle,
    CleanTitle,
    OneOwner,
}

impl QualityIndicator {
    pub fn label(self) -> &'static str {
        match self {
            QualityIndicator::LowMileage => "low mileage",
            QualityIndicator::HighMileage => "high mileage",
            QualityIndicator::BelowMarket => "below market",
            QualityIndicator::AboveMarket => "above market",
            QualityIndicator::CertifiedDocumented => "certified/documented",
            QualityIndicator::AccidentIndicated => "accident indicated",
            QualityIndicator::SalvageTitle => "salvage/rebuilt title",
            QualityIndicator::CleanTitle => "clean title",
            QualityIndicator::OneOwner => "one owner",
        }
    }
}

/// A validated listing with parsed numbers, value estimate and deal score.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedListing {
    pub id: Uuid,
    pub search_id: Uuid,
    pub fingerprint: Fingerprint,
    pub listing: CandidateListing,
    pub price: Option<u32>,
    pub year: Option<i32>,
    pub mileage: Option<u32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub condition: Condition,
    pub estimate: Option<ValueEstimate>,
    pub deal: Option<DealScore>,
    pub quality_indicators: Vec<QualityIndicator>,
    pub enriched_at: DateTime<Utc>,
}

impl EnrichedListing {
    /// Analytics row for this listing, if enough is known.
    pub fn price_observation(&self, location: &str) -> Option<PriceObservation> {
        Some(PriceObservation {
            make: self.make.clone()?,
            model: self.model.clone()?,
            year: self.year?,
            location: location.to_string(),
            price: self.price?,
            mileage: self.mileage,
        })
    }
}

/// One row for the price-history analytics sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub location: String,
    pub price: u32,
    pub mileage: Option<u32>,
}

// ---------------------------------------------------------------------------
// Strategy kinds
// ---------------------------------------------------------------------------

/// Acquisition channel families, in fallback-chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RemoteWorker,
    DirectFetch,
    /// Browser-rendered direct fetch, tried only when plain HTTP finds nothing.
    HeadlessFetch,
    SecondarySource,
    Synthetic,
}

impl StrategyKind {
    pub const CHAIN: [StrategyKind; 5] = [
        StrategyKind::RemoteWorker,
        StrategyKind::DirectFetch,
        StrategyKind::HeadlessFetch,
        StrategyKind::SecondarySource,
        StrategyKind::Synthetic,
    ];

    pub fn priority(self) -> u8 {
        match self {
            StrategyKind::RemoteWorker => 0,
            StrategyKind::DirectFetch => 1,
            StrategyKind::HeadlessFetch => 2,
            StrategyKind::SecondarySource => 3,
            StrategyKind::Synthetic => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::RemoteWorker => "remote_worker",
            StrategyKind::DirectFetch => "direct_fetch",
            StrategyKind::HeadlessFetch => "headless_fetch",
            StrategyKind::SecondarySource => "secondary_source",
            StrategyKind::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
