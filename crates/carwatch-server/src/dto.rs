use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use carwatch_core::SourceWorkerState;
use carwatch_core::models::{EnrichedListing, StrategyKind, Tier};
use carwatch_core::valuation::{
    Condition, Confidence, DealRating, DealScore, Demand, DepreciationPace, ValueEstimate,
};

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MonitorRequest {
    /// Saved search to poll
    pub search_id: Uuid,
    /// Persist new listings and update dedup state (default: true).
    /// When false the search is previewed without side effects.
    pub save: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MonitorResponse {
    pub search_id: Uuid,
    #[schema(value_type = String)]
    pub tier: Tier,
    pub saved: bool,
    pub total: usize,
    pub listings: Vec<ListingResponse>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ListingResponse {
    pub id: Uuid,
    pub fingerprint: String,
    pub title: String,
    /// Price as the source displayed it
    pub price_text: String,
    pub price: Option<u32>,
    pub year: Option<i32>,
    pub mileage: Option<u32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub url: Option<String>,
    pub source: String,
    pub location: Option<String>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub body_style: Option<String>,
    pub color: Option<String>,
    #[schema(value_type = String)]
    pub condition: Condition,
    pub estimated_value: Option<u32>,
    pub deal: Option<DealResponse>,
    pub quality_indicators: Vec<String>,
    pub found_at: DateTime<Utc>,
}

impl From<EnrichedListing> for ListingResponse {
    fn from(l: EnrichedListing) -> Self {
        let attributes = l.listing.attributes;
        Self {
            id: l.id,
            fingerprint: l.fingerprint.to_string(),
            title: l.listing.title,
            price_text: l.listing.price,
            price: l.price,
            year: l.year,
            mileage: l.mileage,
            make: l.make,
            model: l.model,
            url: l.listing.url,
            source: l.listing.source,
            location: l.listing.location,
            fuel_type: attributes.fuel_type,
            transmission: attributes.transmission,
            body_style: attributes.body_style,
            color: attributes.color,
            condition: l.condition,
            estimated_value: l.estimate.map(|e| e.private_party),
            deal: l.deal.map(DealResponse::from),
            quality_indicators: l
                .quality_indicators
                .iter()
                .map(|q| q.label().to_string())
                .collect(),
            found_at: l.enriched_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ValuationRequest {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub mileage: Option<u32>,
    /// excellent, very_good, good, fair or poor (default: good)
    pub condition: Option<String>,
    /// Asking price to score against the estimate
    pub price: Option<u32>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ValuationResponse {
    pub trade_in: u32,
    pub private_party: u32,
    pub dealer_retail: u32,
    pub certified: u32,
    #[schema(value_type = String)]
    pub confidence: Confidence,
    pub base_price: u32,
    pub age_years: u32,
    pub mileage_adjustment: f64,
    #[schema(value_type = String)]
    pub condition: Condition,
    #[schema(value_type = String)]
    pub demand: Demand,
    #[schema(value_type = String)]
    pub depreciation: DepreciationPace,
    pub notes: Vec<String>,
    pub deal: Option<DealResponse>,
}

impl ValuationResponse {
    pub fn new(estimate: ValueEstimate, deal: Option<DealScore>) -> Self {
        Self {
            trade_in: estimate.trade_in,
            private_party: estimate.private_party,
            dealer_retail: estimate.dealer_retail,
            certified: estimate.certified,
            confidence: estimate.confidence,
            base_price: estimate.base_price,
            age_years: estimate.age_years,
            mileage_adjustment: estimate.mileage_adjustment,
            condition: estimate.condition,
            demand: estimate.insights.demand,
            depreciation: estimate.insights.depreciation,
            notes: estimate.insights.notes,
            deal: deal.map(DealResponse::from),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DealResponse {
    /// 0-100, higher is a better deal
    pub score: u8,
    #[schema(value_type = String)]
    pub rating: DealRating,
    pub label: &'static str,
    pub listing_price: u32,
    pub estimated_value: u32,
    pub price_difference: i64,
    pub price_difference_percent: f64,
    pub below_market: bool,
    pub savings_potential: u32,
    pub analysis: String,
}

impl From<DealScore> for DealResponse {
    fn from(d: DealScore) -> Self {
        Self {
            score: d.score,
            rating: d.rating,
            label: d.rating.label(),
            listing_price: d.listing_price,
            estimated_value: d.estimated_value,
            price_difference: d.price_difference,
            price_difference_percent: d.price_difference_percent,
            below_market: d.below_market,
            savings_potential: d.savings_potential,
            analysis: d.analysis,
        }
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct WorkersQuery {
    /// Probe remote workers before reporting (default: false)
    pub probe: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WorkerResponse {
    pub id: String,
    #[schema(value_type = String)]
    pub kind: StrategyKind,
    pub healthy: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_used: Option<DateTime<Utc>>,
}

impl From<SourceWorkerState> for WorkerResponse {
    fn from(w: SourceWorkerState) -> Self {
        Self {
            id: w.id,
            kind: w.kind,
            healthy: w.healthy,
            success_count: w.success_count,
            failure_count: w.failure_count,
            consecutive_failures: w.consecutive_failures,
            success_rate: w.success_rate,
            cooldown_until: w.cooldown_until,
            last_error: w.last_error,
            last_used: w.last_used,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WorkerListResponse {
    pub workers: Vec<WorkerResponse>,
    pub total: usize,
    pub healthy: usize,
    /// Remote workers probed for this response
    pub probed: usize,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub workers_healthy: usize,
    pub workers_total: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
