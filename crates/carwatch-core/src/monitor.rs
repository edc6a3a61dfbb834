use std::collections::HashSet;
use std::sync::Arc;

use moka::sync::Cache;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::dedup::Deduplicator;
use crate::error::AppError;
use crate::heuristics::{
    find_mileage_text, infer_attributes, infer_condition, parse_mileage, parse_price, parse_year, quality_indicators,
};
use crate::models::{CandidateListing, EnrichedListing, Fingerprint, SearchSpec};
use crate::orchestrator::FetchOrchestrator;
use crate::traits::{ListingStore, SourceStrategy};
use crate::valuation::{ValuationEngine, identify_vehicle};

/// Fingerprints loaded per search when warming the deduplicator.
pub const DEFAULT_WARM_LIMIT: usize = 1_000;

/// Upper bound on retained per-search poll locks.
const MAX_SEARCH_LOCKS: u64 = 10_000;

/// Runs one search end to end: acquire → filter → dedup → enrich → save.
///
/// Constructed once by the process entry point and shared by the scheduler
/// and any on-demand trigger.
pub struct MonitorService<S, L, C = SystemClock>
where
    S: SourceStrategy,
    L: ListingStore,
    C: Clock,
{
    orchestrator: FetchOrchestrator<S, C>,
    dedup: Deduplicator,
    valuation: ValuationEngine,
    store: L,
    warm_dedup: bool,
    warm_limit: usize,
    /// One poll per search at a time, across the scheduler and on-demand callers.
    in_flight: Cache<Uuid, Arc<Mutex<()>>>,
}

impl<S, L, C> MonitorService<S, L, C>
where
    S: SourceStrategy,
    L: ListingStore,
    C: Clock,
{
    pub fn new(orchestrator: FetchOrchestrator<S, C>, store: L) -> Self {
        Self {
            orchestrator,
            dedup: Deduplicator::default(),
            valuation: ValuationEngine::current(),
            store,
            warm_dedup: true,
            warm_limit: DEFAULT_WARM_LIMIT,
            in_flight: Cache::new(MAX_SEARCH_LOCKS),
        }
    }

    pub fn with_dedup(mut self, dedup: Deduplicator) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_valuation(mut self, valuation: ValuationEngine) -> Self {
        self.valuation = valuation;
        self
    }

    /// Seed the deduplicator from persisted fingerprints on first poll.
    pub fn with_warm_dedup(mut self, enabled: bool) -> Self {
        self.warm_dedup = enabled;
        self
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator<S, C> {
        &self.orchestrator
    }

    pub fn valuation(&self) -> &ValuationEngine {
        &self.valuation
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Poll one search and persist the listings not surfaced before.
    ///
    /// 1. Warm dedup state for the search (first poll only)
    /// 2. Acquire candidates through the fallback chain
    /// 3. Drop candidates outside the search bounds
    /// 4. Drop fingerprints already seen, including repeats within the batch
    /// 5. Enrich with parsed numbers, value estimate and deal score
    /// 6. Save the batch, then mark each fingerprint seen
    /// 7. Report price observations (failures are logged and dropped)
    ///
    /// Only persistence errors surface; acquisition degrades to an empty batch.
    /// Concurrent polls of the same search run one after the other, so the
    /// second sees the fingerprints the first marked.
    pub async fn monitor_once(&self, search: &SearchSpec) -> Result<Vec<EnrichedListing>, AppError> {
        let lock = self
            .in_flight
            .get_with(search.id, || Arc::new(Mutex::new(())));
        let _guard = lock.lock().await;

        if self.warm_dedup && !self.dedup.is_warmed(search.id) {
            self.warm(search.id).await;
        }

        let candidates = self.orchestrator.acquire(search).await;
        let acquired = candidates.len();

        let mut batch_seen = HashSet::new();
        let enriched: Vec<EnrichedListing> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let fingerprint = candidate.fingerprint();
                if !self.dedup.is_new(search.id, &fingerprint) || !batch_seen.insert(fingerprint.clone())
                {
                    return None;
                }
                let listing = self.enrich(search, candidate, fingerprint);
                search
                    .admits(listing.price, listing.year, listing.mileage)
                    .then_some(listing)
            })
            .collect();

        tracing::info!(
            search_id = %search.id,
            acquired,
            new = enriched.len(),
            "Search polled"
        );

        if enriched.is_empty() {
            return Ok(enriched);
        }

        let saved = self
            .store
            .save_enriched_listings(search.id, &enriched)
            .await?;
        tracing::info!(search_id = %search.id, saved, "Saved enriched listings");

        for listing in &enriched {
            self.dedup.mark_seen(search.id, &listing.fingerprint);
        }

        let location = if search.location.is_empty() {
            "unknown"
        } else {
            search.location.text.as_str()
        };
        for observation in enriched.iter().filter_map(|l| l.price_observation(location)) {
            if let Err(e) = self.store.record_price_history(&observation).await {
                tracing::warn!(search_id = %search.id, error = %e, "Failed to record price history");
            }
        }

        Ok(enriched)
    }

    /// Acquire and enrich without touching dedup state or persistence.
    pub async fn preview(&self, search: &SearchSpec) -> Vec<EnrichedListing> {
        let mut batch_seen = HashSet::new();
        self.orchestrator
            .acquire(search)
            .await
            .into_iter()
            .filter_map(|candidate| {
                let fingerprint = candidate.fingerprint();
                if !batch_seen.insert(fingerprint.clone()) {
                    return None;
                }
                let listing = self.enrich(search, candidate, fingerprint);
                search
                    .admits(listing.price, listing.year, listing.mileage)
                    .then_some(listing)
            })
            .collect()
    }

    async fn warm(&self, search_id: Uuid) {
        match self.store.seen_fingerprints(search_id, self.warm_limit).await {
            Ok(fingerprints) => {
                let count = fingerprints.len();
                self.dedup.warm(search_id, fingerprints);
                tracing::debug!(%search_id, count, "Warmed dedup state");
            }
            Err(e) => {
                tracing::warn!(%search_id, error = %e, "Dedup warm-up failed, starting cold");
            }
        }
    }

    fn enrich(
        &self,
        search: &SearchSpec,
        mut candidate: CandidateListing,
        fingerprint: Fingerprint,
    ) -> EnrichedListing {
        let text = candidate.text();
        candidate.attributes.fill_missing(infer_attributes(&text));

        let price = parse_price(&candidate.price);
        let year = candidate
            .year
            .as_deref()
            .and_then(parse_year)
            .or_else(|| parse_year(&candidate.title));
        let mileage = candidate
            .mileage
            .as_deref()
            .and_then(parse_mileage)
            .or_else(|| find_mileage_text(&text).and_then(parse_mileage));

        let (found_make, found_model) = identify_vehicle(&candidate.title);
        let make = search.make.clone().or(found_make);
        let model = search.model.clone().or(found_model);

        let condition = infer_condition(&text).unwrap_or_default();

        let estimate = match (make.as_deref(), year) {
            (Some(make), Some(year)) => Some(self.valuation.estimate_value(
                make,
                model.as_deref().unwrap_or_default(),
                year,
                mileage,
                condition,
            )),
            _ => None,
        };
        let deal = estimate
            .as_ref()
            .zip(price)
            .map(|(estimate, price)| self.valuation.score_deal(price, estimate));

        let age = year.map(|y| self.valuation.age_of(y));
        let quality_indicators = quality_indicators(&text, mileage, age, deal.as_ref());

        EnrichedListing {
            id: Uuid::new_v4(),
            search_id: search.id,
            fingerprint,
            listing: candidate,
            price,
            year,
            mileage,
            make,
            model,
            condition,
            estimate,
            deal,
            quality_indicators,
            enriched_at: self.orchestrator.clock().now(),
        }
    }
}
