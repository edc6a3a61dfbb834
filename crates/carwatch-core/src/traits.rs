use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CandidateListing, EnrichedListing, Fingerprint, PriceObservation, SearchSpec, StrategyKind,
    Tier,
};

/// Fetches raw page content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Turns one source's raw response into candidate listings.
///
/// CPU-only; never blocks.
pub trait ListingExtractor: Send + Sync + Clone {
    /// Block signature found in the response, if the request never reached
    /// real content (login wall, checkpoint, captcha).
    fn blocked_signature(&self, raw: &str) -> Option<&'static str>;

    fn is_blocked(&self, raw: &str) -> bool {
        self.blocked_signature(raw).is_some()
    }

    /// Extract and relevance-filter candidates. Missing numeric fields stay `None`.
    fn extract(&self, raw: &str) -> Vec<CandidateListing>;
}

/// One acquisition channel behind a uniform `attempt` interface.
///
/// An empty `Ok` means "no match". Any `Err` counts as a failure against
/// the worker wrapping this strategy.
pub trait SourceStrategy: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    fn attempt(
        &self,
        search: &SearchSpec,
    ) -> impl Future<Output = Result<Vec<CandidateListing>, AppError>> + Send;

    /// Liveness probe. `None` means this channel has nothing to probe.
    fn probe(&self) -> impl Future<Output = Option<bool>> + Send {
        async { None }
    }
}

/// Read side of the external search CRUD boundary.
pub trait SearchSource: Send + Sync + Clone {
    /// Active searches owned by accounts on `tier` or an equivalent plan.
    fn list_active_searches(
        &self,
        tier: Tier,
    ) -> impl Future<Output = Result<Vec<SearchSpec>, AppError>> + Send;
}

/// Persistence sink for enriched listings.
pub trait ListingStore: Send + Sync + Clone + 'static {
    /// Save a batch atomically. Returns the number of rows written.
    fn save_enriched_listings(
        &self,
        search_id: Uuid,
        listings: &[EnrichedListing],
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Fire-and-forget analytics; callers log and swallow failures.
    fn record_price_history(
        &self,
        observation: &PriceObservation,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Fingerprints already persisted for a search, newest first.
    fn seen_fingerprints(
        &self,
        search_id: Uuid,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Fingerprint>, AppError>> + Send;
}

/// A no-op ListingStore for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullStore;

impl ListingStore for NullStore {
    async fn save_enriched_listings(
        &self,
        _search_id: Uuid,
        listings: &[EnrichedListing],
    ) -> Result<usize, AppError> {
        Ok(listings.len())
    }

    async fn record_price_history(&self, _observation: &PriceObservation) -> Result<(), AppError> {
        Ok(())
    }

    async fn seen_fingerprints(
        &self,
        _search_id: Uuid,
        _limit: usize,
    ) -> Result<Vec<Fingerprint>, AppError> {
        Ok(vec![])
    }
}
