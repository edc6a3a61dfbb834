//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls. Clones share state.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CandidateListing, EnrichedListing, Fingerprint, PriceObservation, SearchSpec, StrategyKind,
    Tier,
};
use crate::scheduler::{SchedulerEvent, SchedulerReporter};
use crate::traits::{Fetcher, ListingStore, SearchSource, SourceStrategy};

/// Candidate from the mock source, captured now.
pub fn candidate(title: &str, price: &str) -> CandidateListing {
    CandidateListing::new(title, price, "mock", Utc::now())
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.urls.lock().unwrap().push(url.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockStrategy
// ---------------------------------------------------------------------------

/// Shared in-flight counter for asserting concurrency caps.
#[derive(Clone, Default)]
pub struct ConcurrencyTracker {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl ConcurrencyTracker {
    fn enter(&self) -> TrackerGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        TrackerGuard(self.current.clone())
    }

    pub fn max_observed(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

struct TrackerGuard(Arc<AtomicUsize>);

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock strategy with a scripted outcome queue.
///
/// Each attempt pops the next outcome; an empty queue means "no match".
#[derive(Clone)]
pub struct MockStrategy {
    id: String,
    kind: StrategyKind,
    outcomes: Arc<Mutex<Vec<Result<Vec<CandidateListing>, AppError>>>>,
    delay: Option<Duration>,
    probe: Option<bool>,
    calls: Arc<AtomicUsize>,
    tracker: Option<ConcurrencyTracker>,
}

impl MockStrategy {
    pub fn new(id: &str, kind: StrategyKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            outcomes: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            probe: None,
            calls: Arc::new(AtomicUsize::new(0)),
            tracker: None,
        }
    }

    pub fn concurrency_tracker() -> ConcurrencyTracker {
        ConcurrencyTracker::default()
    }

    /// Queue a successful outcome.
    pub fn with_results(self, listings: Vec<CandidateListing>) -> Self {
        self.outcomes.lock().unwrap().push(Ok(listings));
        self
    }

    /// Queue a failed outcome.
    pub fn with_error(self, error: AppError) -> Self {
        self.outcomes.lock().unwrap().push(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_probe(mut self, healthy: bool) -> Self {
        self.probe = Some(healthy);
        self
    }

    pub fn with_tracker(mut self, tracker: ConcurrencyTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceStrategy for MockStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn attempt(&self, _search: &SearchSpec) -> Result<Vec<CandidateListing>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.tracker.as_ref().map(ConcurrencyTracker::enter);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            Ok(Vec::new())
        } else {
            outcomes.remove(0)
        }
    }

    async fn probe(&self) -> Option<bool> {
        self.probe
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Mock listing store that records saves and price observations.
#[derive(Clone, Default)]
pub struct MockStore {
    pub saved: Arc<Mutex<Vec<EnrichedListing>>>,
    save_calls: Arc<AtomicUsize>,
    save_errors: Arc<Mutex<Vec<AppError>>>,
    history: Arc<Mutex<Vec<PriceObservation>>>,
    fail_history: Arc<AtomicBool>,
    fingerprints: Arc<Mutex<HashMap<Uuid, Vec<Fingerprint>>>>,
    save_delay: Option<Duration>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every save sleeps this long before writing, like a slow database.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    /// The next save fails with `error` and writes nothing.
    pub fn fail_next_save(&self, error: AppError) {
        self.save_errors.lock().unwrap().push(error);
    }

    pub fn fail_price_history(&self) {
        self.fail_history.store(true, Ordering::SeqCst);
    }

    pub fn seed_fingerprints(&self, search_id: Uuid, fingerprints: Vec<Fingerprint>) {
        self.fingerprints
            .lock()
            .unwrap()
            .insert(search_id, fingerprints);
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn price_history(&self) -> Vec<PriceObservation> {
        self.history.lock().unwrap().clone()
    }
}

impl ListingStore for MockStore {
    async fn save_enriched_listings(
        &self,
        _search_id: Uuid,
        listings: &[EnrichedListing],
    ) -> Result<usize, AppError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        let mut errors = self.save_errors.lock().unwrap();
        if !errors.is_empty() {
            return Err(errors.remove(0));
        }
        self.saved.lock().unwrap().extend_from_slice(listings);
        Ok(listings.len())
    }

    async fn record_price_history(&self, observation: &PriceObservation) -> Result<(), AppError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError("price_history unavailable".into()));
        }
        self.history.lock().unwrap().push(observation.clone());
        Ok(())
    }

    async fn seen_fingerprints(
        &self,
        search_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Fingerprint>, AppError> {
        let map = self.fingerprints.lock().unwrap();
        Ok(map
            .get(&search_id)
            .map(|fps| fps.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockSearchSource
// ---------------------------------------------------------------------------

/// Mock search source keyed by tier.
#[derive(Clone, Default)]
pub struct MockSearchSource {
    searches: Arc<Mutex<HashMap<Tier, Vec<SearchSpec>>>>,
    failing: Arc<Mutex<HashSet<Tier>>>,
    calls: Arc<Mutex<Vec<Tier>>>,
}

impl MockSearchSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_searches(self, tier: Tier, searches: Vec<SearchSpec>) -> Self {
        self.searches.lock().unwrap().insert(tier, searches);
        self
    }

    pub fn failing_for(self, tier: Tier) -> Self {
        self.failing.lock().unwrap().insert(tier);
        self
    }

    /// Tiers listed so far, in call order.
    pub fn calls(&self) -> Vec<Tier> {
        self.calls.lock().unwrap().clone()
    }
}

impl SearchSource for MockSearchSource {
    async fn list_active_searches(&self, tier: Tier) -> Result<Vec<SearchSpec>, AppError> {
        self.calls.lock().unwrap().push(tier);
        if self.failing.lock().unwrap().contains(&tier) {
            return Err(AppError::DatabaseError("connection refused".into()));
        }
        Ok(self
            .searches
            .lock()
            .unwrap()
            .get(&tier)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Records scheduler events as their debug representation.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.events().iter().any(|e| e.contains(needle))
    }
}

impl SchedulerReporter for MockReporter {
    fn report(&self, event: SchedulerEvent<'_>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}
