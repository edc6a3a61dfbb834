pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod heuristics;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod pacing;
pub mod scheduler;
pub mod traits;
pub mod valuation;
pub mod worker_health;

#[cfg(test)]
mod testutil;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{MonitorConfig, RemoteWorkerConfig};
pub use dedup::{DedupConfig, Deduplicator};
pub use error::AppError;
pub use models::{
    CandidateListing, EnrichedListing, Fingerprint, Location, PriceObservation, SearchSpec,
    StrategyKind, Tier, compute_hash,
};
pub use monitor::MonitorService;
pub use orchestrator::{FetchOrchestrator, OrchestratorConfig};
pub use pacing::{PacingPolicy, ThrottledFetcher};
pub use scheduler::{SchedulerConfig, TieredScheduler, TracingSchedulerReporter};
pub use traits::{Fetcher, ListingExtractor, ListingStore, NullStore, SearchSource, SourceStrategy};
pub use valuation::{Condition, DealScore, ValuationEngine, ValueEstimate};
pub use worker_health::SourceWorkerState;
