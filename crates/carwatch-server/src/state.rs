use std::sync::Arc;

use carwatch_client::Source;
use carwatch_core::MonitorService;
use carwatch_db::{Database, ListingRepository};

/// The monitor pipeline as the server runs it.
pub type Monitor = MonitorService<Source, ListingRepository>;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    /// Same instance the scheduler polls through, so worker health and dedup
    /// state are shared with on-demand triggers.
    pub monitor: Arc<Monitor>,
    /// Operator API key for the `/v1` routes.
    pub api_key: String,
}
