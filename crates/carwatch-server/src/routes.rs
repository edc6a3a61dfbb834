use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use carwatch_core::AppError;
use carwatch_core::valuation::Condition;

use crate::auth::require_api_key;
use crate::dto::{
    ErrorResponse, HealthResponse, ListingResponse, MonitorRequest, MonitorResponse,
    ValuationRequest, ValuationResponse, WorkerListResponse, WorkerResponse, WorkersQuery,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/workers", get(list_workers))
        .route("/v1/monitor", post(monitor))
        .route("/v1/valuation", post(valuation))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/monitor",
    request_body = MonitorRequest,
    responses(
        (status = 200, description = "Listings produced by this poll", body = MonitorResponse),
        (status = 404, description = "Search not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "monitor"
)]
pub async fn monitor(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<MonitorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(search) = state.db.search_repo().get(body.search_id).await? else {
        let error = ErrorResponse {
            error: "not_found".to_string(),
            message: format!("Search not found: {}", body.search_id),
        };
        return Ok((StatusCode::NOT_FOUND, axum::Json(error)).into_response());
    };

    let save = body.save.unwrap_or(true);
    tracing::info!(search_id = %search.id, tier = %search.tier, save, "On-demand poll");

    let listings = if save {
        state.monitor.monitor_once(&search).await?
    } else {
        state.monitor.preview(&search).await
    };

    let response = MonitorResponse {
        search_id: search.id,
        tier: search.tier,
        saved: save,
        total: listings.len(),
        listings: listings.into_iter().map(ListingResponse::from).collect(),
    };

    Ok(axum::Json(response).into_response())
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/valuation",
    request_body = ValuationRequest,
    responses(
        (status = 200, description = "Value estimate and optional deal score", body = ValuationResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "valuation"
)]
pub async fn valuation(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<ValuationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let condition = body
        .condition
        .as_deref()
        .map(|c| c.parse::<Condition>().map_err(AppError::Generic))
        .transpose()?
        .unwrap_or_default();

    let engine = state.monitor.valuation();
    if body.year < 1900 || body.year > engine.reference_year() + 1 {
        return Err(AppError::Generic(format!("Implausible model year: {}", body.year)).into());
    }

    let estimate = engine.estimate_value(&body.make, &body.model, body.year, body.mileage, condition);
    let deal = body.price.map(|price| engine.score_deal(price, &estimate));

    Ok(axum::Json(ValuationResponse::new(estimate, deal)))
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/workers",
    params(WorkersQuery),
    responses(
        (status = 200, description = "Source worker health", body = WorkerListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "workers"
)]
pub async fn list_workers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WorkersQuery>,
) -> impl IntoResponse {
    let orchestrator = state.monitor.orchestrator();
    let probed = if query.probe.unwrap_or(false) {
        orchestrator.probe_health().await
    } else {
        0
    };

    let workers: Vec<WorkerResponse> = orchestrator
        .worker_states()
        .into_iter()
        .map(WorkerResponse::from)
        .collect();

    let response = WorkerListResponse {
        total: workers.len(),
        healthy: workers.iter().filter(|w| w.healthy).count(),
        probed,
        workers,
    };

    axum::Json(response)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match state.db.health_check().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };

    let workers = state.monitor.orchestrator().worker_states();
    let workers_healthy = workers.iter().filter(|w| w.healthy).count();

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if db_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        },
        database: db_status,
        workers_healthy,
        workers_total: workers.len(),
    };

    (status, axum::Json(response))
}
