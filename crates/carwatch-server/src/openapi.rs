use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Carwatch API",
        version = "0.3.0",
        description = "Operator surface for the vehicle listing monitor."
    ),
    paths(
        crate::routes::monitor,
        crate::routes::valuation,
        crate::routes::list_workers,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::MonitorRequest,
        crate::dto::MonitorResponse,
        crate::dto::ListingResponse,
        crate::dto::ValuationRequest,
        crate::dto::ValuationResponse,
        crate::dto::DealResponse,
        crate::dto::WorkerResponse,
        crate::dto::WorkerListResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "monitor", description = "On-demand search polling"),
        (name = "valuation", description = "Market value estimates and deal scores"),
        (name = "workers", description = "Acquisition worker health"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "Operator API key. Set via CARWATCH_SERVER_API_KEY environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
