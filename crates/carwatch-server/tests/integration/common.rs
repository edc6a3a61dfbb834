use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use uuid::Uuid;

use carwatch_client::Source;
use carwatch_client::strategy::SyntheticStrategy;
use carwatch_core::{FetchOrchestrator, MonitorService, OrchestratorConfig, PacingPolicy};
use carwatch_db::Database;
use carwatch_server::routes;
use carwatch_server::state::AppState;

pub const TEST_API_KEY: &str = "test-secret-key";

pub struct TestApp {
    pub router: Router,
    pub pool: PgPool,
    _container: ContainerAsync<GenericImage>,
}

/// Spin up PostgreSQL, migrate it and build the router over a synthetic-only
/// monitor so no request leaves the process.
pub async fn setup_test_app() -> TestApp {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "carwatch_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/carwatch_test");
    let pool = retry_connect(&url).await;

    let db = Database::from_pool(pool.clone());
    db.migrate().await.expect("Failed to run migrations");

    let orchestrator = FetchOrchestrator::new(
        vec![Source::Synthetic(SyntheticStrategy::default())],
        OrchestratorConfig {
            step_pacing: PacingPolicy::none(),
            ..OrchestratorConfig::default()
        },
    );
    let monitor = Arc::new(MonitorService::new(orchestrator, db.listing_repo()));

    let state = Arc::new(AppState {
        db,
        monitor,
        api_key: TEST_API_KEY.to_string(),
    });

    TestApp {
        router: routes::router(state),
        pool,
        _container: container,
    }
}

async fn retry_connect(url: &str) -> PgPool {
    for _ in 0..30 {
        if let Ok(pool) = PgPoolOptions::new().max_connections(5).connect(url).await {
            return pool;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to test database");
}

/// Insert an account on `plan` owning one active Honda Civic search.
pub async fn insert_search(pool: &PgPool, plan: &str) -> Uuid {
    let (account_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO accounts (email, subscription_plan) VALUES ($1, $2) RETURNING id",
    )
    .bind(format!("{}@example.com", Uuid::new_v4()))
    .bind(plan)
    .fetch_one(pool)
    .await
    .expect("insert account");

    let (search_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO car_searches (account_id, make, model, year_min, price_max, location)
        VALUES ($1, 'Honda', 'Civic', 2015, 25000, 'Miami, FL')
        RETURNING id
        "#,
    )
    .bind(account_id)
    .fetch_one(pool)
    .await
    .expect("insert search");

    search_id
}

pub async fn count(pool: &PgPool, sql: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(sql)
        .fetch_one(pool)
        .await
        .expect("count query");
    n
}
