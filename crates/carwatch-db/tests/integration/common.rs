use carwatch_db::Database;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use uuid::Uuid;

/// Spins up a PostgreSQL container, applies migrations and returns a pool.
///
/// Keep the container in scope for the whole test; dropping it stops
/// PostgreSQL.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
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

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/carwatch_test");

    // The server restarts once after init; retry until it accepts connections.
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    Database::from_pool(pool.clone())
        .migrate()
        .await
        .expect("Failed to run migrations");

    (pool, container)
}

pub async fn insert_account(pool: &PgPool, email: &str, plan: &str) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO accounts (email, subscription_plan) VALUES ($1, $2) RETURNING id",
    )
    .bind(email)
    .bind(plan)
    .fetch_one(pool)
    .await
    .expect("insert account");
    id
}

pub struct NewSearch<'a> {
    pub make: Option<&'a str>,
    pub model: Option<&'a str>,
    pub price_max: Option<i32>,
    pub location: &'a str,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Default for NewSearch<'_> {
    fn default() -> Self {
        Self {
            make: Some("Honda"),
            model: Some("Civic"),
            price_max: Some(25_000),
            location: "Miami, FL",
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

pub async fn insert_search(pool: &PgPool, account_id: Uuid, search: NewSearch<'_>) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO car_searches (account_id, make, model, price_max, location, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(account_id)
    .bind(search.make)
    .bind(search.model)
    .bind(search.price_max)
    .bind(search.location)
    .bind(search.is_active)
    .bind(search.created_at)
    .fetch_one(pool)
    .await
    .expect("insert search");
    id
}
