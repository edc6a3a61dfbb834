use carwatch_core::error::AppError;
use carwatch_core::models::{Coordinates, Location, SearchSpec, Tier};
use carwatch_core::traits::SearchSource;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

/// Read-only view of saved searches. Search CRUD lives elsewhere.
#[derive(Clone)]
pub struct SearchRepository {
    pool: PgPool,
}

impl SearchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Active searches owned by accounts whose plan maps onto `tier`,
    /// oldest first.
    pub async fn list_active(&self, tier: Tier) -> Result<Vec<SearchSpec>, AppError> {
        let plans: Vec<String> = tier.plan_names().iter().map(|p| p.to_string()).collect();

        let rows = sqlx::query_as::<_, SearchRow>(
            r#"
            SELECT s.id, s.account_id, s.make, s.model, s.year_min, s.year_max,
                   s.price_min, s.price_max, s.mileage_max, s.location,
                   s.latitude, s.longitude, s.distance_miles, s.created_at
            FROM car_searches s
            JOIN accounts a ON a.id = s.account_id
            WHERE s.is_active AND lower(a.subscription_plan) = ANY($1)
            ORDER BY s.created_at, s.id
            "#,
        )
        .bind(&plans)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(|row| row.into_spec(tier)).collect())
    }

    /// One search regardless of its active flag, with the tier of its
    /// owner's plan (unknown plans count as free).
    pub async fn get(&self, id: Uuid) -> Result<Option<SearchSpec>, AppError> {
        let row = sqlx::query_as::<_, PlannedSearchRow>(
            r#"
            SELECT s.id, s.account_id, s.make, s.model, s.year_min, s.year_max,
                   s.price_min, s.price_max, s.mileage_max, s.location,
                   s.latitude, s.longitude, s.distance_miles, s.created_at,
                   a.subscription_plan
            FROM car_searches s
            JOIN accounts a ON a.id = s.account_id
            WHERE s.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(|row| {
            let tier = Tier::from_plan(&row.subscription_plan).unwrap_or(Tier::Free);
            row.search.into_spec(tier)
        }))
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct SearchRow {
    id: Uuid,
    account_id: Uuid,
    make: Option<String>,
    model: Option<String>,
    year_min: Option<i32>,
    year_max: Option<i32>,
    price_min: Option<i32>,
    price_max: Option<i32>,
    mileage_max: Option<i32>,
    location: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    distance_miles: i32,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PlannedSearchRow {
    #[sqlx(flatten)]
    search: SearchRow,
    subscription_plan: String,
}

fn non_negative(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl SearchRow {
    fn into_spec(self, tier: Tier) -> SearchSpec {
        let coordinates = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        };
        SearchSpec {
            id: self.id,
            account_id: self.account_id,
            make: non_blank(self.make),
            model: non_blank(self.model),
            year_min: self.year_min,
            year_max: self.year_max,
            price_min: non_negative(self.price_min),
            price_max: non_negative(self.price_max),
            mileage_max: non_negative(self.mileage_max),
            location: Location {
                text: self.location,
                coordinates,
            },
            radius_miles: u32::try_from(self.distance_miles).unwrap_or(0),
            tier,
            created_at: self.created_at,
        }
    }
}

// -- Trait implementation --

impl SearchSource for SearchRepository {
    async fn list_active_searches(&self, tier: Tier) -> Result<Vec<SearchSpec>, AppError> {
        self.list_active(tier).await
    }
}
