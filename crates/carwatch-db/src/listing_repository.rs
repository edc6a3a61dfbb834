use carwatch_core::error::AppError;
use carwatch_core::models::{EnrichedListing, Fingerprint, PriceObservation};
use carwatch_core::traits::ListingStore;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

/// Listing persistence and the price-history analytics sink.
#[derive(Clone)]
pub struct ListingRepository {
    pool: PgPool,
}

// Column widths from the migrations. Source text is clipped to fit so one
// long field cannot fail the whole batch; the full text stays in `listing`.
const TITLE_CHARS: usize = 500;
const PRICE_TEXT_CHARS: usize = 50;
const NAME_CHARS: usize = 100;
const LOCATION_CHARS: usize = 255;
const ATTRIBUTE_CHARS: usize = 50;

fn to_i32(value: Option<u32>) -> Option<i32> {
    value.and_then(|v| i32::try_from(v).ok())
}

/// Longest prefix of at most `max` characters.
fn clip(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

fn clip_opt(value: Option<&str>, max: usize) -> Option<&str> {
    value.map(|v| clip(v, max))
}

impl ListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a batch in one transaction.
    ///
    /// A row whose `(search_id, fingerprint)` already exists is skipped, not
    /// an error. Returns the number of rows actually inserted.
    pub async fn save_batch(
        &self,
        search_id: Uuid,
        listings: &[EnrichedListing],
    ) -> Result<usize, AppError> {
        if listings.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut inserted = 0u64;

        for listing in listings {
            let estimate = listing
                .estimate
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?;
            let indicators = serde_json::to_value(&listing.quality_indicators)?;
            let raw = serde_json::to_value(&listing.listing)?;
            let attributes = &listing.listing.attributes;

            let result = sqlx::query(
                r#"
                INSERT INTO car_listings (
                    id, search_id, fingerprint, title, price_text, price, year, mileage,
                    make, model, url, source, location, condition, estimate,
                    deal_score, deal_rating, quality_indicators, listing, captured_at, found_at,
                    fuel_type, transmission, body_style, color
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                        $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
                ON CONFLICT (search_id, fingerprint) DO NOTHING
                "#,
            )
            .bind(listing.id)
            .bind(search_id)
            .bind(listing.fingerprint.as_str())
            .bind(clip(&listing.listing.title, TITLE_CHARS))
            .bind(clip(&listing.listing.price, PRICE_TEXT_CHARS))
            .bind(to_i32(listing.price))
            .bind(listing.year)
            .bind(to_i32(listing.mileage))
            .bind(clip_opt(listing.make.as_deref(), NAME_CHARS))
            .bind(clip_opt(listing.model.as_deref(), NAME_CHARS))
            .bind(listing.listing.url.as_deref())
            .bind(clip(&listing.listing.source, NAME_CHARS))
            .bind(clip_opt(listing.listing.location.as_deref(), LOCATION_CHARS))
            .bind(listing.condition.as_str())
            .bind(estimate)
            .bind(listing.deal.as_ref().map(|d| i16::from(d.score)))
            .bind(listing.deal.as_ref().map(|d| d.rating.label()))
            .bind(indicators)
            .bind(raw)
            .bind(listing.listing.captured_at)
            .bind(listing.enriched_at)
            .bind(clip_opt(attributes.fuel_type.as_deref(), ATTRIBUTE_CHARS))
            .bind(clip_opt(attributes.transmission.as_deref(), ATTRIBUTE_CHARS))
            .bind(clip_opt(attributes.body_style.as_deref(), ATTRIBUTE_CHARS))
            .bind(clip_opt(attributes.color.as_deref(), ATTRIBUTE_CHARS))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(db_error)?;

        tracing::debug!(
            search_id = %search_id,
            batch = listings.len(),
            inserted,
            "Saved listing batch"
        );
        Ok(inserted as usize)
    }

    pub async fn record_observation(&self, observation: &PriceObservation) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO price_history (make, model, year, location, price, mileage)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(clip(&observation.make, NAME_CHARS))
        .bind(clip(&observation.model, NAME_CHARS))
        .bind(observation.year)
        .bind(clip(&observation.location, LOCATION_CHARS))
        .bind(to_i32(Some(observation.price)))
        .bind(to_i32(observation.mileage))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    /// Fingerprints stored for a search, newest first.
    pub async fn fingerprints(&self, search_id: Uuid, limit: usize) -> Result<Vec<Fingerprint>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT fingerprint
            FROM car_listings
            WHERE search_id = $1
            ORDER BY found_at DESC
            LIMIT $2
            "#,
        )
        .bind(search_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(|(fp,)| Fingerprint::from(fp)).collect())
    }

    pub async fn count_for_search(&self, search_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM car_listings WHERE search_id = $1")
            .bind(search_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count)
    }
}

// -- Trait implementation --

impl ListingStore for ListingRepository {
    async fn save_enriched_listings(
        &self,
        search_id: Uuid,
        listings: &[EnrichedListing],
    ) -> Result<usize, AppError> {
        self.save_batch(search_id, listings).await
    }

    async fn record_price_history(&self, observation: &PriceObservation) -> Result<(), AppError> {
        self.record_observation(observation).await
    }

    async fn seen_fingerprints(
        &self,
        search_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Fingerprint>, AppError> {
        self.fingerprints(search_id, limit).await
    }
}
