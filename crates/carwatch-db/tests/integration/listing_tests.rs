use carwatch_core::models::{CandidateListing, EnrichedListing, PriceObservation, QualityIndicator};
use carwatch_core::traits::ListingStore;
use carwatch_core::valuation::{Condition, ValuationEngine};
use carwatch_db::ListingRepository;
use chrono::Utc;
use uuid::Uuid;

use crate::integration::common::{NewSearch, insert_account, insert_search, setup_test_db};

fn enriched(search_id: Uuid, title: &str, price: u32) -> EnrichedListing {
    let engine = ValuationEngine::new(2024);
    let estimate = engine.estimate_value("Honda", "Civic", 2021, Some(30_000), Condition::Good);
    let deal = engine.score_deal(price, &estimate);
    let listing = CandidateListing::new(title, format!("${price}"), "test", Utc::now())
        .with_year("2021")
        .with_mileage("30,000 miles")
        .with_url("https://example.com/item/1");

    EnrichedListing {
        id: Uuid::new_v4(),
        search_id,
        fingerprint: listing.fingerprint(),
        listing,
        price: Some(price),
        year: Some(2021),
        mileage: Some(30_000),
        make: Some("Honda".into()),
        model: Some("Civic".into()),
        condition: Condition::Good,
        estimate: Some(estimate),
        deal: Some(deal),
        quality_indicators: vec![QualityIndicator::LowMileage],
        enriched_at: Utc::now(),
    }
}

async fn search_fixture(pool: &sqlx::PgPool) -> Uuid {
    let account = insert_account(pool, "owner@example.com", "pro").await;
    insert_search(pool, account, NewSearch::default()).await
}

#[tokio::test]
async fn saves_batch_and_reads_fingerprints_newest_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool.clone());
    let search_id = search_fixture(&pool).await;

    let first = enriched(search_id, "2021 Honda Civic LX", 19_500);
    repo.save_enriched_listings(search_id, std::slice::from_ref(&first))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let mut second = enriched(search_id, "2021 Honda Civic Sport", 21_000);
    second.enriched_at = Utc::now();
    let saved = repo
        .save_enriched_listings(search_id, std::slice::from_ref(&second))
        .await
        .unwrap();
    assert_eq!(saved, 1);

    let fingerprints = repo.seen_fingerprints(search_id, 10).await.unwrap();
    assert_eq!(fingerprints, vec![second.fingerprint.clone(), first.fingerprint.clone()]);

    let limited = repo.seen_fingerprints(search_id, 1).await.unwrap();
    assert_eq!(limited, vec![second.fingerprint]);

    let (rating, score): (Option<String>, Option<i16>) = sqlx::query_as(
        "SELECT deal_rating, deal_score FROM car_listings WHERE id = $1",
    )
    .bind(first.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(rating.as_deref(), first.deal.as_ref().map(|d| d.rating.label()));
    assert_eq!(score, first.deal.as_ref().map(|d| i16::from(d.score)));
}

#[tokio::test]
async fn duplicate_fingerprint_is_skipped_not_an_error() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool.clone());
    let search_id = search_fixture(&pool).await;

    let original = enriched(search_id, "2021 Honda Civic LX", 19_500);
    let reformatted = enriched(search_id, "2021 honda civic lx!", 19_500);
    assert_eq!(original.fingerprint, reformatted.fingerprint);

    repo.save_enriched_listings(search_id, &[original]).await.unwrap();
    let saved = repo
        .save_enriched_listings(search_id, &[reformatted])
        .await
        .unwrap();

    assert_eq!(saved, 0);
    assert_eq!(repo.count_for_search(search_id).await.unwrap(), 1);
}

#[tokio::test]
async fn failed_batch_writes_nothing() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool.clone());
    let search_id = search_fixture(&pool).await;

    let good = enriched(search_id, "2021 Honda Civic LX", 19_500);
    let mut bad = enriched(search_id, "2020 Honda Civic EX", 18_000);
    // Same primary key as the first row, so the second insert fails.
    bad.id = good.id;

    let err = repo
        .save_enriched_listings(search_id, &[good, bad])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Database error"));
    assert_eq!(repo.count_for_search(search_id).await.unwrap(), 0);
}

#[tokio::test]
async fn oversized_text_is_clipped_instead_of_failing_the_batch() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool.clone());
    let search_id = search_fixture(&pool).await;

    let good = enriched(search_id, "2021 Honda Civic LX", 19_500);
    let mut long = enriched(search_id, &"Honda Civic ".repeat(60), 18_000);
    long.listing.price = "$18,000 obo, cash only, text don't call, no lowballers, title in hand".into();
    long.listing.location = Some("Miami ".repeat(60));
    long.listing.attributes.color = Some("metallic ".repeat(10));

    let saved = repo
        .save_enriched_listings(search_id, &[good, long.clone()])
        .await
        .unwrap();
    assert_eq!(saved, 2);

    let (title, price_text, location, color, raw): (String, String, String, String, serde_json::Value) =
        sqlx::query_as(
            "SELECT title, price_text, location, color, listing FROM car_listings WHERE id = $1",
        )
        .bind(long.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title.chars().count(), 500);
    assert_eq!(price_text.chars().count(), 50);
    assert_eq!(location.chars().count(), 255);
    assert_eq!(color.chars().count(), 50);
    assert_eq!(raw["price"], long.listing.price.as_str());
}

#[tokio::test]
async fn stores_vehicle_attributes() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool.clone());
    let search_id = search_fixture(&pool).await;

    let mut listing = enriched(search_id, "2021 Honda Civic LX", 19_500);
    listing.listing.attributes.fuel_type = Some("gasoline".into());
    listing.listing.attributes.transmission = Some("automatic".into());
    listing.listing.attributes.body_style = Some("sedan".into());
    repo.save_enriched_listings(search_id, std::slice::from_ref(&listing))
        .await
        .unwrap();

    let row: (Option<String>, Option<String>, Option<String>, Option<String>) = sqlx::query_as(
        "SELECT fuel_type, transmission, body_style, color FROM car_listings WHERE id = $1",
    )
    .bind(listing.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(
        row,
        (
            Some("gasoline".to_string()),
            Some("automatic".to_string()),
            Some("sedan".to_string()),
            None
        )
    );
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool);

    let saved = repo.save_enriched_listings(Uuid::new_v4(), &[]).await.unwrap();
    assert_eq!(saved, 0);
}

#[tokio::test]
async fn records_price_history() {
    let (pool, _container) = setup_test_db().await;
    let repo = ListingRepository::new(pool.clone());

    let observation = PriceObservation {
        make: "Honda".into(),
        model: "Civic".into(),
        year: 2021,
        location: "Miami, FL".into(),
        price: 19_500,
        mileage: Some(30_000),
    };
    repo.record_price_history(&observation).await.unwrap();

    let row: (String, i32, i32, Option<i32>) =
        sqlx::query_as("SELECT model, year, price, mileage FROM price_history")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(row, ("Civic".to_string(), 2021, 19_500, Some(30_000)));
}
