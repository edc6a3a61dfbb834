use carwatch_core::models::Tier;
use carwatch_core::traits::SearchSource;
use carwatch_db::SearchRepository;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::integration::common::{NewSearch, insert_account, insert_search, setup_test_db};

#[tokio::test]
async fn lists_active_searches_for_equivalent_plans_oldest_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = SearchRepository::new(pool.clone());

    let monthly = insert_account(&pool, "a@example.com", "premium").await;
    let annual = insert_account(&pool, "b@example.com", "Premium_Annual").await;
    let free = insert_account(&pool, "c@example.com", "free").await;

    let now = Utc::now();
    let newer = insert_search(&pool, monthly, NewSearch { created_at: now, ..NewSearch::default() }).await;
    let older = insert_search(
        &pool,
        annual,
        NewSearch {
            make: Some("Toyota"),
            model: Some("Camry"),
            created_at: now - Duration::hours(2),
            ..NewSearch::default()
        },
    )
    .await;
    insert_search(&pool, monthly, NewSearch { is_active: false, ..NewSearch::default() }).await;
    insert_search(&pool, free, NewSearch::default()).await;

    let searches = repo.list_active_searches(Tier::Premium).await.unwrap();

    let ids: Vec<Uuid> = searches.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![older, newer]);
    assert!(searches.iter().all(|s| s.tier == Tier::Premium));
    assert_eq!(searches[0].make.as_deref(), Some("Toyota"));
    assert_eq!(searches[1].price_max, Some(25_000));
    assert_eq!(searches[1].radius_miles, 25);
    assert_eq!(searches[1].location.text, "Miami, FL");
    assert!(searches[1].location.coordinates.is_none());
}

#[tokio::test]
async fn tier_without_accounts_is_empty() {
    let (pool, _container) = setup_test_db().await;
    let repo = SearchRepository::new(pool);

    let searches = repo.list_active_searches(Tier::Pro).await.unwrap();
    assert!(searches.is_empty());
}

#[tokio::test]
async fn get_resolves_tier_from_plan() {
    let (pool, _container) = setup_test_db().await;
    let repo = SearchRepository::new(pool.clone());

    let account = insert_account(&pool, "pro@example.com", "pro_annual").await;
    let id = insert_search(
        &pool,
        account,
        NewSearch {
            make: None,
            model: Some(" "),
            price_max: None,
            ..NewSearch::default()
        },
    )
    .await;

    let search = repo.get(id).await.unwrap().expect("search exists");
    assert_eq!(search.tier, Tier::Pro);
    assert!(search.make.is_none());
    assert!(search.model.is_none(), "blank model reads as unset");
    assert_eq!(search.query_text(), "car");

    assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
}
