use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use crate::integration::common::{TEST_API_KEY, count, insert_search, setup_test_app};

async fn json_body(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn authed_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

// ---------------------------------------------------------------------------
// health & auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_with_worker_counts() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
    assert_eq!(json["workers_total"], 1);
    assert_eq!(json["workers_healthy"], 1);
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/v1/workers").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(
            Request::get("/v1/workers")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = json_body(response).await;
    assert_eq!(json["error"], "unauthorized");
}

// ---------------------------------------------------------------------------
// workers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn workers_lists_configured_sources() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(
            Request::get("/v1/workers?probe=true")
                .header("authorization", format!("Bearer {TEST_API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["healthy"], 1);
    assert_eq!(json["probed"], 0, "synthetic source has no health probe");
    assert_eq!(json["workers"][0]["id"], "synthetic");
    assert_eq!(json["workers"][0]["kind"], "synthetic");
}

// ---------------------------------------------------------------------------
// monitor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitor_saves_listings_and_price_history() {
    let app = setup_test_app().await;
    let search_id = insert_search(&app.pool, "premium").await;

    let response = app
        .router
        .clone()
        .oneshot(authed_post(
            "/v1/monitor",
            serde_json::json!({ "search_id": search_id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["saved"], true);
    assert_eq!(json["tier"], "premium");
    assert_eq!(json["total"], 5);

    let first = &json["listings"][0];
    assert_eq!(first["make"], "Honda");
    assert_eq!(first["model"], "Civic");
    assert_eq!(first["source"], "synthetic");
    assert!(first["deal"]["score"].is_u64());

    assert_eq!(count(&app.pool, "SELECT COUNT(*) FROM car_listings").await, 5);
    assert_eq!(count(&app.pool, "SELECT COUNT(*) FROM price_history").await, 5);
}

#[tokio::test]
async fn monitor_preview_does_not_persist() {
    let app = setup_test_app().await;
    let search_id = insert_search(&app.pool, "free").await;

    let response = app
        .router
        .oneshot(authed_post(
            "/v1/monitor",
            serde_json::json!({ "search_id": search_id, "save": false }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["saved"], false);
    assert_eq!(json["tier"], "free");
    assert_eq!(json["total"], 5);

    assert_eq!(count(&app.pool, "SELECT COUNT(*) FROM car_listings").await, 0);
    assert_eq!(count(&app.pool, "SELECT COUNT(*) FROM price_history").await, 0);
}

#[tokio::test]
async fn monitor_unknown_search_returns_404() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(authed_post(
            "/v1/monitor",
            serde_json::json!({ "search_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = json_body(response).await;
    assert_eq!(json["error"], "not_found");
}

// ---------------------------------------------------------------------------
// valuation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valuation_returns_estimate_and_deal() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(authed_post(
            "/v1/valuation",
            serde_json::json!({
                "make": "Toyota",
                "model": "Camry",
                "year": 2020,
                "mileage": 45000,
                "condition": "very good",
                "price": 15000
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["condition"], "very_good");
    let trade_in = json["trade_in"].as_u64().unwrap();
    let private_party = json["private_party"].as_u64().unwrap();
    let dealer_retail = json["dealer_retail"].as_u64().unwrap();
    assert!(trade_in < private_party && private_party < dealer_retail);

    let deal = &json["deal"];
    assert_eq!(deal["listing_price"], 15000);
    assert_eq!(deal["estimated_value"], private_party);
    assert!(deal["analysis"].as_str().is_some_and(|a| !a.is_empty()));
}

#[tokio::test]
async fn valuation_without_price_has_no_deal() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(authed_post(
            "/v1/valuation",
            serde_json::json!({ "make": "Honda", "model": "Civic", "year": 2019 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["condition"], "good");
    assert!(json["deal"].is_null());
}

#[tokio::test]
async fn valuation_rejects_unknown_condition() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(authed_post(
            "/v1/valuation",
            serde_json::json!({
                "make": "Honda",
                "model": "Civic",
                "year": 2019,
                "condition": "pristine"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["error"], "validation_error");
}
