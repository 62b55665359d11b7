//! Order placement, listing and status changes over HTTP.

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use appejv_api::config::RuntimeSettings;
use appejv_api::services::orders::{FailurePolicy, PlacementPolicy};
use appejv_api::store::{Collection, FailOn};
use appejv_integration_tests::{ADMIN_TOKEN, CUSTOMER_TOKEN, SALE_TOKEN, TestApp};

fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_place_order_decrements_stock_and_records_prices() {
    let app = TestApp::new();
    let customer = app.add_customer("KH-01", "Trang trai Minh Phat");
    let product = app.add_product("NPK-16", "10", 5);

    let response = app
        .post(
            "/api/v1/orders",
            Some(SALE_TOKEN),
            json!({"customer_id": customer, "items": [{"product_id": product, "quantity": 2}]}),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let order = &response.body["data"];
    assert_eq!(order["status"], "pending");
    assert_eq!(order["sale_id"], "u-sale");
    assert_eq!(order["customer_id"], customer);
    assert_eq!(decimal(&order["total_amount"]), Decimal::from(20));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    assert_eq!(decimal(&order["items"][0]["price_at_order"]), Decimal::from(10));
    assert_eq!(app.stock(product), 3);

    // Later price changes leave the recorded line alone
    let update = app
        .put(
            &format!("/api/v1/products/{product}"),
            Some(ADMIN_TOKEN),
            json!({"price": "15"}),
        )
        .await;
    assert_eq!(update.status, StatusCode::OK);

    let id = order["id"].as_i64().unwrap();
    let fetched = app.get(&format!("/api/v1/orders/{id}"), Some(SALE_TOKEN)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(decimal(&fetched.body["data"]["items"][0]["price_at_order"]), Decimal::from(10));
    assert_eq!(fetched.body["data"]["items"][0]["quantity"], 2);
}

#[tokio::test]
async fn test_insufficient_stock_writes_nothing() {
    let app = TestApp::new();
    let customer = app.add_customer("KH-01", "Dai ly Hoang Long");
    let a = app.add_product("NPK-16", "10", 10);
    let b = app.add_product("URE-46", "20", 0);

    let response = app
        .post(
            "/api/v1/orders",
            Some(SALE_TOKEN),
            json!({
                "customer_id": customer,
                "items": [
                    {"product_id": a, "quantity": 5},
                    {"product_id": b, "quantity": 1},
                ],
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["product_id"], b);
    assert_eq!(response.body["available"], 0);
    assert_eq!(app.count(Collection::Orders), 0);
    assert_eq!(app.count(Collection::OrderItems), 0);
    assert_eq!(app.stock(a), 10);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_any_write() {
    let app = TestApp::new();
    let customer = app.add_customer("KH-01", "Dai ly Hoang Long");
    let product = app.add_product("NPK-16", "10", 10);

    let bodies = [
        json!({"customer_id": customer, "items": []}),
        json!({"customer_id": customer, "items": [{"product_id": product, "quantity": 0}]}),
        json!({"customer_id": customer, "items": [{"product_id": product, "quantity": -3}]}),
    ];
    for body in bodies {
        let response = app.post("/api/v1/orders", Some(SALE_TOKEN), body.clone()).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{body}");
    }

    let unknown_customer = app
        .post(
            "/api/v1/orders",
            Some(SALE_TOKEN),
            json!({"customer_id": 999, "items": [{"product_id": product, "quantity": 1}]}),
        )
        .await;
    assert_eq!(unknown_customer.status, StatusCode::NOT_FOUND);

    let unknown_product = app
        .post(
            "/api/v1/orders",
            Some(SALE_TOKEN),
            json!({"customer_id": customer, "items": [{"product_id": 999, "quantity": 1}]}),
        )
        .await;
    assert_eq!(unknown_product.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown_product.body["product_id"], 999);

    let malformed = app
        .post("/api/v1/orders", Some(SALE_TOKEN), json!({"items": "none"}))
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert!(malformed.body["error"].is_string());

    assert_eq!(app.count(Collection::Orders), 0);
    assert_eq!(app.stock(product), 10);
}

#[tokio::test]
async fn test_customers_cannot_place_orders() {
    let app = TestApp::new();
    let customer = app.add_customer("KH-01", "Dai ly Hoang Long");
    let product = app.add_product("NPK-16", "10", 10);

    let response = app
        .post(
            "/api/v1/orders",
            Some(CUSTOMER_TOKEN),
            json!({"customer_id": customer, "items": [{"product_id": product, "quantity": 1}]}),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(app.count(Collection::Orders), 0);
}

#[tokio::test]
async fn test_partial_failure_is_compensated() {
    let app = TestApp::new();
    let customer = app.add_customer("KH-01", "Dai ly Hoang Long");
    let a = app.add_product("NPK-16", "10", 10);
    let b = app.add_product("URE-46", "20", 10);
    app.store.fail_after(FailOn::Insert(Collection::OrderItems), 1);

    let response = app
        .post(
            "/api/v1/orders",
            Some(SALE_TOKEN),
            json!({
                "customer_id": customer,
                "items": [
                    {"product_id": a, "quantity": 2},
                    {"product_id": b, "quantity": 3},
                ],
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["error"], "Order could not be completed");
    assert_eq!(response.body["failed_line"], 1);
    assert_eq!(response.body["compensated"], true);
    assert_eq!(app.stock(a), 10);
    assert_eq!(app.stock(b), 10);
    assert_eq!(app.count(Collection::OrderItems), 0);

    let order = app
        .store
        .find(Collection::Orders, response.body["order_id"].clone())
        .unwrap();
    assert_eq!(order["status"], "failed");
    assert!(!order["deleted_at"].is_null());

    let listed = app.get("/api/v1/orders", Some(SALE_TOKEN)).await;
    assert_eq!(listed.body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_unfinished_order_stays_out_of_listings_and_reports() {
    let app = TestApp::with_settings(RuntimeSettings {
        placement: PlacementPolicy {
            on_failure: FailurePolicy::Surface,
            ..PlacementPolicy::default()
        },
        ..RuntimeSettings::default()
    });
    let customer = app.add_customer("KH-01", "Dai ly Hoang Long");
    let a = app.add_product("NPK-16", "10", 10);
    let b = app.add_product("URE-46", "20", 10);
    app.store.fail_after(FailOn::AdjustStock, 1);

    let response = app
        .post(
            "/api/v1/orders",
            Some(SALE_TOKEN),
            json!({
                "customer_id": customer,
                "items": [
                    {"product_id": a, "quantity": 2},
                    {"product_id": b, "quantity": 3},
                ],
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["compensated"], false);
    let order_id = response.body["order_id"].as_i64().unwrap();

    let order = app.store.find(Collection::Orders, json!(order_id)).unwrap();
    assert_eq!(order["status"], "placing");

    let listed = app.get("/api/v1/orders", Some(ADMIN_TOKEN)).await;
    assert_eq!(listed.body["pagination"]["total"], 0);
    let single = app
        .get(&format!("/api/v1/orders/{order_id}"), Some(ADMIN_TOKEN))
        .await;
    assert_eq!(single.status, StatusCode::NOT_FOUND);
    let report = app.get("/api/v1/reports/sales", Some(ADMIN_TOKEN)).await;
    assert_eq!(report.body["data"]["total_orders"], 0);
}

#[tokio::test]
async fn test_order_listing_filters_and_status_updates() {
    let app = TestApp::new();
    let first = app.add_customer("KH-01", "Dai ly Hoang Long");
    let second = app.add_customer("KH-02", "HTX Nong nghiep Tan Phu");
    let product = app.add_product("NPK-16", "10", 100);

    let mut ids = Vec::new();
    for customer in [first, first, second] {
        let response = app
            .post(
                "/api/v1/orders",
                Some(SALE_TOKEN),
                json!({"customer_id": customer, "items": [{"product_id": product, "quantity": 1}]}),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        ids.push(response.body["data"]["id"].as_i64().unwrap());
    }

    let by_customer = app
        .get(&format!("/api/v1/orders?customer_id={first}"), Some(SALE_TOKEN))
        .await;
    assert_eq!(by_customer.status, StatusCode::OK);
    assert_eq!(by_customer.body["pagination"]["total"], 2);

    let confirmed = app
        .put(
            &format!("/api/v1/orders/{}", ids[2]),
            Some(SALE_TOKEN),
            json!({"status": "confirmed"}),
        )
        .await;
    assert_eq!(confirmed.status, StatusCode::OK);
    assert_eq!(confirmed.body["data"]["status"], "confirmed");

    let by_status = app
        .get("/api/v1/orders?status=confirmed", Some(SALE_TOKEN))
        .await;
    assert_eq!(by_status.body["pagination"]["total"], 1);
    assert_eq!(by_status.body["data"][0]["id"], ids[2]);

    let unknown_status = app
        .put(
            &format!("/api/v1/orders/{}", ids[0]),
            Some(SALE_TOKEN),
            json!({"status": "lost"}),
        )
        .await;
    assert_eq!(unknown_status.status, StatusCode::BAD_REQUEST);

    let workflow_status = app
        .put(
            &format!("/api/v1/orders/{}", ids[0]),
            Some(SALE_TOKEN),
            json!({"status": "placing"}),
        )
        .await;
    assert_eq!(workflow_status.status, StatusCode::BAD_REQUEST);

    let missing = app
        .put("/api/v1/orders/9999", Some(SALE_TOKEN), json!({"status": "confirmed"}))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_only_administrators_delete_orders() {
    let app = TestApp::new();
    let customer = app.add_customer("KH-01", "Dai ly Hoang Long");
    let product = app.add_product("NPK-16", "10", 10);
    let placed = app
        .post(
            "/api/v1/orders",
            Some(SALE_TOKEN),
            json!({"customer_id": customer, "items": [{"product_id": product, "quantity": 1}]}),
        )
        .await;
    let uri = format!("/api/v1/orders/{}", placed.body["data"]["id"]);

    assert_eq!(app.delete(&uri, Some(SALE_TOKEN)).await.status, StatusCode::FORBIDDEN);

    let deleted = app.delete(&uri, Some(ADMIN_TOKEN)).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["message"], "Order deleted");

    assert_eq!(app.get(&uri, Some(SALE_TOKEN)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.delete(&uri, Some(ADMIN_TOKEN)).await.status, StatusCode::NOT_FOUND);
}
