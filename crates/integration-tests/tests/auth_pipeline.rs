//! Identity verification, profile resolution and role checks through the router.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;

use appejv_integration_tests::{
    ADMIN_TOKEN, CUSTOMER_TOKEN, ORPHAN_TOKEN, SALE_TOKEN, TestApp,
};

#[tokio::test]
async fn test_missing_credential_makes_no_provider_call() {
    let app = TestApp::new();
    let response = app.get("/api/v1/profile", None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Authorization header required");
    assert_eq!(app.identity.calls(), 0);
}

#[tokio::test]
async fn test_malformed_credentials_make_no_provider_call() {
    let app = TestApp::new();
    for value in ["Token abc", "Bearer", "Bearer  abc", "bearer abc", "Bearer a b"] {
        let request = Request::get("/api/v1/profile")
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{value}");
        assert_eq!(
            response.body["error"],
            "Invalid authorization header format. Use: Bearer <token>"
        );
    }
    assert_eq!(app.identity.calls(), 0);
}

#[tokio::test]
async fn test_unknown_token_is_invalid_or_expired() {
    let app = TestApp::new();
    let response = app.get("/api/v1/profile", Some("revoked")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({"error": "Invalid or expired token"}));
    assert_eq!(app.identity.calls(), 1);
}

#[tokio::test]
async fn test_profile_returns_identity_and_role() {
    let app = TestApp::new();
    let response = app.get("/api/v1/profile", Some(SALE_TOKEN)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["id"], "u-sale");
    assert_eq!(response.body["data"]["role"], "sale");
    assert_eq!(response.body["data"]["email"], "u-sale@appejv.vn");
}

#[tokio::test]
async fn test_identity_without_profile_is_not_found_never_forbidden() {
    let app = TestApp::new();
    for uri in ["/api/v1/profile", "/api/v1/customers", "/api/v1/inventory"] {
        let response = app.get(uri, Some(ORPHAN_TOKEN)).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(response.body["error"], "User profile not found");
    }
}

#[tokio::test]
async fn test_forbidden_reports_role_and_required_roles() {
    let app = TestApp::new();
    let response = app.get("/api/v1/customers", Some(CUSTOMER_TOKEN)).await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"], "Insufficient permissions");
    assert_eq!(response.body["user_role"], "customer");
    assert_eq!(
        response.body["required_roles"],
        json!(["sale", "admin", "sale_admin"])
    );
}

#[tokio::test]
async fn test_role_sets_per_route() {
    let app = TestApp::new();
    app.add_user("token-lead", "u-lead", "sale_admin");

    assert_eq!(app.get("/api/v1/customers", Some(SALE_TOKEN)).await.status, StatusCode::OK);
    assert_eq!(app.get("/api/v1/inventory", Some(SALE_TOKEN)).await.status, StatusCode::FORBIDDEN);
    assert_eq!(app.get("/api/v1/inventory", Some(ADMIN_TOKEN)).await.status, StatusCode::OK);
    assert_eq!(app.get("/api/v1/inventory", Some("token-lead")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_unrecognised_role_is_forbidden() {
    let app = TestApp::new();
    app.add_user("token-warehouse", "u-warehouse", "Admin");

    let response = app.get("/api/v1/inventory", Some("token-warehouse")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["user_role"], "Admin");

    // Authentication alone still works for an unknown role
    let response = app.get("/api/v1/profile", Some("token-warehouse")).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_public_routes_need_no_credential() {
    let app = TestApp::new();
    app.add_product("NPK-01", "10", 5);

    let response = app.get("/api/v1/products", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.identity.calls(), 0);
}
