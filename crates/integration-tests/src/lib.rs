//! Integration test harness for the APPE JV API gateway.
//!
//! Drives the real router in-process with `tower::ServiceExt::oneshot`,
//! backed by the in-memory Data Store and a stub Identity Provider.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p appejv-integration-tests
//! ```
//!
//! [`TestApp::new`] seeds three callers:
//!
//! | token            | role       |
//! |------------------|------------|
//! | [`ADMIN_TOKEN`]  | `admin`    |
//! | [`SALE_TOKEN`]   | `sale`     |
//! | [`CUSTOMER_TOKEN`] | `customer` |
//!
//! plus [`ORPHAN_TOKEN`], which verifies but has no profile row.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;

use appejv_api::config::RuntimeSettings;
use appejv_api::routes::build_router;
use appejv_api::services::auth::{IdentityClaims, IdentityProvider, ProviderError};
use appejv_api::state::AppState;
use appejv_api::store::{Collection, MemoryStore, row};

pub const ADMIN_TOKEN: &str = "token-admin";
pub const SALE_TOKEN: &str = "token-sale";
pub const CUSTOMER_TOKEN: &str = "token-customer";
pub const ORPHAN_TOKEN: &str = "token-orphan";

/// Origin allowed by the test router's CORS layer.
pub const TEST_ORIGIN: &str = "http://localhost:3000";

/// Identity Provider that knows a fixed set of tokens and counts lookups.
#[derive(Debug, Default)]
pub struct StubIdentity {
    tokens: Mutex<HashMap<String, IdentityClaims>>,
    calls: AtomicUsize,
}

impl StubIdentity {
    pub fn grant(&self, token: &str, subject: &str, email: &str) {
        self.tokens.lock().insert(
            token.to_string(),
            IdentityClaims {
                id: subject.to_string(),
                email: email.to_string(),
            },
        );
    }

    /// Number of lookups made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn lookup(&self, token: &str) -> Result<IdentityClaims, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .get(token)
            .cloned()
            .ok_or(ProviderError::Rejected(401))
    }
}

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// The full router over an in-memory store.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub identity: Arc<StubIdentity>,
    pub state: AppState,
    router: Router,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(RuntimeSettings::default())
    }

    pub fn with_settings(settings: RuntimeSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(StubIdentity::default());
        let state = AppState::new(settings, store.clone(), identity.clone());
        let router = build_router(state.clone(), &[TEST_ORIGIN.to_string()]);

        let app = Self {
            store,
            identity,
            state,
            router,
        };
        app.add_user(ADMIN_TOKEN, "u-admin", "admin");
        app.add_user(SALE_TOKEN, "u-sale", "sale");
        app.add_user(CUSTOMER_TOKEN, "u-customer", "customer");
        app.identity.grant(ORPHAN_TOKEN, "u-orphan", "orphan@appejv.vn");
        app
    }

    /// Grant `token` for `subject` and give it a profile with `role`.
    pub fn add_user(&self, token: &str, subject: &str, role: &str) {
        self.identity
            .grant(token, subject, &format!("{subject}@appejv.vn"));
        self.store.seed(
            Collection::Profiles,
            row([
                ("id", json!(subject)),
                ("full_name", json!(format!("User {subject}"))),
                ("role", json!(role)),
            ]),
        );
    }

    /// Seed a product and return its id.
    pub fn add_product(&self, code: &str, price: &str, stock: i64) -> i64 {
        let stored = self.store.seed(
            Collection::Products,
            row([
                ("code", json!(code)),
                ("name", json!(format!("Product {code}"))),
                ("unit", json!("bao")),
                ("category", json!("fertilizer")),
                ("price", json!(price)),
                ("stock", json!(stock)),
            ]),
        );
        stored["id"].as_i64().unwrap()
    }

    /// Seed a customer and return its id.
    pub fn add_customer(&self, code: &str, name: &str) -> i64 {
        let stored = self.store.seed(
            Collection::Customers,
            row([
                ("code", json!(code)),
                ("name", json!(name)),
                ("phone", json!("0900000000")),
            ]),
        );
        stored["id"].as_i64().unwrap()
    }

    pub fn stock(&self, product_id: i64) -> i64 {
        self.store.find(Collection::Products, product_id).unwrap()["stock"]
            .as_i64()
            .unwrap()
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.store.rows(collection).len()
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, token, None).await
    }
}
