//! HTTP middleware stack for the gateway.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transactions)
//! 2. CORS (`ALLOWED_ORIGINS`)
//! 3. `TraceLayer` (request span)
//! 4. Request ID (add unique ID to each request)
//! 5. Rate limiting (fixed window per client key, before any auth work)
//! 6. Deadline (per-request budget for upstream calls)
//!
//! Authentication is not a layer: handlers opt in through the
//! [`CurrentUser`] and [`RequireRole`] extractors, so the role check always
//! runs after identity verification and profile resolution.

pub mod auth;
pub mod deadline;
pub mod rate_limit;
pub mod request_id;

pub use auth::{CurrentUser, RequireRole};
pub use deadline::deadline_middleware;
pub use rate_limit::{client_key, rate_limit_middleware};
pub use request_id::request_id_middleware;
