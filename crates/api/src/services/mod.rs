//! Request-time services.
//!
//! - [`rate_limiter`] - per-client fixed-window throttling
//! - [`auth`] - credential verification, profile resolution and role checks
//! - [`orders`] - the order placement workflow

pub mod auth;
pub mod orders;
pub mod rate_limiter;

pub use auth::{AuthContext, AuthError, Identity};
pub use orders::{OrderError, OrderPlacement};
pub use rate_limiter::{Decision, RateLimitConfig, RateLimiter, SweeperHandle};
