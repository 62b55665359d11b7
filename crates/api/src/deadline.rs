//! Per-request deadline propagated to every upstream call.
//!
//! The deadline middleware stamps each request with `now + REQUEST_TIMEOUT_SECS`.
//! Handlers extract it and wrap Identity Provider and Data Store calls in
//! [`Deadline::run`], so a slow upstream cannot hold a request past its budget.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use thiserror::Error;
use tokio::time::Instant;

/// Budget used when a request reaches a handler without the middleware.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// The request's deadline passed while waiting on an upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request deadline exceeded")]
pub struct DeadlineExceeded;

/// Instant by which a request must finish its upstream work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self(instant)
    }

    #[must_use]
    pub const fn instant(&self) -> Instant {
        self.0
    }

    /// Time left; zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Drive `future` to completion unless the deadline passes first.
    ///
    /// # Errors
    ///
    /// Returns [`DeadlineExceeded`] if the deadline is reached; the future is
    /// dropped at that point.
    pub async fn run<F>(self, future: F) -> Result<F::Output, DeadlineExceeded>
    where
        F: Future,
    {
        tokio::time::timeout_at(self.0, future)
            .await
            .map_err(|_| DeadlineExceeded)
    }
}

impl<S> FromRequestParts<S> for Deadline
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .copied()
            .unwrap_or_else(|| Self::after(FALLBACK_TIMEOUT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes_within_budget() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert_eq!(deadline.run(async { 7 }).await, Ok(7));
        assert!(!deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_after_deadline() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let slow = tokio::time::sleep(Duration::from_secs(10));
        assert_eq!(deadline.run(slow).await, Err(DeadlineExceeded));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }
}
