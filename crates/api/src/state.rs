//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::{ApiConfig, RuntimeSettings};
use crate::services::auth::{HttpIdentityProvider, IdentityProvider, ProviderError};
use crate::services::orders::{Reconciler, ReconcilerHandle};
use crate::services::rate_limiter::{RateLimiter, SweeperHandle};
use crate::store::{DataStore, PostgrestStore, StoreError};

/// Error building the application state from configuration.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("data store client: {0}")]
    Store(#[from] StoreError),
    #[error("identity provider client: {0}")]
    Identity(#[from] ProviderError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Owns the rate limiter table and, when built
/// with [`AppState::from_config`], the rate limit sweeper and the order
/// reconciliation pass; dropping the last clone stops both.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    settings: RuntimeSettings,
    store: Arc<dyn DataStore>,
    identity: Arc<dyn IdentityProvider>,
    rate_limiter: Arc<RateLimiter>,
    _background: Option<(SweeperHandle, ReconcilerHandle)>,
}

impl AppState {
    /// Assemble state from already-built collaborators.
    ///
    /// No background task is started; tests drive [`RateLimiter::sweep`]
    /// and [`Reconciler::run_at`] themselves.
    #[must_use]
    pub fn new(
        settings: RuntimeSettings,
        store: Arc<dyn DataStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(settings.rate_limit));
        Self::assemble(settings, store, identity, rate_limiter, None)
    }

    /// Build the HTTP clients from configuration and start the background
    /// tasks.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if either HTTP client cannot be built.
    pub fn from_config(config: &ApiConfig) -> Result<Self, StateError> {
        let store: Arc<dyn DataStore> = Arc::new(PostgrestStore::new(&config.data_store)?);
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(HttpIdentityProvider::new(&config.identity)?);

        let settings = config.runtime.clone();
        let rate_limiter = Arc::new(RateLimiter::new(settings.rate_limit));
        let sweeper = rate_limiter.spawn_sweeper();
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            settings.placement.settle_after(settings.request_timeout),
            settings.request_timeout,
        )
        .spawn(settings.placement.reconcile_interval);

        Ok(Self::assemble(
            settings,
            store,
            identity,
            rate_limiter,
            Some((sweeper, reconciler)),
        ))
    }

    fn assemble(
        settings: RuntimeSettings,
        store: Arc<dyn DataStore>,
        identity: Arc<dyn IdentityProvider>,
        rate_limiter: Arc<RateLimiter>,
        background: Option<(SweeperHandle, ReconcilerHandle)>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                settings,
                store,
                identity,
                rate_limiter,
                _background: background,
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &RuntimeSettings {
        &self.inner.settings
    }

    /// The Data Store, borrowed for repository calls.
    #[must_use]
    pub fn store(&self) -> &dyn DataStore {
        &*self.inner.store
    }

    /// A shared handle to the Data Store for work that may outlive the request.
    #[must_use]
    pub fn store_handle(&self) -> Arc<dyn DataStore> {
        Arc::clone(&self.inner.store)
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        &*self.inner.identity
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }
}
