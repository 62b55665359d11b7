//! Unwinding orders whose placement did not settle.
//!
//! Every `order_items` row of an unsettled order stands for exactly one
//! applied stock decrement: the workflow reserves stock before it records a
//! line, and undoes the reservation itself when the line cannot be recorded.
//! Unwinding deletes each line and restores its quantity. Only the caller
//! whose delete removed a row restores it, so overlapping or repeated passes
//! never restore the same line twice.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use appejv_core::OrderId;

use crate::db::{OrderRepository, RepositoryError};
use crate::deadline::{Deadline, DeadlineExceeded};
use crate::store::{DataStore, StockAdjustment};

/// Outcome of unwinding one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unwind {
    /// Every line was removed with its stock restored, and the order retired.
    Complete,
    /// The order was retired but some stock could not be restored; each
    /// shortfall was logged with its product and quantity.
    StockNotRestored,
    /// The placement confirmed the order first; nothing was touched.
    Settled,
    /// A Data Store call failed part-way; a later pass picks it up again.
    Interrupted,
}

impl Unwind {
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Claim `order_id` as `failed`, remove its lines, restore their stock and
/// soft-delete it. Safe to call again on an order it already (partly) unwound.
#[instrument(skip(store, deadline), fields(order_id = %order_id))]
pub async fn unwind(store: &dyn DataStore, order_id: OrderId, deadline: Deadline) -> Unwind {
    let repo = OrderRepository::new(store);

    // The claim loses to a confirmation; a previous pass may also hold it
    if let Err(reason) = step(deadline, repo.claim_failed(order_id)).await {
        warn!(%reason, "Could not claim order for unwinding");
        return Unwind::Interrupted;
    }
    match step(deadline, repo.is_failed(order_id)).await {
        Ok(true) => {}
        Ok(false) => {
            info!("Order was confirmed; nothing to unwind");
            return Unwind::Settled;
        }
        Err(reason) => {
            warn!(%reason, "Could not read order status");
            return Unwind::Interrupted;
        }
    }

    let items = match step(deadline, repo.items(order_id)).await {
        Ok(items) => items,
        Err(reason) => {
            warn!(%reason, "Could not read order lines");
            return Unwind::Interrupted;
        }
    };

    let mut restored_all = true;
    for item in items.iter().rev() {
        let removed = match step(deadline, repo.remove_item(item.id)).await {
            Ok(Some(removed)) => removed,
            Ok(None) => continue,
            Err(reason) => {
                warn!(item_id = %item.id, %reason, "Could not remove order line");
                return Unwind::Interrupted;
            }
        };

        let outcome = deadline
            .run(store.adjust_stock(removed.product_id, i64::from(removed.quantity)))
            .await;
        if !matches!(outcome, Ok(Ok(StockAdjustment::Applied { .. }))) {
            error!(
                product_id = %removed.product_id,
                quantity = removed.quantity,
                ?outcome,
                "Stock not restored for removed order line; adjust it by hand"
            );
            restored_all = false;
        }
    }

    if let Err(reason) = step(deadline, repo.retire_failed(order_id)).await {
        warn!(%reason, "Could not retire unwound order");
        return Unwind::Interrupted;
    }

    debug!(lines = items.len(), restored_all, "Order unwound");
    if restored_all {
        Unwind::Complete
    } else {
        Unwind::StockNotRestored
    }
}

async fn step<T, F>(deadline: Deadline, call: F) -> Result<T, String>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    deadline
        .run(call)
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

/// Listing unsettled orders failed, so the pass did nothing.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] RepositoryError),
    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// Tally of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub unwound: usize,
    pub stock_not_restored: usize,
    pub settled: usize,
    pub interrupted: usize,
}

/// Periodic pass over orders left `placing` or half-unwound.
///
/// A `placing` order is only touched once it is older than `settle_after`,
/// so a placement still running in some request is never raced.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn DataStore>,
    settle_after: Duration,
    step_timeout: Duration,
}

impl Reconciler {
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>, settle_after: Duration, step_timeout: Duration) -> Self {
        Self {
            store,
            settle_after,
            step_timeout,
        }
    }

    /// One pass as of now.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError` if the unsettled orders cannot be listed.
    pub async fn run(&self) -> Result<ReconcileReport, ReconcileError> {
        self.run_at(Utc::now()).await
    }

    /// One pass treating `now` as the current time.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError` if the unsettled orders cannot be listed.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport, ReconcileError> {
        let age = chrono::Duration::from_std(self.settle_after).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let orders = Deadline::after(self.step_timeout)
            .run(OrderRepository::new(&*self.store).unsettled(cutoff))
            .await??;

        let mut report = ReconcileReport {
            examined: orders.len(),
            ..ReconcileReport::default()
        };
        for order in orders {
            let outcome = unwind(&*self.store, order.id, Deadline::after(self.step_timeout)).await;
            match outcome {
                Unwind::Complete => report.unwound += 1,
                Unwind::StockNotRestored => report.stock_not_restored += 1,
                Unwind::Settled => report.settled += 1,
                Unwind::Interrupted => report.interrupted += 1,
            }
        }
        Ok(report)
    }

    /// Run a pass every `period` on the current tokio runtime until the
    /// returned handle is dropped.
    #[must_use]
    pub fn spawn(self, period: Duration) -> ReconcilerHandle {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match self.run().await {
                    Ok(report) if report.examined > 0 => {
                        info!(
                            examined = report.examined,
                            unwound = report.unwound,
                            stock_not_restored = report.stock_not_restored,
                            settled = report.settled,
                            interrupted = report.interrupted,
                            "Reconciliation pass"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Reconciliation pass failed"),
                }
            }
        });

        ReconcilerHandle { task }
    }
}

/// Owns the background reconciliation task; aborts it on drop.
#[derive(Debug)]
pub struct ReconcilerHandle {
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use appejv_core::{CustomerId, ProductId, SubjectId};

    use super::*;
    use crate::db::NewOrderItem;
    use crate::store::{Collection, FailOn, MemoryStore, row};

    const SETTLE_AFTER: Duration = Duration::from_secs(80);

    /// Products 1 and 2 at stock 10, and a `placing` order holding two lines
    /// whose stock (2 of product 1, 3 of product 2) has been taken.
    async fn half_placed() -> (Arc<MemoryStore>, OrderId) {
        let store = Arc::new(MemoryStore::new());
        for code in ["P1", "P2"] {
            store.seed(
                Collection::Products,
                row([("code", json!(code)), ("price", json!("10")), ("stock", json!(10))]),
            );
        }

        let repo = OrderRepository::new(&*store);
        let order = repo
            .create_placing(CustomerId::new(1), &SubjectId::new("agent"), Decimal::from(70))
            .await
            .unwrap();
        for (product, quantity) in [(1, 2), (2, 3)] {
            store
                .adjust_stock(ProductId::new(product), -i64::from(quantity))
                .await
                .unwrap();
            repo.add_item(NewOrderItem {
                order_id: order.id,
                product_id: ProductId::new(product),
                quantity,
                price_at_order: Decimal::from(10),
            })
            .await
            .unwrap();
        }
        (store, order.id)
    }

    fn stock(store: &MemoryStore, product: i64) -> i64 {
        store.find(Collection::Products, product).unwrap()["stock"]
            .as_i64()
            .unwrap()
    }

    fn reconciler(store: &Arc<MemoryStore>) -> Reconciler {
        Reconciler::new(store.clone(), SETTLE_AFTER, Duration::from_secs(5))
    }

    fn later() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::minutes(5)
    }

    #[tokio::test]
    async fn test_unwind_restores_stock_and_removes_lines() {
        let (store, order_id) = half_placed().await;

        let outcome = unwind(&*store, order_id, Deadline::after(Duration::from_secs(5))).await;
        assert_eq!(outcome, Unwind::Complete);
        assert_eq!(stock(&store, 1), 10);
        assert_eq!(stock(&store, 2), 10);
        assert!(store.rows(Collection::OrderItems).is_empty());

        let order = store.find(Collection::Orders, order_id.as_i64()).unwrap();
        assert_eq!(order["status"], json!("failed"));
        assert!(!order["deleted_at"].is_null());

        // A second run finds nothing left to restore
        let again = unwind(&*store, order_id, Deadline::after(Duration::from_secs(5))).await;
        assert_eq!(again, Unwind::Complete);
        assert_eq!(stock(&store, 1), 10);
    }

    #[tokio::test]
    async fn test_unwind_leaves_confirmed_order_alone() {
        let (store, order_id) = half_placed().await;
        OrderRepository::new(&*store).confirm(order_id).await.unwrap();

        let outcome = unwind(&*store, order_id, Deadline::after(Duration::from_secs(5))).await;
        assert_eq!(outcome, Unwind::Settled);
        assert_eq!(stock(&store, 1), 8);
        assert_eq!(store.rows(Collection::OrderItems).len(), 2);
    }

    #[tokio::test]
    async fn test_interrupted_unwind_resumes_without_double_restore() {
        let (store, order_id) = half_placed().await;
        // The first line goes (last recorded first), the second delete fails
        store.fail_after(FailOn::Delete(Collection::OrderItems), 1);

        let outcome = unwind(&*store, order_id, Deadline::after(Duration::from_secs(5))).await;
        assert_eq!(outcome, Unwind::Interrupted);
        assert_eq!(stock(&store, 2), 10);
        assert_eq!(stock(&store, 1), 8);

        store.clear_failures();
        let report = reconciler(&store).run_at(Utc::now()).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.unwound, 1);
        assert_eq!(stock(&store, 1), 10);
        assert_eq!(stock(&store, 2), 10);
    }

    #[tokio::test]
    async fn test_pass_skips_recent_placing_orders() {
        let (store, order_id) = half_placed().await;

        let report = reconciler(&store).run_at(Utc::now()).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(stock(&store, 1), 8);

        let report = reconciler(&store).run_at(later()).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.unwound, 1);
        assert_eq!(stock(&store, 1), 10);
        assert!(OrderRepository::new(&*store).is_failed(order_id).await.unwrap());

        let report = reconciler(&store).run_at(later()).await.unwrap();
        assert_eq!(report.examined, 0);
    }

    #[tokio::test]
    async fn test_unrestorable_stock_is_reported() {
        let (store, _) = half_placed().await;
        store.fail_after(FailOn::AdjustStock, 0);

        let report = reconciler(&store).run_at(later()).await.unwrap();
        assert_eq!(report.stock_not_restored, 1);
        assert!(store.rows(Collection::OrderItems).is_empty());
        assert_eq!(stock(&store, 1), 8);
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let (store, _) = half_placed().await;
        store.fail_after(FailOn::Select(Collection::Orders), 0);
        assert!(matches!(
            reconciler(&store).run_at(later()).await,
            Err(ReconcileError::Store(_))
        ));
    }
}
