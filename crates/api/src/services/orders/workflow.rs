//! The order placement workflow.
//!
//! Steps, strictly in this order:
//!
//! 1. Validate the request (non-empty, positive quantities, bounded size).
//! 2. Check the customer exists.
//! 3. Fetch every requested product, in request order, excluding
//!    soft-deleted ones.
//! 4. Check stock against the cumulative quantity per product.
//! 5. Compute the total from the fetched prices and round it once.
//! 6. Insert the order header as `placing`, which keeps it out of listings
//!    and reports.
//! 7. For each line: reserve its stock, then record the item with its
//!    `price_at_order`.
//! 8. Confirm the header, moving it to `pending`.
//!
//! Nothing is written before step 6, so failures up to there leave no
//! trace. A recorded item always has its stock reserved: when recording
//! fails, the reservation for that line is released straight away. Any
//! other failure after step 6 is handled by [`FailurePolicy`], and orders
//! left `placing` are unwound by the [`Reconciler`](super::Reconciler).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use appejv_core::{CustomerId, OrderId, ProductId, SubjectId, line_total, round_currency};

use super::reconcile::unwind;
use super::{FailurePolicy, OrderError, PlacementPolicy, StockStrategy};
use crate::db::{CustomerRepository, NewOrderItem, OrderRepository, ProductRepository, RepositoryError};
use crate::deadline::Deadline;
use crate::models::{OrderDetails, OrderItem, OrderLineRequest, Product};
use crate::store::{DataStore, StockAdjustment};

/// Most lines a single order may carry.
pub const MAX_LINES: usize = 100;

#[derive(Debug, Clone, Copy)]
struct Line {
    product_id: ProductId,
    quantity: u32,
}

/// Why a write after the header failed.
#[derive(Debug)]
enum LineFailure {
    /// A concurrent order took the stock between the check and the reservation.
    StockTaken {
        product_id: ProductId,
        requested: u64,
        available: i64,
    },
    Fault(String),
}

impl fmt::Display for LineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StockTaken {
                product_id,
                available,
                ..
            } => write!(
                f,
                "stock for product {product_id} dropped to {available} before it could be reserved"
            ),
            Self::Fault(reason) => f.write_str(reason),
        }
    }
}

/// Places one order against the Data Store.
pub struct OrderPlacement {
    store: Arc<dyn DataStore>,
    policy: PlacementPolicy,
    deadline: Deadline,
}

impl OrderPlacement {
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>, policy: PlacementPolicy, deadline: Deadline) -> Self {
        Self {
            store,
            policy,
            deadline,
        }
    }

    /// Place an order for `customer_id` on behalf of `agent`.
    ///
    /// On success exactly one `pending` order header, one item per line and
    /// one stock decrement per line have been written.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`, `CustomerNotFound`, `ProductNotFound`,
    ///   `StoreUnavailable`, `DeadlineExceeded`: nothing was written.
    /// - `InsufficientStock`: nothing was written, or a concurrent order won
    ///   the stock and everything written was undone.
    /// - `PartialWriteFailure`: the header exists; see its `compensated` flag.
    #[instrument(
        skip(self, agent, requested),
        fields(customer_id = %customer_id, agent = %agent, lines = requested.len())
    )]
    pub async fn place(
        &self,
        customer_id: CustomerId,
        agent: &SubjectId,
        requested: &[OrderLineRequest],
    ) -> Result<OrderDetails, OrderError> {
        let lines = validate(requested)?;
        let store = &*self.store;

        if self
            .read(CustomerRepository::new(store).get(customer_id))
            .await?
            .is_none()
        {
            return Err(OrderError::CustomerNotFound(customer_id));
        }

        let products = self.fetch_products(&lines).await?;
        check_stock(&lines, &products)?;
        let total = order_total(&lines, &products)?;

        let orders = OrderRepository::new(store);
        let order = self
            .read(orders.create_placing(customer_id, agent, total))
            .await?;

        let mut observed: HashMap<ProductId, i64> =
            products.iter().map(|(id, p)| (*id, p.stock)).collect();
        let mut requested_so_far: HashMap<ProductId, u64> = HashMap::new();
        let mut items = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let requested = requested_so_far.entry(line.product_id).or_default();
            *requested += u64::from(line.quantity);
            let price = products
                .get(&line.product_id)
                .map_or(Decimal::ZERO, |p| p.price);

            if let Err(failure) = self.reserve(line, *requested, &mut observed).await {
                return Err(self.fail(order.id, index, None, failure).await);
            }
            match self.insert_item(order.id, line, price).await {
                Ok(item) => items.push(item),
                Err(reason) => {
                    let failure = LineFailure::Fault(reason);
                    return Err(self.fail(order.id, index, Some(*line), failure).await);
                }
            }
        }

        let confirmed = match self.deadline.run(orders.confirm(order.id)).await {
            Ok(Ok(Some(order))) => order,
            outcome => {
                let reason = match outcome {
                    Ok(Ok(_)) => "order was unwound before it could be confirmed".to_string(),
                    Ok(Err(e)) => format!("order confirmation failed: {e}"),
                    Err(_) => "deadline exceeded while confirming order".to_string(),
                };
                let failure = LineFailure::Fault(reason);
                return Err(self.fail(order.id, lines.len(), None, failure).await);
            }
        };

        info!(order_id = %confirmed.id, total = %confirmed.total_amount, "Order placed");
        Ok(OrderDetails {
            order: confirmed,
            items,
        })
    }

    /// Run a call that happens before any write.
    async fn read<T, F>(&self, call: F) -> Result<T, OrderError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        self.deadline
            .run(call)
            .await
            .map_err(|_| OrderError::DeadlineExceeded)?
            .map_err(OrderError::StoreUnavailable)
    }

    async fn fetch_products(&self, lines: &[Line]) -> Result<HashMap<ProductId, Product>, OrderError> {
        let repo = ProductRepository::new(&*self.store);
        let mut products = HashMap::new();

        for line in lines {
            if let Entry::Vacant(slot) = products.entry(line.product_id) {
                let product = self
                    .read(repo.get(line.product_id))
                    .await?
                    .ok_or(OrderError::ProductNotFound(line.product_id))?;
                slot.insert(product);
            }
        }
        Ok(products)
    }

    async fn insert_item(&self, order_id: OrderId, line: &Line, price: Decimal) -> Result<OrderItem, String> {
        let item = NewOrderItem {
            order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            price_at_order: price,
        };
        self.deadline
            .run(OrderRepository::new(&*self.store).add_item(item))
            .await
            .map_err(|_| "deadline exceeded while inserting order item".to_string())?
            .map_err(|e| format!("order item insert failed: {e}"))
    }

    /// Take the line's quantity out of stock. On error nothing was taken.
    async fn reserve(
        &self,
        line: &Line,
        requested: u64,
        observed: &mut HashMap<ProductId, i64>,
    ) -> Result<(), LineFailure> {
        let id = line.product_id;
        let quantity = i64::from(line.quantity);
        let fault = |reason: String| LineFailure::Fault(reason);

        match self.policy.stock {
            StockStrategy::Atomic => {
                let outcome = self
                    .deadline
                    .run(self.store.adjust_stock(id, -quantity))
                    .await
                    .map_err(|_| fault("deadline exceeded while decrementing stock".to_string()))?
                    .map_err(|e| fault(format!("stock decrement failed: {e}")))?;

                match outcome {
                    StockAdjustment::Applied { .. } => Ok(()),
                    StockAdjustment::Insufficient { available } => Err(LineFailure::StockTaken {
                        product_id: id,
                        requested,
                        available,
                    }),
                    StockAdjustment::NotFound => Err(fault(format!("product {id} disappeared"))),
                }
            }
            StockStrategy::ReadThenWrite => {
                let current = observed
                    .get_mut(&id)
                    .ok_or_else(|| fault(format!("product {id} was never read")))?;
                let next = *current - quantity;

                let written = self
                    .deadline
                    .run(ProductRepository::new(&*self.store).set_stock(id, next))
                    .await
                    .map_err(|_| fault("deadline exceeded while writing stock".to_string()))?
                    .map_err(|e| fault(format!("stock write failed: {e}")))?;

                if !written {
                    return Err(fault(format!("product {id} disappeared")));
                }
                *current = next;
                Ok(())
            }
        }
    }

    /// Undo what the failure policy asks for and build the caller's error.
    ///
    /// `unrecorded` is a line whose stock was reserved but whose item was
    /// never written; it is released under every policy. Losing a stock race
    /// always unwinds the order and, once that succeeds, is reported as
    /// `InsufficientStock`.
    async fn fail(
        &self,
        order_id: OrderId,
        line_index: usize,
        unrecorded: Option<Line>,
        failure: LineFailure,
    ) -> OrderError {
        let unwind_now = matches!(failure, LineFailure::StockTaken { .. })
            || self.policy.on_failure == FailurePolicy::Compensate;

        if unwind_now {
            warn!(order_id = %order_id, line_index, reason = %failure, "Order line failed, unwinding");
        } else {
            error!(
                order_id = %order_id,
                line_index,
                reason = %failure,
                "Order partially written; left placing for reconciliation"
            );
        }

        let compensated = self.compensate(order_id, unrecorded, unwind_now).await;

        match failure {
            LineFailure::StockTaken {
                product_id,
                requested,
                available,
            } if compensated => OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            failure => OrderError::PartialWriteFailure {
                order_id,
                line_index,
                compensated,
                reason: failure.to_string(),
            },
        }
    }

    /// Release `unrecorded`, then unwind the order when `unwind_order`.
    ///
    /// Runs on its own task under `compensation_timeout`, so it finishes even
    /// if the request is cancelled or already past its deadline. Returns
    /// `true` only when the order was fully unwound.
    async fn compensate(&self, order_id: OrderId, unrecorded: Option<Line>, unwind_order: bool) -> bool {
        let store = Arc::clone(&self.store);
        let deadline = Deadline::after(self.policy.compensation_timeout);

        let task = tokio::spawn(async move {
            let mut released = true;
            if let Some(line) = unrecorded {
                let outcome = deadline
                    .run(store.adjust_stock(line.product_id, i64::from(line.quantity)))
                    .await;
                if !matches!(outcome, Ok(Ok(StockAdjustment::Applied { .. }))) {
                    error!(
                        order_id = %order_id,
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        ?outcome,
                        "Stock reserved for an unrecorded line was not released; adjust it by hand"
                    );
                    released = false;
                }
            }

            if !unwind_order {
                return false;
            }

            let outcome = unwind(&*store, order_id, deadline).await;
            if !outcome.is_complete() {
                error!(order_id = %order_id, ?outcome, "Order not fully unwound");
            }
            released && outcome.is_complete()
        });

        match task.await {
            Ok(compensated) => compensated,
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Compensation task failed");
                false
            }
        }
    }
}

fn validate(requested: &[OrderLineRequest]) -> Result<Vec<Line>, OrderError> {
    if requested.is_empty() {
        return Err(OrderError::InvalidRequest(
            "Order must contain at least one item".to_string(),
        ));
    }
    if requested.len() > MAX_LINES {
        return Err(OrderError::InvalidRequest(format!(
            "Order may contain at most {MAX_LINES} items"
        )));
    }

    requested
        .iter()
        .enumerate()
        .map(|(index, line)| {
            u32::try_from(line.quantity)
                .ok()
                .filter(|q| *q > 0)
                .map(|quantity| Line {
                    product_id: line.product_id,
                    quantity,
                })
                .ok_or_else(|| {
                    OrderError::InvalidRequest(format!(
                        "Item {index}: quantity must be a positive integer"
                    ))
                })
        })
        .collect()
}

/// Stock must cover the running total requested per product, so repeated
/// lines for one product cannot oversell it.
fn check_stock(lines: &[Line], products: &HashMap<ProductId, Product>) -> Result<(), OrderError> {
    let mut requested: HashMap<ProductId, u64> = HashMap::new();

    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or(OrderError::ProductNotFound(line.product_id))?;
        let total = requested.entry(line.product_id).or_default();
        *total += u64::from(line.quantity);

        let available = u64::try_from(product.stock).unwrap_or(0);
        if available < *total {
            return Err(OrderError::InsufficientStock {
                product_id: line.product_id,
                requested: *total,
                available: product.stock,
            });
        }
    }
    Ok(())
}

fn order_total(lines: &[Line], products: &HashMap<ProductId, Product>) -> Result<Decimal, OrderError> {
    let mut total = Decimal::ZERO;
    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or(OrderError::ProductNotFound(line.product_id))?;
        total += line_total(product.price, line.quantity);
    }
    Ok(round_currency(total))
}
