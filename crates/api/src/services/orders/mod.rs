//! Order placement.
//!
//! The Data Store offers no transaction spanning an order header, its lines
//! and the stock of every product involved. [`OrderPlacement`] therefore runs
//! the steps in a fixed order behind a `placing` header and, when a write
//! fails part-way, follows the configured [`FailurePolicy`]. The
//! [`Reconciler`] unwinds whatever a placement left unsettled.

pub mod error;
pub mod policy;
pub mod reconcile;
pub mod workflow;

pub use error::OrderError;
pub use policy::{FailurePolicy, PlacementPolicy, StockStrategy};
pub use reconcile::{ReconcileError, ReconcileReport, Reconciler, ReconcilerHandle, Unwind};
pub use workflow::{MAX_LINES, OrderPlacement};
