//! Core types for the gateway.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod page;
pub mod role;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{round_currency, line_total};
pub use page::{PageRequest, Pagination};
pub use role::Role;
pub use status::{OrderStatus, UnknownStatus};
