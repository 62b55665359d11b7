//! APPE JV Core - Shared domain types.
//!
//! This crate provides the types shared by the API gateway and its tests:
//! - type-safe row IDs and the opaque identity subject ID
//! - roles and order statuses as closed enumerations
//! - currency rounding and pagination arithmetic
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no async. Everything that talks to the Identity Provider or the
//! Data Store lives in `appejv-api`.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, roles, statuses, money and pages

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
