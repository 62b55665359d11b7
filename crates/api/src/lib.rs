//! APPE JV API gateway library.
//!
//! Authenticates callers against an external Identity Provider, authorizes
//! them by profile role, throttles each client, and places inventory-aware
//! orders against a remote Data Store. The binary in `main.rs` wires these
//! pieces to configuration; everything else lives here so it can be tested
//! in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod deadline;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
