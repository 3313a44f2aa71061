//! # sapi_core
//!
//! Core domain logic for sAPI: the authentication and session-authorization
//! core, domain models, and the persistence layer it talks to.

pub mod auth;
pub mod migrate;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
