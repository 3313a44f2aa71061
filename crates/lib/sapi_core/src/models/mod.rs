//! Domain models.

pub mod auth;
pub mod todo;
pub mod user;
