//! Identity extractors: token verification and capability gates.

pub mod access;
pub mod auth;
