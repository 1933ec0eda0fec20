//! HTTP Handlers
//!
//! Request handlers for the operator and probe endpoints.

pub mod admin;
pub mod health;
