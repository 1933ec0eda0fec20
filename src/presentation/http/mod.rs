//! HTTP Surface
//!
//! Health probes, metrics and the operator API.

pub mod handlers;
pub mod routes;
