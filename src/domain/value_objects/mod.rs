//! # Value Objects
//!
//! Immutable value types used across the domain.

mod route_context;

pub use route_context::{RouteClassifier, RouteStatus, RouteStatusView};
