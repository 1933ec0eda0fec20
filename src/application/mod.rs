//! Application Layer
//!
//! Delivery and presence services. This layer orchestrates the flow between
//! the connection registry, the cache and the domain types.

pub mod services;
