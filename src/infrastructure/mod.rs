//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - In-process TTL cache
//! - Database pool and conversation membership repositories
//! - Prometheus metrics

pub mod cache;
pub mod database;
pub mod metrics;
pub mod repositories;
