//! Middleware
//!
//! Tower middleware for request processing.

pub mod auth;
pub mod cors;
pub mod logging;

pub use auth::{admin_key_middleware, validate_token, Claims, ADMIN_KEY_HEADER};
