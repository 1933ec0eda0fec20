//! # Configuration Module
//!
//! This module handles application configuration loading and management.
//! Configuration can be loaded from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{environment}.toml)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use marketplace_realtime::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Retry budget: {}", settings.delivery.max_retry_attempts);
//! ```

mod settings;

pub use settings::*;
