//! # Domain Layer
//!
//! Core types of the real-time delivery and presence subsystem. Independent
//! of the transport, the cache and the database.
//!
//! ## Structure
//!
//! - **entities**: envelopes, notifications, queued events, presence records,
//!   conversation memberships and the `ConversationStore` contract
//! - **value_objects**: route classification and per-user route status

pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use value_objects::*;
