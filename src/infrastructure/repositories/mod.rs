//! Repository Implementations
//!
//! Implementations of the domain `ConversationStore` trait.
//!
//! ## Available Repositories
//!
//! - **PgConversationStore** - conversation membership from PostgreSQL
//! - **InMemoryConversationStore** - process-local store for tests and development
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use marketplace_realtime::infrastructure::repositories::PgConversationStore;
//!
//! let store: Arc<dyn ConversationStore> = Arc::new(PgConversationStore::new(pool));
//! ```

pub mod conversation_repository;
pub mod memory_conversation_store;

pub use conversation_repository::PgConversationStore;
pub use memory_conversation_store::InMemoryConversationStore;
