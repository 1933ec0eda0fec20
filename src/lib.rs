//! # Marketplace Realtime Library
//!
//! Real-time delivery and presence subsystem of a gaming-marketplace chat:
//! - Push connections per user with paced offline replay
//! - Debounced presence with conversation-scoped authorization
//! - Route-aware deferral of conversation events
//! - Notification history with exponential-backoff delivery retries
//! - An in-process TTL cache shared by all of the above
//!
//! ## Architecture
//!
//! - **Domain Layer**: envelopes, notifications, queued events, route context
//! - **Application Layer**: presence, deferral, notification and cache admin services
//! - **Infrastructure Layer**: TTL cache, conversation stores, metrics
//! - **Presentation Layer**: WebSocket gateway, connection registry, operator API
//!
//! ## Module Structure
//!
//! ```text
//! marketplace_realtime/
//! +-- config/         Configuration management
//! +-- domain/         Entities and value objects
//! +-- application/    Delivery and presence services
//! +-- infrastructure/ Cache, database and metrics
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core types
pub mod domain;

// Application layer - Delivery services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
