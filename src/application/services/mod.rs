//! Application Services
//!
//! Services coordinating the registry, the cache and the conversation store.
//!
//! ## Available Services
//!
//! - **PresenceService**: online/offline transitions, grace period, authorized subscriptions
//! - **RouteDeferralService**: route-aware deferral and flush of conversation events
//! - **NotificationService**: notification history, delivery and backoff retries
//! - **CacheAdminService**: operator inspection and invalidation of the cache

pub mod cache_admin_service;
pub mod notification_service;
pub mod presence_service;
pub mod route_deferral_service;

pub use cache_admin_service::{CacheAdminService, InvalidationReport};
pub use notification_service::{
    BroadcastResult, NotificationService, RetryOutcome, SendOptions, SendResult,
};
pub use presence_service::PresenceService;
pub use route_deferral_service::{
    DeferralDecision, DeliveryConfirmation, DispatchOutcome, RouteDeferralService,
};
