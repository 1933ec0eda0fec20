//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL, conversation membership)
    pub database: DatabaseSettings,

    /// JWT settings used to validate websocket handshakes
    pub jwt: JwtSettings,

    /// Operator surface configuration
    pub admin: AdminSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// In-process TTL cache
    pub cache: CacheSettings,

    /// Presence tracking
    pub presence: PresenceSettings,

    /// Offline replay and notification delivery
    pub delivery: DeliverySettings,

    /// Route-aware deferral of conversation events
    pub routes: RouteSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// JWT validation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key the tokens are signed with
    pub secret: String,
}

/// Operator surface configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSettings {
    /// Shared key expected in the `X-Admin-Key` header
    pub api_key: String,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// TTL cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Entry count at which bulk eviction kicks in
    pub max_entries: usize,

    /// Fraction of entries (oldest inserted first) dropped per eviction
    pub eviction_fraction: f64,

    /// Interval of the background expiry sweep in seconds
    pub sweep_interval_secs: u64,
}

/// Presence tracker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    /// Delay before a disconnect is treated as a real offline transition
    pub grace_period_ms: u64,

    /// TTL of the online marker
    pub online_ttl_secs: u64,

    /// TTL of the lastSeen / lastActiveAt markers
    pub last_seen_ttl_secs: u64,

    /// TTL of a requester's cached conversation participant sets
    pub authorization_ttl_secs: u64,
}

/// Offline replay and notification delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySettings {
    /// Pause between two replayed offline payloads
    pub replay_interval_ms: u64,

    /// TTL of a user's offline queue
    pub offline_queue_ttl_secs: u64,

    /// Bound of a user's offline queue (oldest dropped first)
    pub max_offline_messages: usize,

    /// Retry budget per notification
    pub max_retry_attempts: u32,

    /// First retry delay; doubles on every attempt
    pub retry_base_delay_ms: u64,

    /// Bound of a user's notification history (newest first)
    pub history_limit: usize,

    /// TTL of notification history and unread counters
    pub history_ttl_secs: u64,
}

/// Route-aware deferral configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteSettings {
    /// A reported route older than this is treated as out of context
    pub freshness_window_secs: u64,

    /// Bound of a user's deferred-event queue (oldest dropped first)
    pub max_deferred_events: usize,

    /// TTL of a user's deferred-event queue
    pub deferred_ttl_secs: u64,

    /// TTL of delivery confirmations awaiting acknowledgment
    pub confirmation_ttl_secs: u64,

    /// Route prefixes on which conversation events are seen live
    pub relevant_prefixes: Vec<String>,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if JWT secret is too short.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            .set_default("admin.api_key", "")? // empty disables /admin
            .set_default("cache.max_entries", 10_000_i64)?
            .set_default("cache.eviction_fraction", 0.1)?
            .set_default("cache.sweep_interval_secs", 60_i64)?
            .set_default("presence.grace_period_ms", 5_000_i64)?
            .set_default("presence.online_ttl_secs", 86_400_i64)?
            .set_default("presence.last_seen_ttl_secs", 2_592_000_i64)? // 30 days
            .set_default("presence.authorization_ttl_secs", 60_i64)?
            .set_default("delivery.replay_interval_ms", 100_i64)?
            .set_default("delivery.offline_queue_ttl_secs", 86_400_i64)?
            .set_default("delivery.max_offline_messages", 100_i64)?
            .set_default("delivery.max_retry_attempts", 3_i64)?
            .set_default("delivery.retry_base_delay_ms", 5_000_i64)?
            .set_default("delivery.history_limit", 100_i64)?
            .set_default("delivery.history_ttl_secs", 604_800_i64)? // 7 days
            .set_default("routes.freshness_window_secs", 30_i64)?
            .set_default("routes.max_deferred_events", 50_i64)?
            .set_default("routes.deferred_ttl_secs", 86_400_i64)?
            .set_default("routes.confirmation_ttl_secs", 86_400_i64)?
            .set_default(
                "routes.relevant_prefixes",
                vec!["/chat", "/messages", "/conversations"],
            )?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__DELIVERY__MAX_RETRY_ATTEMPTS=5 -> delivery.max_retry_attempts = 5
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option("admin.api_key", std::env::var("ADMIN_API_KEY").ok())?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| settings.validate().map(|()| settings))
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters for security. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }
        if !(0.0..=1.0).contains(&self.cache.eviction_fraction) {
            return Err(ConfigError::Message(format!(
                "cache.eviction_fraction must be within 0..=1, got {}",
                self.cache.eviction_fraction
            )));
        }
        // Both drive tokio intervals, which reject a zero period.
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "cache.sweep_interval_secs must be greater than 0".into(),
            ));
        }
        if self.delivery.replay_interval_ms == 0 {
            return Err(ConfigError::Message(
                "delivery.replay_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl CacheSettings {
    /// Never zero, even when built without [`Settings::validate`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            eviction_fraction: 0.1,
            sweep_interval_secs: 60,
        }
    }
}

impl PresenceSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn online_ttl(&self) -> Duration {
        Duration::from_secs(self.online_ttl_secs)
    }

    pub fn last_seen_ttl(&self) -> Duration {
        Duration::from_secs(self.last_seen_ttl_secs)
    }

    pub fn authorization_ttl(&self) -> Duration {
        Duration::from_secs(self.authorization_ttl_secs)
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
            online_ttl_secs: 86_400,
            last_seen_ttl_secs: 2_592_000,
            authorization_ttl_secs: 60,
        }
    }
}

impl DeliverySettings {
    /// Never zero, even when built without [`Settings::validate`].
    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms.max(1))
    }

    pub fn offline_queue_ttl(&self) -> Duration {
        Duration::from_secs(self.offline_queue_ttl_secs)
    }

    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_secs)
    }

    /// Backoff before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            replay_interval_ms: 100,
            offline_queue_ttl_secs: 86_400,
            max_offline_messages: 100,
            max_retry_attempts: 3,
            retry_base_delay_ms: 5_000,
            history_limit: 100,
            history_ttl_secs: 604_800,
        }
    }
}

impl RouteSettings {
    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    pub fn deferred_ttl(&self) -> Duration {
        Duration::from_secs(self.deferred_ttl_secs)
    }

    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_ttl_secs)
    }
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            freshness_window_secs: 30,
            max_deferred_events: 50,
            deferred_ttl_secs: 86_400,
            confirmation_ttl_secs: 86_400,
            relevant_prefixes: vec![
                "/chat".to_string(),
                "/messages".to_string(),
                "/conversations".to_string(),
            ],
        }
    }
}
