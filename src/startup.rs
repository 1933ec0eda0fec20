//! Application Startup
//!
//! Composition root: builds the shared cache and the delivery services, then
//! the HTTP/WebSocket server around them.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::application::services::{
    CacheAdminService, NotificationService, PresenceService, RouteDeferralService,
};
use crate::config::Settings;
use crate::domain::ConversationStore;
use crate::infrastructure::cache::TtlCache;
use crate::infrastructure::database;
use crate::infrastructure::repositories::PgConversationStore;
use crate::presentation::http::{handlers, routes};
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::ConnectionRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cache: Arc<TtlCache>,
    pub registry: Arc<ConnectionRegistry>,
    pub presence: Arc<PresenceService>,
    pub deferral: Arc<RouteDeferralService>,
    pub notifications: Arc<NotificationService>,
    pub cache_admin: Arc<CacheAdminService>,
    pub conversations: Arc<dyn ConversationStore>,
}

impl AppState {
    /// Wire every component around one cache instance.
    pub fn new(settings: Settings, conversations: Arc<dyn ConversationStore>) -> Self {
        let cache = Arc::new(TtlCache::new(&settings.cache));
        let registry = Arc::new(ConnectionRegistry::new(
            cache.clone(),
            settings.delivery.clone(),
        ));
        let presence = Arc::new(PresenceService::new(
            cache.clone(),
            registry.clone(),
            conversations.clone(),
            settings.presence.clone(),
        ));
        let deferral = Arc::new(RouteDeferralService::new(
            cache.clone(),
            registry.clone(),
            settings.routes.clone(),
        ));
        let notifications = Arc::new(NotificationService::new(
            cache.clone(),
            registry.clone(),
            settings.delivery.clone(),
        ));
        let cache_admin = Arc::new(CacheAdminService::new(cache.clone(), deferral.clone()));

        Self {
            settings: Arc::new(settings),
            cache,
            registry,
            presence,
            deferral,
            notifications,
            cache_admin,
            conversations,
        }
    }

    /// Start the periodic cache sweep.
    pub fn spawn_background_tasks(&self) -> JoinHandle<()> {
        self.cache
            .spawn_sweeper(self.settings.cache.sweep_interval())
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    _sweeper: JoinHandle<()>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        handlers::health::init_server_start();

        // Create database pool
        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");
        let conversations: Arc<dyn ConversationStore> = Arc::new(PgConversationStore::new(db));

        let cors_layer = cors::create_cors_layer(&settings.cors);
        let addr: SocketAddr = settings.server_addr().parse()?;

        let state = AppState::new(settings, conversations);
        let sweeper = state.spawn_background_tasks();

        // Build router with middleware
        let router = routes::create_router(state)
            .layer(logging::create_trace_layer())
            .layer(cors_layer);

        // Bind to address
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            _sweeper: sweeper,
        })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
