//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active push connections gauge
//! - Notification delivery outcomes
//! - Offline replay outcomes
//! - Deferred conversation events by type
//! - Cache evictions

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Live push connections across all users
pub static CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("connections_active", "Number of live push connections")
            .namespace("marketplace_realtime"),
    )
    .expect("Failed to create CONNECTIONS_ACTIVE metric")
});

/// Notification outcomes: delivered, pending, retry_delivered, abandoned
pub static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("notifications_total", "Notification delivery outcomes")
            .namespace("marketplace_realtime"),
        &["outcome"],
    )
    .expect("Failed to create NOTIFICATIONS_TOTAL metric")
});

/// Offline replay outcomes: completed, interrupted
pub static REPLAYS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("offline_replays_total", "Offline queue replay outcomes")
            .namespace("marketplace_realtime"),
        &["outcome"],
    )
    .expect("Failed to create REPLAYS_TOTAL metric")
});

/// Conversation events held back by route-aware deferral
pub static DEFERRED_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deferred_events_total", "Conversation events queued for later delivery")
            .namespace("marketplace_realtime"),
        &["event_type"],
    )
    .expect("Failed to create DEFERRED_EVENTS_TOTAL metric")
});

/// Entries dropped by bulk cache eviction
pub static CACHE_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("cache_evictions_total", "Cache entries evicted to admit new keys")
            .namespace("marketplace_realtime"),
    )
    .expect("Failed to create CACHE_EVICTIONS_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(NOTIFICATIONS_TOTAL.clone()))
        .expect("Failed to register NOTIFICATIONS_TOTAL");
    registry
        .register(Box::new(REPLAYS_TOTAL.clone()))
        .expect("Failed to register REPLAYS_TOTAL");
    registry
        .register(Box::new(DEFERRED_EVENTS_TOTAL.clone()))
        .expect("Failed to register DEFERRED_EVENTS_TOTAL");
    registry
        .register(Box::new(CACHE_EVICTIONS_TOTAL.clone()))
        .expect("Failed to register CACHE_EVICTIONS_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn set_active_connections(count: usize) {
    CONNECTIONS_ACTIVE.set(count as i64);
}

pub fn record_notification(outcome: &str) {
    NOTIFICATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_replay(outcome: &str) {
    REPLAYS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_deferred_event(event_type: &str) {
    DEFERRED_EVENTS_TOTAL.with_label_values(&[event_type]).inc();
}

pub fn record_cache_evictions(count: usize) {
    CACHE_EVICTIONS_TOTAL.inc_by(count as u64);
}
