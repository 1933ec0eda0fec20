//! Route context value objects.
//!
//! A client reports the route it is currently showing; a route is "in
//! context" when conversation events for the user would be seen live there.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Fixed membership test against known route prefixes.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    prefixes: Vec<String>,
}

impl RouteClassifier {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .map(|p: String| p.trim_end_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether `route` is, or is nested under, one of the known prefixes.
    ///
    /// Query strings and fragments are ignored; matching is per path segment
    /// so `/chatter` does not match `/chat`.
    pub fn is_relevant(&self, route: &str) -> bool {
        let path = route
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');

        self.prefixes.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Last navigation context reported by a user.
#[derive(Debug, Clone)]
pub struct RouteStatus {
    pub current_route: String,
    pub is_in_relevant_context: bool,
    pub last_activity: Instant,
    pub reported_at: DateTime<Utc>,
}

impl RouteStatus {
    pub fn new(route: impl Into<String>, is_in_relevant_context: bool) -> Self {
        Self {
            current_route: route.into(),
            is_in_relevant_context,
            last_activity: Instant::now(),
            reported_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self, window: Duration) -> bool {
        self.last_activity.elapsed() <= window
    }

    /// In context only while the report is still fresh.
    pub fn is_in_context(&self, window: Duration) -> bool {
        self.is_in_relevant_context && self.is_fresh(window)
    }

    pub fn snapshot(&self, window: Duration) -> RouteStatusView {
        RouteStatusView {
            current_route: self.current_route.clone(),
            is_in_relevant_context: self.is_in_relevant_context,
            is_fresh: self.is_fresh(window),
            last_activity: self.reported_at,
        }
    }
}

/// Serializable view of a [`RouteStatus`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatusView {
    pub current_route: String,
    pub is_in_relevant_context: bool,
    pub is_fresh: bool,
    pub last_activity: DateTime<Utc>,
}
