//! Notification Service
//!
//! Enriches, stores and pushes user notifications, with exponential-backoff
//! retries for recipients who are not connected.
//!
//! Every notification lands in the recipient's history (`notifications:<userId>`,
//! newest first, bounded) before delivery is attempted. When the recipient has
//! no live connection the `notification:new` payload also joins the offline
//! queue, so the paced replay pushes it on reconnect. Retries stop as soon as
//! either path has delivered it. Unread counts are cached next to the history.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::config::DeliverySettings;
use crate::domain::{
    CachedReason, Envelope, NewNotification, Notification, NotificationNewEvent, ServerEvent,
    UnreadCountEvent,
};
use crate::infrastructure::cache::{keys, TtlCache};
use crate::infrastructure::metrics;
use crate::presentation::websocket::ConnectionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Schedule backoff retries when the recipient is not reachable
    pub retry_on_failure: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            retry_on_failure: true,
        }
    }
}

/// How a retry sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Delivered { attempt: u32 },
    Abandoned { attempts: u32 },
}

#[derive(Debug)]
pub struct SendResult {
    pub notification: Notification,
    pub delivered: bool,
    /// Background retry sequence, when one was scheduled
    pub retry: Option<JoinHandle<RetryOutcome>>,
}

/// Per-recipient result of [`NotificationService::broadcast`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResult {
    pub user_id: String,
    pub notification_id: String,
    pub delivered: bool,
}

pub struct NotificationService {
    cache: Arc<TtlCache>,
    registry: Arc<ConnectionRegistry>,
    settings: DeliverySettings,
    /// (user_id, notification_id) -> retry attempts made so far
    attempts: DashMap<(String, String), u32>,
}

impl NotificationService {
    pub fn new(cache: Arc<TtlCache>, registry: Arc<ConnectionRegistry>, settings: DeliverySettings) -> Self {
        Self {
            cache,
            registry,
            settings,
            attempts: DashMap::new(),
        }
    }

    /// Enrich, store and push a notification to `user_id`.
    pub fn send(self: &Arc<Self>, user_id: &str, new: NewNotification, options: SendOptions) -> SendResult {
        let mut notification = Notification::enrich(user_id, new);
        self.store(&notification);

        let delivered = self.push(&notification);
        let mut queued_id = None;
        if delivered {
            notification.delivered = true;
            self.mark_delivered(user_id, &notification.id);
            self.push_unread_count(user_id);
            metrics::record_notification("delivered");
        } else {
            let envelope = new_notification_envelope(&notification);
            queued_id = Some(envelope.id.clone());
            self.registry
                .queue_offline(user_id, envelope, CachedReason::UserOffline);
            metrics::record_notification("pending");
        }

        tracing::info!(
            user_id = %user_id,
            notification_id = %notification.id,
            kind = ?notification.kind,
            delivered,
            "Notification sent"
        );

        let retry = match queued_id {
            Some(queued_id) if options.retry_on_failure => {
                Some(self.schedule_retry(notification.clone(), queued_id))
            }
            _ => None,
        };

        SendResult {
            notification,
            delivered,
            retry,
        }
    }

    /// Send the same notification to several users, one after another.
    ///
    /// Each recipient gets an independently enriched copy.
    pub fn broadcast(
        self: &Arc<Self>,
        user_ids: &[String],
        new: NewNotification,
        options: SendOptions,
    ) -> Vec<BroadcastResult> {
        user_ids
            .iter()
            .map(|user_id| {
                let result = self.send(user_id, new.clone(), options);
                BroadcastResult {
                    user_id: user_id.clone(),
                    notification_id: result.notification.id,
                    delivered: result.delivered,
                }
            })
            .collect()
    }

    /// Stored notifications of `user_id`, newest first
    pub fn history(&self, user_id: &str) -> Vec<Notification> {
        self.cache
            .get_as(&keys::notifications(user_id))
            .unwrap_or_default()
    }

    /// Mark the given notifications (or all when `ids` is `None`) as read.
    ///
    /// Returns how many changed state. The new unread count is pushed when
    /// anything changed.
    pub fn mark_as_read(&self, user_id: &str, ids: Option<&[String]>) -> usize {
        let now = Utc::now();
        let changed = self
            .update_history(user_id, |history| {
                let mut changed = 0;
                for notification in history.iter_mut() {
                    let selected = ids.map_or(true, |ids| ids.contains(&notification.id));
                    if selected && !notification.read {
                        notification.mark_read(now);
                        changed += 1;
                    }
                }
                changed
            })
            .unwrap_or(0);

        if changed > 0 {
            self.refresh_unread_count(user_id);
            self.push_unread_count(user_id);
            tracing::debug!(user_id = %user_id, changed, "Notifications marked read");
        }
        changed
    }

    pub fn unread_count(&self, user_id: &str) -> u64 {
        match self.cache.get_as::<u64>(&keys::unread_count(user_id)) {
            Some(count) => count,
            None => self.refresh_unread_count(user_id),
        }
    }

    /// Push `notification:unread_count` to the user's connections.
    pub fn push_unread_count(&self, user_id: &str) -> bool {
        if !self.registry.is_online(user_id) {
            return false;
        }
        let envelope = Envelope::new(ServerEvent::UnreadCount(UnreadCountEvent {
            count: self.unread_count(user_id),
            timestamp: Utc::now(),
        }));
        self.registry.send_to_user(user_id, &envelope) > 0
    }

    /// Retry attempts made so far for a notification still being retried.
    pub fn pending_retry_attempts(&self, user_id: &str, notification_id: &str) -> Option<u32> {
        self.attempts
            .get(&(user_id.to_string(), notification_id.to_string()))
            .map(|a| *a)
    }

    /// Notifications with a retry sequence in flight
    pub fn retries_in_flight(&self) -> usize {
        self.attempts.len()
    }

    fn store(&self, notification: &Notification) {
        let limit = self.settings.history_limit;
        let unread = self
            .cache
            .update_as(
                &keys::notifications(&notification.user_id),
                Some(self.settings.history_ttl()),
                |history: &mut Vec<Notification>| {
                    history.insert(0, notification.clone());
                    history.truncate(limit);
                    count_unread(history)
                },
            )
            .unwrap_or(0);
        self.cache.set_as(
            &keys::unread_count(&notification.user_id),
            &unread,
            Some(self.settings.history_ttl()),
        );
    }

    fn push(&self, notification: &Notification) -> bool {
        if !self.registry.is_online(&notification.user_id) {
            return false;
        }
        let envelope = new_notification_envelope(notification);
        self.registry.send_to_user(&notification.user_id, &envelope) > 0
    }

    fn mark_delivered(&self, user_id: &str, notification_id: &str) {
        self.update_history(user_id, |history| {
            if let Some(n) = history.iter_mut().find(|n| n.id == notification_id) {
                n.delivered = true;
            }
        });
    }

    fn refresh_unread_count(&self, user_id: &str) -> u64 {
        let count = count_unread(&self.history(user_id));
        self.cache.set_as(
            &keys::unread_count(user_id),
            &count,
            Some(self.settings.history_ttl()),
        );
        count
    }

    /// Modify an existing history; `None` when the user has none.
    fn update_history<R>(&self, user_id: &str, f: impl FnOnce(&mut Vec<Notification>) -> R) -> Option<R> {
        let key = keys::notifications(user_id);
        if !self.cache.contains(&key) {
            return None;
        }
        self.cache.update_as(&key, Some(self.settings.history_ttl()), f)
    }

    /// Retry `notification` while its payload `queued_id` waits in the offline queue.
    fn schedule_retry(self: &Arc<Self>, notification: Notification, queued_id: String) -> JoinHandle<RetryOutcome> {
        self.attempts.insert(attempt_key(&notification), 0);
        let service = Arc::clone(self);
        tokio::spawn(async move { service.retry(notification, queued_id).await })
    }

    async fn retry(&self, notification: Notification, queued_id: String) -> RetryOutcome {
        let key = attempt_key(&notification);
        let user_id = notification.user_id.as_str();
        let max_attempts = self.settings.max_retry_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            tokio::time::sleep(self.settings.retry_delay(attempt)).await;
            self.attempts.insert(key.clone(), attempt);

            let queued = self.registry.is_queued(user_id, &queued_id);
            let delivered = if !queued && self.registry.is_online(user_id) {
                // The offline replay got there first.
                true
            } else if queued && self.registry.replay_in_progress(user_id) {
                // The running replay will send it; pushing now would duplicate it.
                false
            } else if self.push(&notification) {
                if queued {
                    self.registry.remove_queued(user_id, &[queued_id.as_str()]);
                }
                true
            } else {
                false
            };

            if delivered {
                self.attempts.remove(&key);
                self.mark_delivered(user_id, &notification.id);
                self.push_unread_count(user_id);
                metrics::record_notification("retry_delivered");
                tracing::info!(
                    user_id = %user_id,
                    notification_id = %notification.id,
                    attempt,
                    "Notification delivered on retry"
                );
                return RetryOutcome::Delivered { attempt };
            }

            if attempt >= max_attempts {
                self.attempts.remove(&key);
                metrics::record_notification("abandoned");
                tracing::warn!(
                    user_id = %user_id,
                    notification_id = %notification.id,
                    attempts = attempt,
                    "Notification retries exhausted, left for offline replay"
                );
                return RetryOutcome::Abandoned { attempts: attempt };
            }

            tracing::debug!(
                notification_id = %notification.id,
                attempt,
                next_delay_ms = self.settings.retry_delay(attempt + 1).as_millis() as u64,
                "Notification retry failed"
            );
        }
    }
}

fn attempt_key(notification: &Notification) -> (String, String) {
    (notification.user_id.clone(), notification.id.clone())
}

fn new_notification_envelope(notification: &Notification) -> Envelope {
    let mut pushed = notification.clone();
    pushed.delivered = true;
    Envelope::new(ServerEvent::NotificationNew(NotificationNewEvent {
        notification: pushed,
        timestamp: Utc::now(),
    }))
}

fn count_unread(history: &[Notification]) -> u64 {
    history.iter().filter(|n| !n.read).count() as u64
}
