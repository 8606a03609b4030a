//! Advertiser notifications (fire-and-forget).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::services::metrics::record_side_effect_failure;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Notifier not enabled")]
    NotEnabled,

    #[error("Send error: {0}")]
    SendFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Sms,
    Email,
    InApp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub advertiser_id: String,
    pub channel: NotificationChannel,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError>;
    fn is_enabled(&self) -> bool;
}

/// Send a notification without letting the outcome affect the caller.
///
/// Returns whether delivery succeeded within `timeout`.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    notification: &Notification,
    timeout: Duration,
) -> bool {
    if !notifier.is_enabled() {
        return false;
    }

    match tokio::time::timeout(timeout, notifier.send(notification)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            record_side_effect_failure("notification");
            tracing::warn!(
                advertiser_id = %notification.advertiser_id,
                error = %e,
                "Notification failed"
            );
            false
        }
        Err(_) => {
            record_side_effect_failure("notification");
            tracing::warn!(
                advertiser_id = %notification.advertiser_id,
                timeout_ms = timeout.as_millis() as u64,
                "Notification timed out"
            );
            false
        }
    }
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier {
    enabled: bool,
}

impl LogNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        if !self.enabled {
            return Err(NotifierError::NotEnabled);
        }
        tracing::info!(
            advertiser_id = %notification.advertiser_id,
            channel = ?notification.channel,
            message = %notification.message,
            "Advertiser notification"
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Mock notifier for testing
pub struct MockNotifier {
    sent: Mutex<Vec<Notification>>,
    send_count: AtomicU64,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            send_count: AtomicU64::new(0),
            fail: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.delay.lock() {
            *guard = delay;
        }
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifierError::SendFailed("mock failure".to_string()));
        }

        self.send_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification {
            advertiser_id: "adv-1".to_string(),
            channel: NotificationChannel::Sms,
            message: "Your subscription has expired".to_string(),
        }
    }

    #[tokio::test]
    async fn delivered_notification_is_recorded() {
        let notifier = MockNotifier::new();
        assert!(notify_best_effort(&notifier, &notification(), Duration::from_secs(1)).await);
        assert_eq!(notifier.send_count(), 1);
        assert_eq!(notifier.sent()[0].advertiser_id, "adv-1");
    }

    #[tokio::test]
    async fn failure_is_swallowed() {
        let notifier = MockNotifier::new();
        notifier.set_failing(true);
        assert!(!notify_best_effort(&notifier, &notification(), Duration::from_secs(1)).await);
        assert_eq!(notifier.send_count(), 0);
    }

    #[tokio::test]
    async fn slow_notifier_times_out() {
        let notifier = MockNotifier::new();
        notifier.set_delay(Some(Duration::from_millis(500)));
        let delivered =
            notify_best_effort(&notifier, &notification(), Duration::from_millis(20)).await;
        assert!(!delivered);
        assert_eq!(notifier.send_count(), 0);
    }

    #[tokio::test]
    async fn disabled_notifier_is_skipped() {
        let notifier = LogNotifier::new(false);
        assert!(!notify_best_effort(&notifier, &notification(), Duration::from_secs(1)).await);
    }
}
