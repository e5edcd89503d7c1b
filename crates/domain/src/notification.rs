//! Notification dispatcher interface and implementations.
//!
//! Dispatch is fire-and-forget: the order services call it after a commit
//! and only log a failure.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{TransactionId, TransactionStatus, UserId};
use serde::Serialize;
use thiserror::Error;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A buyer made an offer on one of the recipient's items.
    OrderRequested,
    /// An order the recipient is part of changed status.
    OrderStatusChanged,
}

/// A message addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub message: String,
}

#[derive(Debug, Error)]
#[error("notification dispatch failed: {0}")]
pub struct DispatchError(pub String);

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: Notification) -> Result<(), DispatchError>;
}

/// Dispatcher that writes notifications to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingNotificationDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<(), DispatchError> {
        tracing::info!(
            recipient = %notification.recipient,
            kind = ?notification.kind,
            transaction_id = %notification.transaction_id,
            "{}",
            notification.message
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryDispatcherState {
    sent: Vec<Notification>,
    fail_on_dispatch: bool,
}

/// In-memory dispatcher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationDispatcher {
    state: Arc<Mutex<InMemoryDispatcherState>>,
}

impl InMemoryNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the dispatcher to fail every dispatch call.
    pub fn set_fail_on_dispatch(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_on_dispatch = fail;
        }
    }

    /// Returns everything dispatched so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.state
            .lock()
            .map(|state| state.sent.clone())
            .unwrap_or_default()
    }

    /// Returns the notifications addressed to one user.
    pub fn sent_to(&self, user_id: UserId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient == user_id)
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<(), DispatchError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| DispatchError(e.to_string()))?;

        if state.fail_on_dispatch {
            return Err(DispatchError("mail server unavailable".to_string()));
        }

        state.sent.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(recipient: UserId) -> Notification {
        Notification {
            recipient,
            kind: NotificationKind::OrderRequested,
            transaction_id: TransactionId::new(),
            status: TransactionStatus::Requested,
            message: "New offer on your item".to_string(),
        }
    }

    #[tokio::test]
    async fn records_dispatched_notifications() {
        let dispatcher = InMemoryNotificationDispatcher::new();
        let seller = UserId::new();

        dispatcher.dispatch(notification(seller)).await.unwrap();
        dispatcher.dispatch(notification(UserId::new())).await.unwrap();

        assert_eq!(dispatcher.sent().len(), 2);
        assert_eq!(dispatcher.sent_to(seller).len(), 1);
    }

    #[tokio::test]
    async fn can_be_told_to_fail() {
        let dispatcher = InMemoryNotificationDispatcher::new();
        dispatcher.set_fail_on_dispatch(true);

        assert!(dispatcher.dispatch(notification(UserId::new())).await.is_err());
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn tracing_dispatcher_never_fails() {
        let dispatcher = TracingNotificationDispatcher;
        assert!(dispatcher.dispatch(notification(UserId::new())).await.is_ok());
    }
}
