//! Local notification list fed by `notification` and `announcement` events.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::adapters::events::Subscription;
use crate::application::connection::TransportConnection;
use crate::domain::foundation::{ConsumerId, Timestamp};
use crate::domain::realtime::events::names;
use crate::domain::realtime::{
    BoundedHistoryBuffer, InboundEvent, Notification, NOTIFICATION_HISTORY_CAPACITY,
};

use super::ConsumerAdapter;

/// Notifications received within this window count as unread.
pub const UNREAD_WINDOW: Duration = Duration::from_secs(5);

struct TrayInner {
    id: ConsumerId,
    items: Mutex<BoundedHistoryBuffer<Notification>>,
    subscriptions: Mutex<Vec<Subscription>>,
    torn_down: AtomicBool,
}

impl TrayInner {
    fn items(&self) -> MutexGuard<'_, BoundedHistoryBuffer<Notification>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscriptions = mem::take(&mut *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()));
        drop(subscriptions);
        tracing::debug!(consumer_id = %self.id, "Notification tray torn down");
    }
}

/// Notification center view.
///
/// Dismissing or clearing only affects this tray, never the connection's
/// shared history or other trays.
pub struct NotificationTray {
    inner: Arc<TrayInner>,
}

impl NotificationTray {
    pub fn mount(connection: &TransportConnection) -> Self {
        Self::with_capacity(connection, NOTIFICATION_HISTORY_CAPACITY)
    }

    pub fn with_capacity(connection: &TransportConnection, capacity: usize) -> Self {
        let inner = Arc::new(TrayInner {
            id: ConsumerId::new(),
            items: Mutex::new(BoundedHistoryBuffer::new(capacity)),
            subscriptions: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
        });

        let subscriptions = [names::NOTIFICATION, names::ANNOUNCEMENT]
            .into_iter()
            .map(|event_name| {
                let weak = Arc::downgrade(&inner);
                connection.on(event_name, move |event| {
                    let Some(inner) = weak.upgrade() else {
                        return Ok(());
                    };
                    let notification = match event {
                        InboundEvent::Notification(n) => n.clone(),
                        InboundEvent::Announcement(a) => a.clone().into(),
                        _ => return Ok(()),
                    };
                    inner.items().push(notification);
                    Ok(())
                })
            })
            .collect();
        *inner.subscriptions.lock().unwrap_or_else(|e| e.into_inner()) = subscriptions;

        tracing::debug!(consumer_id = %inner.id, capacity, "Notification tray mounted");
        Self { inner }
    }

    /// Most recent first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.items().snapshot(|_| true)
    }

    pub fn latest(&self) -> Option<Notification> {
        self.inner.items().latest(|_| true).cloned()
    }

    /// Notifications that arrived within [`UNREAD_WINDOW`] of `now`.
    pub fn unread_count(&self, now: &Timestamp) -> usize {
        self.inner
            .items()
            .entries()
            .filter(|entry| entry.inserted_at.is_within(UNREAD_WINDOW, now))
            .count()
    }

    /// Remove the notification at `index` (0 = most recent).
    pub fn dismiss(&self, index: usize) -> Option<Notification> {
        self.inner.items().remove(index)
    }

    pub fn clear(&self) {
        self.inner.items().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items().is_empty()
    }
}

impl ConsumerAdapter for NotificationTray {
    fn consumer_id(&self) -> ConsumerId {
        self.inner.id
    }

    fn teardown(&self) {
        self.inner.teardown();
    }

    fn is_active(&self) -> bool {
        !self.inner.torn_down.load(Ordering::SeqCst)
    }
}

impl Drop for NotificationTray {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}
