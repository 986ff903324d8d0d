//! Notification fan-out with delivery-synchronized unsubscribe.
//!
//! # Invariants
//! - Delivery holds the hub lock for the whole fan-out; an unsubscribe from
//!   another thread waits for it, so a detached handler is never called
//!   afterwards.
//! - The lock is reentrant and handlers are invoked with no registry borrow
//!   outstanding, so a handler may subscribe, unsubscribe or notify.
//! - A subscription cancelled mid-fan-out is skipped for the rest of it.

use super::allow_list::Notification;
use log::debug;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Handler = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    id: u64,
    notification: Notification,
    handler: Handler,
    active: Arc<AtomicBool>,
}

#[derive(Default)]
struct HubInner {
    entries: ReentrantMutex<RefCell<Vec<Entry>>>,
    next_id: AtomicU64,
}

/// Registry of notification subscribers.
#[derive(Default, Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `notification`.
    pub fn subscribe(
        &self,
        notification: Notification,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        {
            let guard = self.inner.entries.lock();
            guard.borrow_mut().push(Entry {
                id,
                notification,
                handler: Arc::new(handler),
                active: active.clone(),
            });
        }
        debug!(
            "event=notification_subscribe module=channel status=ok notification={} subscription={}",
            notification.as_str(),
            id
        );
        Subscription {
            hub: Arc::downgrade(&self.inner),
            id,
            notification,
            active,
        }
    }

    /// Delivers `notification` to current subscribers in subscription order.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, notification: Notification) -> usize {
        let guard = self.inner.entries.lock();
        let targets = guard
            .borrow()
            .iter()
            .filter(|entry| entry.notification == notification)
            .map(|entry| (entry.handler.clone(), entry.active.clone()))
            .collect::<Vec<_>>();

        let mut delivered = 0;
        for (handler, active) in targets {
            if active.load(Ordering::SeqCst) {
                handler();
                delivered += 1;
            }
        }
        drop(guard);

        debug!(
            "event=notification_emit module=channel status=ok notification={} delivered={}",
            notification.as_str(),
            delivered
        );
        delivered
    }

    /// Number of live subscriptions for `notification`.
    pub fn subscriber_count(&self, notification: Notification) -> usize {
        let guard = self.inner.entries.lock();
        let count = guard
            .borrow()
            .iter()
            .filter(|entry| entry.notification == notification)
            .count();
        count
    }
}

/// Handle returned by `subscribe`; unsubscribes on `unsubscribe()` or drop.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    hub: Weak<HubInner>,
    id: u64,
    notification: Notification,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn notification(&self) -> Notification {
        self.notification
    }

    /// Detaches the handler. No delivery reaches it after this returns.
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn detach(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.hub.upgrade() {
            let guard = inner.entries.lock();
            guard.borrow_mut().retain(|entry| entry.id != self.id);
        }
        debug!(
            "event=notification_unsubscribe module=channel status=ok notification={} subscription={}",
            self.notification.as_str(),
            self.id
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::NotificationHub;
    use crate::channel::allow_list::Notification;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn delivers_only_to_matching_subscribers() {
        let hub = NotificationHub::new();
        let saves = Arc::new(AtomicUsize::new(0));
        let counter = saves.clone();
        let _save = hub.subscribe(Notification::SaveRequested, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(hub.emit(Notification::NewDocumentRequested), 0);
        assert_eq!(hub.emit(Notification::SaveRequested), 1);
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hub = NotificationHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let subscription = hub.subscribe(Notification::SaveRequested, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        hub.emit(Notification::SaveRequested);
        subscription.unsubscribe();
        hub.emit(Notification::SaveRequested);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(Notification::SaveRequested), 0);
    }

    #[test]
    fn handler_can_cancel_a_later_subscriber_mid_delivery() {
        let hub = NotificationHub::new();
        let later_hits = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<super::Subscription>>> = Arc::new(Mutex::new(None));

        let cancel_slot = slot.clone();
        let _first = hub.subscribe(Notification::NewDocumentRequested, move || {
            if let Some(subscription) = cancel_slot.lock().take() {
                subscription.unsubscribe();
            }
        });
        let counter = later_hits.clone();
        *slot.lock() = Some(hub.subscribe(Notification::NewDocumentRequested, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(hub.emit(Notification::NewDocumentRequested), 1);
        assert_eq!(later_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_from_other_thread_waits_for_inflight_delivery() {
        let hub = NotificationHub::new();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let finished = Arc::new(AtomicUsize::new(0));
        let done = finished.clone();
        let subscription = hub.subscribe(Notification::SaveRequested, move || {
            let _ = entered_tx.send(());
            std::thread::sleep(std::time::Duration::from_millis(50));
            done.fetch_add(1, Ordering::SeqCst);
        });

        let emitter = {
            let hub = hub.clone();
            std::thread::spawn(move || hub.emit(Notification::SaveRequested))
        };
        entered_rx.recv().expect("handler should start");
        subscription.unsubscribe();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.join().expect("emitter thread"), 1);
        assert_eq!(hub.emit(Notification::SaveRequested), 0);
    }
}
