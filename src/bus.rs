/// Topic-based publish/subscribe message bus.
///
/// One bus instance is shared by every module. Publishing invokes each
/// subscriber synchronously on the caller's context, in subscription order.
/// Nothing is queued or replayed: a message published before a module
/// subscribes is never seen by it.
///
/// The subscription table sits behind a critical-section mutex. `publish`
/// copies the matching handlers out of the table and releases the lock
/// before dispatching, so handlers are free to subscribe, unsubscribe or
/// publish again; such changes apply from the next publish onwards.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::defaults::MAX_SUBSCRIPTIONS;

/// Receiver of bus messages.
///
/// A module implements this once and dispatches on `topic` internally.
/// Handlers run on the publisher's context and must return quickly.
pub trait Subscriber: Sync {
    fn on_message(&self, topic: &str, payload: &[u8]);
}

/// One live registration
#[derive(Clone, Copy)]
struct Subscription {
    topic: &'static str,
    subscriber_id: &'static str,
    handler: &'static dyn Subscriber,
}

type SubscriptionTable = Vec<Subscription, MAX_SUBSCRIPTIONS>;

/// Snapshot of the handlers for one topic, taken under the lock
type HandlerSnapshot = Vec<&'static dyn Subscriber, MAX_SUBSCRIPTIONS>;

pub struct MessageBus {
    table: Mutex<CriticalSectionRawMutex, RefCell<SubscriptionTable>>,
}

impl MessageBus {
    pub const fn new() -> Self {
        Self {
            table: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Register `handler` for `topic` under `subscriber_id`.
    ///
    /// Fails without side effects when `subscriber_id` already holds a
    /// subscription on `topic` or the table is full.
    pub fn subscribe(
        &self,
        topic: &'static str,
        subscriber_id: &'static str,
        handler: &'static dyn Subscriber,
    ) -> bool {
        let result = self.table.lock(|table| {
            let mut table = table.borrow_mut();
            if table
                .iter()
                .any(|s| s.topic == topic && s.subscriber_id == subscriber_id)
            {
                return Err("already subscribed");
            }
            table
                .push(Subscription {
                    topic,
                    subscriber_id,
                    handler,
                })
                .map_err(|_| "subscription table full")
        });

        match result {
            Ok(()) => {
                log::debug!("[Bus] {} subscribed to '{}'", subscriber_id, topic);
                true
            }
            Err(reason) => {
                log::warn!(
                    "[Bus] {} cannot subscribe to '{}': {}",
                    subscriber_id,
                    topic,
                    reason
                );
                false
            }
        }
    }

    /// Remove the registration of `subscriber_id` on `topic`.
    ///
    /// Returns `false` when there was nothing to remove; calling it twice is
    /// harmless.
    pub fn unsubscribe(&self, topic: &str, subscriber_id: &str) -> bool {
        let removed = self.table.lock(|table| {
            let mut table = table.borrow_mut();
            match table
                .iter()
                .position(|s| s.topic == topic && s.subscriber_id == subscriber_id)
            {
                Some(index) => {
                    // `remove` keeps the remaining subscribers in order.
                    table.remove(index);
                    true
                }
                None => false,
            }
        });

        if removed {
            log::debug!("[Bus] {} unsubscribed from '{}'", subscriber_id, topic);
        }
        removed
    }

    /// Deliver `payload` to every subscriber of `topic`.
    ///
    /// Returns `false` when nobody is subscribed. That is not an error;
    /// publishing to an empty topic simply has no effect.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> bool {
        let handlers: HandlerSnapshot = self.table.lock(|table| {
            table
                .borrow()
                .iter()
                .filter(|s| s.topic == topic)
                .map(|s| s.handler)
                .collect()
        });

        if handlers.is_empty() {
            return false;
        }

        for handler in &handlers {
            handler.on_message(topic, payload);
        }
        true
    }

    /// Number of live registrations on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.table
            .lock(|table| table.borrow().iter().filter(|s| s.topic == topic).count())
    }

    /// Whether `subscriber_id` currently holds a subscription on `topic`.
    pub fn is_subscribed(&self, topic: &str, subscriber_id: &str) -> bool {
        self.table.lock(|table| {
            table
                .borrow()
                .iter()
                .any(|s| s.topic == topic && s.subscriber_id == subscriber_id)
        })
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
