/// Module lifecycle contract.
///
/// Every independently scheduled unit (transport bridge, sensor feed,
/// indicator, recorder) follows the same shape:
///
/// 1. `bind`: receive the shared [`MessageBus`] and platform [`Services`]
/// 2. `setup`: subscribe to every topic it needs, or fail leaving none
/// 3. `update`: periodic work at `period_ms`, on the module's own context
/// 4. `teardown`: release every subscription it made
///
/// Modules live for the whole program (`'static`), so the bus can hold
/// plain references to them.
use crate::bus::{MessageBus, Subscriber};

/// Platform services a module may use: a monotonic clock and a blocking
/// delay. Both must be callable from any context.
pub trait Services: Sync {
    /// Milliseconds since boot (wraps after ~49 days)
    fn uptime_ms(&self) -> u32;

    /// Block the calling context for `ms` milliseconds
    fn delay_ms(&self, ms: u32);
}

pub trait Module: Sync {
    /// Subscriber identity on the bus and prefix in log lines
    fn name(&self) -> &'static str;

    /// Update period requested from the scheduler
    fn period_ms(&self) -> u32;

    /// Attach collaborators. Must happen before `setup`.
    fn bind(&mut self, bus: &'static MessageBus, services: &'static dyn Services);

    /// Subscribe to all required topics. Returns `false` if a collaborator
    /// is missing or any subscription fails; no subscription is left behind
    /// in that case.
    fn setup(&'static self) -> bool;

    /// One periodic step. Must not block beyond one period.
    fn update(&self);

    /// Release every subscription made by `setup`. Safe to call repeatedly.
    fn teardown(&self);
}

/// Subscribe `handler` to every topic in `topics`, all-or-nothing.
///
/// On the first failure the topics already subscribed are released again
/// and `false` is returned.
pub fn subscribe_all(
    bus: &MessageBus,
    subscriber_id: &'static str,
    topics: &[&'static str],
    handler: &'static dyn Subscriber,
) -> bool {
    for (index, &topic) in topics.iter().enumerate() {
        if !bus.subscribe(topic, subscriber_id, handler) {
            log::error!("[{}] Failed to subscribe to {}", subscriber_id, topic);
            for &done in &topics[..index] {
                bus.unsubscribe(done, subscriber_id);
            }
            return false;
        }
    }
    true
}

/// Release `subscriber_id`'s registration on every topic in `topics`.
pub fn unsubscribe_all(bus: &MessageBus, subscriber_id: &str, topics: &[&str]) {
    for &topic in topics {
        bus.unsubscribe(topic, subscriber_id);
    }
}
