//! Unsolicited event fan-out.
//!
//! Events come from two producers: the reader task (modem-originated) and
//! override short-circuits (synthesized). Both go through [`EventBus::publish`]:
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ Reader task │────▶│              │     │ listener 1       │
//! │             │     │  FIFO queue  │────▶│ listener 2       │
//! │ Overrides   │────▶│  (1 drainer) │     │ ... (sub order)  │
//! └─────────────┘     └──────────────┘     └──────────────────┘
//! ```
//!
//! Whoever publishes into an idle bus becomes the drainer and delivers
//! until the queue is empty; concurrent publishers only enqueue. Events are
//! therefore delivered in publish order, one at a time, with no lock held
//! while a listener runs.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::info;

use super::messages::{EventType, UnsolicitedEvent};

/// Handle returned by [`EventBus::subscribe`].
pub type SubscriptionId = u64;

/// Receiver of unsolicited events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &UnsolicitedEvent);
}

impl<F> EventListener for F
where
    F: Fn(&UnsolicitedEvent) + Send + Sync,
{
    fn on_event(&self, event: &UnsolicitedEvent) {
        self(event);
    }
}

struct Subscription {
    id: SubscriptionId,
    event_type: EventType,
    listener: Arc<dyn EventListener>,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriptionId,
    subscriptions: Vec<Subscription>,
    queue: VecDeque<UnsolicitedEvent>,
    draining: bool,
}

/// Subscription registry plus ordered delivery queue.
pub struct EventBus {
    registry: Mutex<CriticalSectionRawMutex, RefCell<Registry>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(RefCell::new(Registry {
                next_id: 1,
                ..Registry::default()
            })),
        }
    }

    /// Register `listener` for `event_type`. Listeners of the same type
    /// are notified in the order they subscribed.
    pub fn subscribe(
        &self,
        event_type: EventType,
        listener: Arc<dyn EventListener>,
    ) -> SubscriptionId {
        self.registry.lock(|r| {
            let mut r = r.borrow_mut();
            let id = r.next_id;
            r.next_id += 1;
            r.subscriptions.push(Subscription {
                id,
                event_type,
                listener,
            });
            id
        })
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.lock(|r| {
            let mut r = r.borrow_mut();
            let before = r.subscriptions.len();
            r.subscriptions.retain(|s| s.id != id);
            r.subscriptions.len() != before
        })
    }

    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.registry.lock(|r| {
            r.borrow()
                .subscriptions
                .iter()
                .filter(|s| s.event_type == event_type)
                .count()
        })
    }

    /// Queue `event` for delivery, and deliver the queue if nobody else is.
    pub fn publish(&self, event: UnsolicitedEvent) {
        let become_drainer = self.registry.lock(|r| {
            let mut r = r.borrow_mut();
            r.queue.push_back(event);
            if r.draining {
                false
            } else {
                r.draining = true;
                true
            }
        });

        if become_drainer {
            self.drain();
        }
    }

    fn drain(&self) {
        let mut guard = DrainGuard {
            bus: self,
            armed: true,
        };
        loop {
            let next = self.registry.lock(|r| {
                let mut r = r.borrow_mut();
                match r.queue.pop_front() {
                    Some(event) => {
                        // Snapshot so listeners can (un)subscribe while being called.
                        let listeners: Vec<Arc<dyn EventListener>> = r
                            .subscriptions
                            .iter()
                            .filter(|s| s.event_type == event.event_type)
                            .map(|s| s.listener.clone())
                            .collect();
                        Some((event, listeners))
                    }
                    None => {
                        r.draining = false;
                        None
                    }
                }
            });

            let Some((event, listeners)) = next else {
                guard.armed = false;
                return;
            };
            for listener in listeners {
                listener.on_event(&event);
            }
        }
    }
}

/// Hands the drainer role back if a listener unwinds out of `drain`, so
/// later publishes still deliver what is left in the queue.
struct DrainGuard<'a> {
    bus: &'a EventBus,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.bus.registry.lock(|r| r.borrow_mut().draining = false);
        }
    }
}

/// Listener that writes every event it receives to the log.
pub struct LogListener;

impl LogListener {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogListener {
    fn default() -> Self {
        Self::new()
    }
}

impl EventListener for LogListener {
    fn on_event(&self, event: &UnsolicitedEvent) {
        match event.event_type {
            EventType::SubscriptionStatusChanged => {
                let enabled = event.payload.first().copied().unwrap_or(0) == 1;
                info!(
                    "UNSOL | subscription {}",
                    if enabled { "enabled" } else { "disabled" }
                );
            }
            EventType::RilConnected => {
                info!("UNSOL | modem connected ({} byte payload)", event.payload.len());
            }
            other => {
                info!(
                    "UNSOL | {:?} (code {}, {} bytes)",
                    other,
                    other.code(),
                    event.payload.len()
                );
            }
        }
    }
}
