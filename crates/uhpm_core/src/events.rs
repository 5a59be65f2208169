//! In-process event bus for package lifecycle events.
//!
//! # Invariants
//! - Subscribers run synchronously in subscription order, outside the bus
//!   lock, so a callback may call back into the bus.
//! - History keeps at most `capacity` events, oldest dropped first.
//! - A poisoned lock never panics the publisher; the event is still logged.

use crate::logging::sanitize_message;
use crate::model::events::PackageEvent;
use log::info;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const DEFAULT_HISTORY_CAPACITY: usize = 256;
const MAX_LOGGED_ERROR_CHARS: usize = 200;

/// Receives package lifecycle events.
pub trait EventPublisher {
    fn publish(&self, event: PackageEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&PackageEvent) + Send + Sync>;

struct BusState {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback)>,
    history: VecDeque<PackageEvent>,
}

pub struct EventBus {
    capacity: usize,
    state: Mutex<BusState>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(BusState {
                next_id: 0,
                subscribers: Vec::new(),
                history: VecDeque::with_capacity(capacity),
            }),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&PackageEvent) + Send + Sync + 'static) -> SubscriptionId {
        let mut state = self.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(existing, _)| *existing != id);
        state.subscribers.len() != before
    }

    /// Up to `limit` most recent events, oldest first.
    pub fn history(&self, limit: usize) -> Vec<PackageEvent> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: PackageEvent) {
        log_event(&event);
        let callbacks: Vec<Callback> = self
            .lock()
            .subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in &callbacks {
            callback(&event);
        }
        if self.capacity == 0 {
            return;
        }
        let mut state = self.lock();
        if state.history.len() == self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(event);
    }
}

fn log_event(event: &PackageEvent) {
    match event {
        PackageEvent::InstallationFailed { package_ref, error } => info!(
            "event=package_event module=events status=error name={} package={} error={}",
            event.name(),
            package_ref,
            sanitize_message(error, MAX_LOGGED_ERROR_CHARS)
        ),
        PackageEvent::DownloadProgress { .. } => {}
        _ => info!(
            "event=package_event module=events status=ok name={} package={}",
            event.name(),
            event.package_ref()
        ),
    }
}
