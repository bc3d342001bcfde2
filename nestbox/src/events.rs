// Copyright 2025 the Nestbox Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change notifications.
//!
//! The manager queues events while it resolves a change and flushes them once the change has
//! settled. Within one flush, hierarchy events (added, removed, parent changed) are delivered
//! before stacking events; both groups keep the order they were raised in. Each event goes to
//! every listener synchronously, in subscription order. A listener that returns an error or
//! panics is logged and skipped; the remaining listeners still receive the event.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::ListenerError;
use crate::region::{RegionId, Tier};

/// A discrete change collaborators may subscribe to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionEvent {
    /// A region was registered.
    Added(RegionId),
    /// A region was unregistered.
    Removed(RegionId),
    /// A region's resolved parent changed.
    ParentChanged {
        /// Region whose parent changed.
        region: RegionId,
        /// Previous parent.
        old: Option<RegionId>,
        /// New parent.
        new: Option<RegionId>,
    },
    /// A region moved within its tier's stacking sequence.
    StackingChanged {
        /// Region that moved.
        region: RegionId,
        /// Its tier.
        tier: Tier,
    },
}

impl RegionEvent {
    /// Whether this is a hierarchy event (delivered before stacking events).
    pub fn is_hierarchy(&self) -> bool {
        !matches!(self, Self::StackingChanged { .. })
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Boxed listener callback.
pub type Listener = Box<dyn FnMut(&RegionEvent) -> Result<(), ListenerError> + Send>;

/// Ordered listener list plus the queue of undelivered events.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    hierarchy: Vec<RegionEvent>,
    stacking: Vec<RegionEvent>,
    next_id: u64,
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("hierarchy", &self.hierarchy)
            .field("stacking", &self.stacking)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener after every existing one.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&RegionEvent) -> Result<(), ListenerError> + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Number of listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Queue an event for the next [`EventBus::flush`].
    pub fn push(&mut self, event: RegionEvent) {
        if event.is_hierarchy() {
            self.hierarchy.push(event);
        } else {
            self.stacking.push(event);
        }
    }

    /// Whether events are waiting to be delivered.
    pub fn has_pending(&self) -> bool {
        !self.hierarchy.is_empty() || !self.stacking.is_empty()
    }

    /// Deliver every queued event. Returns the number of listener failures.
    pub fn flush(&mut self) -> usize {
        let mut pending = core::mem::take(&mut self.hierarchy);
        pending.append(&mut self.stacking);
        let mut failures = 0;
        for event in &pending {
            for (id, listener) in &mut self.listeners {
                match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        failures += 1;
                        tracing::warn!(subscription = ?id, ?event, %err, "listener failed");
                    }
                    Err(_) => {
                        failures += 1;
                        tracing::warn!(subscription = ?id, ?event, "listener panicked");
                    }
                }
            }
        }
        failures
    }
}
