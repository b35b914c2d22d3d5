// SPDX-License-Identifier: MIT OR Apache-2.0
//! External change channels a graph node binds to.
//!
//! - [`RecompileNotifier`] delivers class recompilation events to subscribed nodes.
//!   A [`Subscription`] unsubscribes when dropped.
//! - [`AssetReadiness`] is the process-wide "assets loaded" gate. Nodes loaded from
//!   disk defer reconstruction until it opens.

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};

/// Recompilation event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileEvent {
    /// The class with this ID is about to be replaced
    PreCompile(String),
    /// A compilation batch finished
    PostCompile,
}

#[derive(Debug, Default)]
struct NotifierInner {
    next_id: u64,
    inboxes: IndexMap<u64, Vec<CompileEvent>>,
}

/// Broadcasts recompilation events to every live subscription
#[derive(Debug, Clone, Default)]
pub struct RecompileNotifier {
    inner: Arc<Mutex<NotifierInner>>,
}

impl RecompileNotifier {
    /// Create a notifier with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new subscription
    pub fn subscribe(&self) -> Subscription {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.inboxes.insert(id, Vec::new());
        Subscription {
            id,
            notifier: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().inboxes.len()
    }

    /// Announce that a class is about to be recompiled
    pub fn notify_pre_compile(&self, class: &str) {
        self.broadcast(CompileEvent::PreCompile(class.to_string()));
    }

    /// Announce that compilation finished
    pub fn notify_post_compile(&self) {
        self.broadcast(CompileEvent::PostCompile);
    }

    fn broadcast(&self, event: CompileEvent) {
        let mut inner = self.inner.lock();
        for inbox in inner.inboxes.values_mut() {
            inbox.push(event.clone());
        }
    }
}

/// Registration with a [`RecompileNotifier`]; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    notifier: Weak<Mutex<NotifierInner>>,
}

impl Subscription {
    /// Take every event delivered since the last drain
    pub fn drain(&self) -> Vec<CompileEvent> {
        let Some(inner) = self.notifier.upgrade() else {
            return Vec::new();
        };
        let mut inner = inner.lock();
        inner
            .inboxes
            .get_mut(&self.id)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Check whether this subscription belongs to `notifier`
    pub fn is_from(&self, notifier: &RecompileNotifier) -> bool {
        std::ptr::eq(self.notifier.as_ptr(), Arc::as_ptr(&notifier.inner))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.notifier.upgrade() {
            inner.lock().inboxes.shift_remove(&self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[derive(Debug, Default)]
struct ReadinessState {
    loaded: bool,
    cycle: u64,
}

/// Process-wide "assets loaded" gate with an explicit load cycle
#[derive(Debug, Clone, Default)]
pub struct AssetReadiness {
    state: Arc<RwLock<ReadinessState>>,
}

impl AssetReadiness {
    /// Create a gate that is still waiting for assets
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gate that is already open
    pub fn loaded() -> Self {
        let readiness = Self::new();
        readiness.mark_loaded();
        readiness
    }

    /// Start a fresh load cycle, closing the gate
    pub fn begin_load(&self) {
        let mut state = self.state.write();
        state.loaded = false;
        state.cycle += 1;
    }

    /// Open the gate for the current cycle
    pub fn mark_loaded(&self) {
        self.state.write().loaded = true;
    }

    /// Whether assets finished loading
    pub fn is_loaded(&self) -> bool {
        self.state.read().loaded
    }

    /// Current load cycle
    pub fn cycle(&self) -> u64 {
        self.state.read().cycle
    }
}
