// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reconstruction scheduling and the collaborators a pass needs.
//!
//! Requests go through a [`ReconstructionQueue`]. A node is queued at most once, and a
//! request for the node currently being reconstructed is absorbed by that pass
//! instead of scheduling another one.

use crate::binding::{AssetReadiness, RecompileNotifier};
use crate::context::ContextPinSource;
use crate::node::NodeId;
use crate::runtime::NodeClassRegistry;
use crate::settings::GraphSettings;
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    /// No pass running
    #[default]
    Idle,
    /// A pass is running for this node
    Reconstructing(NodeId),
}

/// What happened to a reconstruction request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The node was added to the queue
    Queued,
    /// The node was already waiting
    AlreadyQueued,
    /// The node is being reconstructed right now; that pass covers the request
    Absorbed,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: IndexSet<NodeId>,
    state: ControllerState,
    absorbed: usize,
    absorbed_in_pass: bool,
}

/// Shared, coalescing queue of nodes awaiting reconstruction
#[derive(Debug, Clone, Default)]
pub struct ReconstructionQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl ReconstructionQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a node to be reconstructed
    pub fn request(&self, node: NodeId) -> RequestOutcome {
        let mut inner = self.inner.lock();
        if inner.state == ControllerState::Reconstructing(node) {
            inner.absorbed += 1;
            inner.absorbed_in_pass = true;
            tracing::debug!("Reconstruction of {node:?} coalesced into running pass");
            return RequestOutcome::Absorbed;
        }
        if inner.pending.insert(node) {
            RequestOutcome::Queued
        } else {
            RequestOutcome::AlreadyQueued
        }
    }

    /// Take the oldest pending node
    pub fn pop(&self) -> Option<NodeId> {
        self.inner.lock().pending.shift_remove_index(0)
    }

    /// Drop a node from the queue, as when it is removed from the graph
    pub fn cancel(&self, node: NodeId) -> bool {
        self.inner.lock().pending.shift_remove(&node)
    }

    /// Check if a node is waiting
    pub fn is_pending(&self, node: NodeId) -> bool {
        self.inner.lock().pending.contains(&node)
    }

    /// Number of waiting nodes
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Check if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    /// Current controller state
    pub fn state(&self) -> ControllerState {
        self.inner.lock().state
    }

    /// Requests absorbed by running passes so far
    pub fn absorbed(&self) -> usize {
        self.inner.lock().absorbed
    }

    /// Enter `Reconstructing` for `node`. A queued request for it is satisfied by this pass.
    pub(crate) fn begin(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        inner.pending.shift_remove(&node);
        inner.state = ControllerState::Reconstructing(node);
        inner.absorbed_in_pass = false;
    }

    /// Return to `Idle` if the pass for `node` is the running one. Returns true if
    /// requests were absorbed while it ran.
    pub(crate) fn finish(&self, node: NodeId) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ControllerState::Reconstructing(node) {
            tracing::warn!("Finished pass for {node:?} while {:?}", inner.state);
            return false;
        }
        inner.state = ControllerState::Idle;
        std::mem::take(&mut inner.absorbed_in_pass)
    }
}

/// Everything a node needs from its surroundings to rebuild its pins
#[derive(Default)]
pub struct EditorContext {
    /// Runtime node classes
    pub registry: NodeClassRegistry,
    /// Source of context pins, if any
    pub context_source: Option<Arc<dyn ContextPinSource>>,
    /// Process-wide asset readiness
    pub readiness: AssetReadiness,
    /// Class recompilation events
    pub notifier: RecompileNotifier,
    /// Pending reconstructions
    pub queue: ReconstructionQueue,
    /// Editor settings
    pub settings: GraphSettings,
}

impl EditorContext {
    /// Create a context around a class registry
    pub fn new(registry: NodeClassRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Set the context pin source
    pub fn with_context_source(mut self, source: Arc<dyn ContextPinSource>) -> Self {
        self.context_source = Some(source);
        self
    }

    /// Set the readiness gate
    pub fn with_readiness(mut self, readiness: AssetReadiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Set the editor settings
    pub fn with_settings(mut self, settings: GraphSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl fmt::Debug for EditorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorContext")
            .field("registry", &self.registry)
            .field("has_context_source", &self.context_source.is_some())
            .field("readiness", &self.readiness)
            .field("queue", &self.queue)
            .field("settings", &self.settings)
            .finish()
    }
}
