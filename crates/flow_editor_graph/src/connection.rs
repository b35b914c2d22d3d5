// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the graph.

use crate::node::NodeId;
use crate::pin::PinId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference to one pin on one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinRef {
    /// Owning node
    pub node: NodeId,
    /// Pin on that node
    pub pin: PinId,
}

impl PinRef {
    /// Create a new pin reference
    pub fn new(node: NodeId, pin: PinId) -> Self {
        Self { node, pin }
    }
}

/// A link from an output pin to an input pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Output end
    pub from: PinRef,
    /// Input end
    pub to: PinRef,
}

impl Connection {
    /// Create a new connection
    pub fn new(from: PinRef, to: PinRef) -> Self {
        Self {
            id: ConnectionId::new(),
            from,
            to,
        }
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from.node == node_id || self.to.node == node_id
    }

    /// Check if this connection involves a specific pin
    pub fn involves_pin(&self, pin: PinRef) -> bool {
        self.from == pin || self.to == pin
    }

    /// The end opposite to `pin`, if `pin` is one of the ends
    pub fn other_end(&self, pin: PinRef) -> Option<PinRef> {
        if self.from == pin {
            Some(self.to)
        } else if self.to == pin {
            Some(self.from)
        } else {
            None
        }
    }

    /// Replace every end that refers to `old` with `new`
    pub fn repoint(&mut self, old: PinRef, new: PinRef) {
        if self.from == old {
            self.from = new;
        }
        if self.to == old {
            self.to = new;
        }
    }
}
