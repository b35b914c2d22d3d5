// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flow graph: nodes, the links between their pins, and graph-wide passes.
//!
//! Links live here, not on nodes. When a node rebuilds its pins the graph follows
//! the returned [`PinChanges`]: links on carried pins are repointed, links on
//! orphaned pins are severed and handed back to the caller.

use crate::connection::{Connection, ConnectionId, PinRef};
use crate::node::{FlowGraphNode, NodeId, NodeSnapshot, PinChanges};
use crate::pin::{Pin, PinDirection, PinId};
use crate::reconstruction::{EditorContext, RequestOutcome};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Offset applied to duplicated nodes so they do not hide the originals
pub const DUPLICATE_OFFSET: [f32; 2] = [30.0, 30.0];

/// A flow graph
#[derive(Debug, Serialize, Deserialize)]
pub struct FlowGraph {
    /// Graph name
    pub name: String,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, FlowGraphNode>,
    /// Links between pins
    connections: IndexMap<ConnectionId, Connection>,
}

impl FlowGraph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
        }
    }

    /// Add a node as is, without binding or reconstructing it
    pub fn add_node(&mut self, node: FlowGraphNode) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Add a node the user just placed: subscribe it and build its pins
    pub fn add_placed_node(&mut self, ctx: &EditorContext, mut node: FlowGraphNode) -> NodeId {
        node.post_placed_new_node(ctx);
        self.add_node(node)
    }

    /// Remove a node and every link touching it
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<FlowGraphNode> {
        self.connections.retain(|_, c| !c.involves_node(node_id));
        self.nodes.shift_remove(&node_id)
    }

    /// Remove a node on user request. Refused for classes that cannot be deleted.
    pub fn delete_node(&mut self, ctx: &EditorContext, node_id: NodeId) -> Option<FlowGraphNode> {
        if !self.node(node_id)?.can_user_delete_node(ctx) {
            tracing::warn!("Node {node_id:?} cannot be deleted");
            return None;
        }
        ctx.queue.cancel(node_id);
        let mut node = self.remove_node(node_id)?;
        node.unbind();
        Some(node)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&FlowGraphNode> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut FlowGraphNode> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &FlowGraphNode> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Resolve a pin reference
    pub fn pin(&self, pin: PinRef) -> Option<&Pin> {
        self.nodes.get(&pin.node)?.pin(pin.pin)
    }

    fn pin_checked(&self, pin: PinRef) -> Result<&Pin, ConnectionError> {
        self.nodes
            .get(&pin.node)
            .ok_or(ConnectionError::NodeNotFound(pin.node))?
            .pin(pin.pin)
            .ok_or(ConnectionError::PinNotFound(pin.pin))
    }

    // ---------------------------------------------------------------------
    // Links

    /// Link two pins, in either order. Outputs take one link, inputs any number.
    pub fn connect(&mut self, a: PinRef, b: PinRef) -> Result<ConnectionId, ConnectionError> {
        let pin_a = self.pin_checked(a)?;
        let pin_b = self.pin_checked(b)?;

        if a.node == b.node {
            return Err(ConnectionError::SelfLoop);
        }
        if pin_a.direction == pin_b.direction {
            return Err(ConnectionError::SameDirection);
        }
        if !pin_a.can_link(pin_b) {
            return Err(ConnectionError::IncompatibleCategories);
        }

        let (from, to) = if pin_a.direction == PinDirection::Output {
            (a, b)
        } else {
            (b, a)
        };
        if self.connections.values().any(|c| c.from == from && c.to == to) {
            return Err(ConnectionError::AlreadyConnected);
        }
        if self.is_linked(from) {
            return Err(ConnectionError::OutputAlreadyLinked(from.pin));
        }

        let connection = Connection::new(from, to);
        let id = connection.id;
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Remove a link
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        self.connections.shift_remove(&connection_id)
    }

    /// Remove every link on a pin
    pub fn break_pin_links(&mut self, pin: PinRef) -> Vec<Connection> {
        let ids: Vec<ConnectionId> = self.links_of(pin).map(|c| c.id).collect();
        ids.iter().filter_map(|id| self.connections.shift_remove(id)).collect()
    }

    /// Get a link by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all links
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Links on one pin
    pub fn links_of(&self, pin: PinRef) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.involves_pin(pin))
    }

    /// Pins linked to `pin`
    pub fn linked_pins(&self, pin: PinRef) -> Vec<PinRef> {
        self.links_of(pin).filter_map(|c| c.other_end(pin)).collect()
    }

    /// Check if a pin has any link
    pub fn is_linked(&self, pin: PinRef) -> bool {
        self.links_of(pin).next().is_some()
    }

    /// Links touching a node
    pub fn connections_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.involves_node(node_id))
    }

    /// Get the number of links
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Make links follow a node's rebuilt pins. Returns the severed links.
    pub fn apply_pin_changes(&mut self, node_id: NodeId, changes: &PinChanges) -> Vec<Connection> {
        let orphaned: HashSet<PinId> = changes.orphaned.iter().map(|p| p.id).collect();
        let severed_ids: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| {
                [c.from, c.to]
                    .iter()
                    .any(|end| end.node == node_id && orphaned.contains(&end.pin))
            })
            .map(|c| c.id)
            .collect();
        let severed: Vec<Connection> = severed_ids
            .iter()
            .filter_map(|id| self.connections.shift_remove(id))
            .collect();

        for connection in self.connections.values_mut() {
            for end in [connection.from, connection.to] {
                if end.node != node_id {
                    continue;
                }
                if let Some(new_pin) = changes.remap.get(&end.pin) {
                    connection.repoint(end, PinRef::new(node_id, *new_pin));
                }
            }
        }

        if !severed.is_empty() {
            tracing::warn!(
                "Severed {} link(s) on node {node_id:?} after its pins changed",
                severed.len()
            );
        }
        severed
    }

    // ---------------------------------------------------------------------
    // Reconstruction

    /// Rebuild one node's pins now. Returns the severed links.
    pub fn reconstruct_node(
        &mut self,
        ctx: &EditorContext,
        node_id: NodeId,
    ) -> Option<Vec<Connection>> {
        let changes = self.nodes.get_mut(&node_id)?.reconstruct(ctx);
        Some(self.apply_pin_changes(node_id, &changes))
    }

    /// Rebuild every node. A node that fails to bind degrades on its own.
    pub fn reconstruct_all(&mut self, ctx: &EditorContext) -> ReconstructionReport {
        let mut report = ReconstructionReport::default();
        let ids: Vec<NodeId> = self.node_ids().collect();
        for node_id in ids {
            if let Some(severed) = self.reconstruct_node(ctx, node_id) {
                report.record(node_id, severed);
            }
        }
        report
    }

    /// Schedule a full reconstruction of a node
    pub fn request_reconstruction(
        &mut self,
        ctx: &EditorContext,
        node_id: NodeId,
    ) -> RequestOutcome {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_needs_full_reconstruction();
        }
        ctx.queue.request(node_id)
    }

    /// Run one pass per queued node. Nothing runs until assets are loaded; the
    /// requests stay queued.
    pub fn flush_reconstructions(&mut self, ctx: &EditorContext) -> ReconstructionReport {
        let mut report = ReconstructionReport::default();
        if !ctx.readiness.is_loaded() {
            tracing::debug!("Assets not loaded, {} reconstruction(s) deferred", ctx.queue.len());
            return report;
        }
        while let Some(node_id) = ctx.queue.pop() {
            if let Some(severed) = self.reconstruct_node(ctx, node_id) {
                report.record(node_id, severed);
            }
        }
        report
    }

    /// Drain recompilation events of every node, then rebuild affected nodes
    /// if assets are loaded.
    pub fn process_external_changes(&mut self, ctx: &EditorContext) -> ReconstructionReport {
        for node in self.nodes.values_mut() {
            if node.process_external_changes() {
                ctx.queue.request(node.id);
            }
        }
        self.flush_reconstructions(ctx)
    }

    /// The graph was loaded from disk. Nodes bind and rebuild, or wait for assets.
    pub fn post_load(&mut self, ctx: &EditorContext) -> ReconstructionReport {
        let mut report = ReconstructionReport::default();
        let ids: Vec<NodeId> = self.node_ids().collect();
        for node_id in ids {
            let changes = self.nodes.get_mut(&node_id).and_then(|n| n.post_load(ctx));
            if let Some(changes) = changes {
                let severed = self.apply_pin_changes(node_id, &changes);
                report.record(node_id, severed);
            }
        }
        report
    }

    /// Open the readiness gate and rebuild every node that waited for it
    pub fn on_assets_loaded(&mut self, ctx: &EditorContext) -> ReconstructionReport {
        ctx.readiness.mark_loaded();
        for node in self.nodes.values() {
            if node.needs_full_reconstruction() {
                ctx.queue.request(node.id);
            }
        }
        let report = self.flush_reconstructions(ctx);
        tracing::info!(
            "Assets loaded, reconstructed {} node(s) in {}",
            report.passes(),
            self.name
        );
        report
    }

    // ---------------------------------------------------------------------
    // Pin operations that affect links

    /// Remove a stale pin and its links
    pub fn remove_orphaned_pin(&mut self, pin: PinRef) -> Option<Vec<Connection>> {
        self.nodes.get_mut(&pin.node)?.remove_orphaned_pin(pin.pin)?;
        Some(self.break_pin_links(pin))
    }

    /// Remove a user-added pin and its links
    pub fn remove_user_pin(&mut self, ctx: &EditorContext, pin: PinRef) -> Option<Vec<Connection>> {
        self.nodes.get_mut(&pin.node)?.remove_user_pin(ctx, pin.pin)?;
        Some(self.break_pin_links(pin))
    }

    /// Remove an instance pin and its links
    pub fn remove_instance_pin(&mut self, pin: PinRef) -> Option<Vec<Connection>> {
        self.nodes.get_mut(&pin.node)?.remove_instance_pin(pin.pin)?;
        Some(self.break_pin_links(pin))
    }

    /// Re-query a node's context pins. Returns the severed links.
    pub fn refresh_context_pins(
        &mut self,
        ctx: &EditorContext,
        node_id: NodeId,
        reconstruct: bool,
    ) -> Option<Vec<Connection>> {
        let changes = self.nodes.get_mut(&node_id)?.refresh_context_pins(ctx, reconstruct);
        Some(self.apply_pin_changes(node_id, &changes))
    }

    /// Clear breakpoint hit state on every node
    pub fn reset_breakpoints(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset_breakpoints();
        }
    }

    // ---------------------------------------------------------------------
    // Placement

    /// Place a new node of `class`, optionally dragged out of `from_pin`.
    pub fn place_node(
        &mut self,
        ctx: &EditorContext,
        class: &str,
        position: [f32; 2],
        from_pin: Option<PinRef>,
    ) -> Option<NodeId> {
        let Some(runtime) = ctx.registry.instantiate(class) else {
            tracing::warn!("Cannot place node: class {class} not found");
            return None;
        };
        let node = FlowGraphNode::new(runtime).with_position(position[0], position[1]);
        let node_id = self.add_placed_node(ctx, node);
        if let Some(from_pin) = from_pin {
            self.autowire_new_node(node_id, from_pin);
        }
        tracing::info!("Placed {class} node {node_id:?}");
        Some(node_id)
    }

    /// Link a freshly placed node to the pin it was dragged from.
    /// Returns the nodes whose links changed.
    pub fn autowire_new_node(&mut self, node_id: NodeId, from_pin: PinRef) -> Vec<NodeId> {
        let Some(from) = self.pin(from_pin).cloned() else {
            return Vec::new();
        };
        if from.direction == PinDirection::Output && self.is_linked(from_pin) {
            return self.insert_new_node(node_id, from_pin);
        }

        for candidate in self.compatible_pins(node_id, &from) {
            if self.connect(from_pin, PinRef::new(node_id, candidate)).is_ok() {
                return vec![from_pin.node, node_id];
            }
        }
        Vec::new()
    }

    /// Insert a new node into the link leaving `from_pin`: the old target is
    /// linked to the new node's first fitting output.
    pub fn insert_new_node(&mut self, node_id: NodeId, from_pin: PinRef) -> Vec<NodeId> {
        let Some(from) = self.pin(from_pin).cloned() else {
            return Vec::new();
        };
        let old_targets = self.linked_pins(from_pin);
        self.break_pin_links(from_pin);

        let mut modified = Vec::new();
        if let Some(target) = old_targets.first().copied() {
            let outputs: Vec<PinId> = self
                .node(node_id)
                .map(|n| n.outputs().iter().map(|p| p.id).collect())
                .unwrap_or_default();
            for output in outputs {
                if self.connect(PinRef::new(node_id, output), target).is_ok() {
                    modified.push(target.node);
                    break;
                }
            }
        }

        for candidate in self.compatible_pins(node_id, &from) {
            if self.connect(from_pin, PinRef::new(node_id, candidate)).is_ok() {
                modified.push(from_pin.node);
                modified.push(node_id);
                break;
            }
        }
        modified
    }

    fn compatible_pins(&self, node_id: NodeId, from: &Pin) -> Vec<PinId> {
        self.node(node_id)
            .map(|n| {
                n.pins_in(from.direction.opposite())
                    .iter()
                    .filter(|p| from.can_link(p))
                    .map(|p| p.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    // ---------------------------------------------------------------------
    // Copy and paste

    /// Snapshot nodes and the links between them. Nodes that cannot be
    /// duplicated are left out.
    pub fn copy_nodes(&self, ctx: &EditorContext, node_ids: &[NodeId]) -> GraphClipboard {
        let mut nodes = Vec::new();
        let mut copied = HashSet::new();
        for node_id in node_ids {
            let Some(node) = self.node(*node_id) else {
                continue;
            };
            if !node.can_duplicate_node(ctx) {
                tracing::warn!("Node {node_id:?} cannot be duplicated, skipped");
                continue;
            }
            nodes.push(node.prepare_for_copying());
            copied.insert(*node_id);
        }

        let connections = self
            .connections
            .values()
            .filter(|c| copied.contains(&c.from.node) && copied.contains(&c.to.node))
            .cloned()
            .collect();
        GraphClipboard { nodes, connections }
    }

    /// Recreate copied nodes with fresh IDs, shifted by `offset`, and restore the
    /// links between them. The report lists the new nodes in clipboard order.
    pub fn paste(
        &mut self,
        ctx: &EditorContext,
        clipboard: &GraphClipboard,
        offset: [f32; 2],
    ) -> ReconstructionReport {
        let mut node_map = HashMap::new();
        let mut pin_map = HashMap::new();
        let mut pasted = Vec::with_capacity(clipboard.nodes.len());

        for snapshot in &clipboard.nodes {
            let (mut node, pins) = FlowGraphNode::from_snapshot(snapshot);
            node.position = [snapshot.position[0] + offset[0], snapshot.position[1] + offset[1]];
            node_map.insert(snapshot.source, node.id);
            pin_map.extend(pins);
            pasted.push(self.add_node(node));
        }

        for connection in &clipboard.connections {
            let remap = |end: PinRef| -> Option<PinRef> {
                Some(PinRef::new(*node_map.get(&end.node)?, *pin_map.get(&end.pin)?))
            };
            let (Some(from), Some(to)) = (remap(connection.from), remap(connection.to)) else {
                continue;
            };
            if let Err(err) = self.connect(from, to) {
                tracing::warn!("Pasted link dropped: {err}");
            }
        }

        // Pins are rebuilt against this graph's classes; links follow by name.
        let mut report = ReconstructionReport::default();
        for node_id in pasted {
            let changes = self.nodes.get_mut(&node_id).map(|n| n.post_placed_new_node(ctx));
            if let Some(changes) = changes {
                let severed = self.apply_pin_changes(node_id, &changes);
                report.record(node_id, severed);
            }
        }

        tracing::info!("Pasted {} node(s) into {}", report.passes(), self.name);
        report
    }

    /// Copy and paste in one step
    pub fn duplicate_nodes(
        &mut self,
        ctx: &EditorContext,
        node_ids: &[NodeId],
    ) -> ReconstructionReport {
        let clipboard = self.copy_nodes(ctx, node_ids);
        self.paste(ctx, &clipboard, DUPLICATE_OFFSET)
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// What a batch of reconstruction passes did to the graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructionReport {
    /// Nodes rebuilt, in pass order
    pub rebuilt: Vec<NodeId>,
    /// Links cut because their pin did not survive, per node
    pub severed: Vec<(NodeId, Vec<Connection>)>,
}

impl ReconstructionReport {
    /// Number of passes that ran
    pub fn passes(&self) -> usize {
        self.rebuilt.len()
    }

    /// Check if no pass ran
    pub fn is_empty(&self) -> bool {
        self.rebuilt.is_empty()
    }

    /// Every severed link
    pub fn severed_links(&self) -> impl Iterator<Item = &Connection> {
        self.severed.iter().flat_map(|(_, links)| links)
    }

    fn record(&mut self, node_id: NodeId, severed: Vec<Connection>) {
        self.rebuilt.push(node_id);
        if !severed.is_empty() {
            self.severed.push((node_id, severed));
        }
    }
}

/// Error when creating a link
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Pin not found
    #[error("Pin not found: {0:?}")]
    PinNotFound(PinId),

    /// Both pins are inputs or both are outputs
    #[error("Pins have the same direction")]
    SameDirection,

    /// Pin categories do not match
    #[error("Incompatible pin categories")]
    IncompatibleCategories,

    /// The pins are already linked
    #[error("Pins are already linked")]
    AlreadyConnected,

    /// An output can only have one link
    #[error("Output already linked: {0:?}")]
    OutputAlreadyLinked(PinId),

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,
}

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// The clipboard text is not a valid node snapshot
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serializing failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),
}

/// Copied nodes and the links between them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphClipboard {
    /// Node snapshots
    pub nodes: Vec<NodeSnapshot>,
    /// Links whose ends are both in `nodes`
    pub connections: Vec<Connection>,
}

impl GraphClipboard {
    /// Check if nothing was copied
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Serialize to clipboard text
    pub fn to_ron_string(&self) -> Result<String, ClipboardError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Parse clipboard text
    pub fn from_ron_str(content: &str) -> Result<Self, ClipboardError> {
        Ok(ron::from_str(content)?)
    }
}
