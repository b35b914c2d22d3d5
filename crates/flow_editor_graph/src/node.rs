// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph representation of a flow node.
//!
//! A [`FlowGraphNode`] owns one [`RuntimeNode`] and the editor pins generated from it.
//! Pins are rebuilt wholesale by [`FlowGraphNode::reconstruct`]; links and breakpoints
//! follow pins by name and direction.

use crate::binding::{CompileEvent, RecompileNotifier, Subscription};
use crate::breakpoint::Breakpoint;
use crate::debugger::{ActivationState, NodeInstanceState, SimulationSession};
use crate::pin::{Pin, PinDescriptor, PinDirection, PinId, PinKey, PinOrigin, PinShape};
use crate::reconstruction::EditorContext;
use crate::runtime::{class_shape, NodeClass, RuntimeNode};
use crate::settings::{DuplicatePinPolicy, GraphSettings};
use crate::sync::{duplicate_keys, synchronize_shape, ShapeSync};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a node is not in a healthy state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeDiagnostic {
    /// No runtime node is bound
    #[error("No runtime node bound")]
    Unbound,

    /// The runtime node's class could not be resolved
    #[error("Node class not found: {0}")]
    UnresolvedClass(String),

    /// The class requested the same pin more than once
    #[error("Duplicate pins: {0:?}")]
    DuplicatePins(Vec<PinKey>),

    /// The class is not one of the node's assigned classes
    #[error("Node class {0} is not assigned to this graph node")]
    ClassNotAssigned(String),
}

/// Pin changes produced by a reconstruction or a pin-only merge
#[derive(Debug, Clone, Default)]
pub struct PinChanges {
    /// Old pin -> new pin for pins whose links must follow
    pub remap: HashMap<PinId, PinId>,
    /// Pins that no longer exist; their links must be severed
    pub orphaned: Vec<Pin>,
    /// Pins that did not exist before
    pub added: Vec<PinId>,
    /// Descriptors dropped as duplicates
    pub duplicates: Vec<PinDescriptor>,
}

impl PinChanges {
    fn from_sync(sync: ShapeSync) -> Self {
        let remap = sync.remap();
        let added = sync
            .inputs
            .pins
            .iter()
            .chain(&sync.outputs.pins)
            .filter(|p| !remap.values().any(|id| *id == p.id))
            .map(|p| p.id)
            .collect();
        Self {
            remap,
            orphaned: sync.orphaned().cloned().collect(),
            added,
            duplicates: sync.duplicates().cloned().collect(),
        }
    }

    /// Check if nothing changed
    pub fn is_empty(&self) -> bool {
        self.remap.is_empty() && self.orphaned.is_empty() && self.added.is_empty()
    }
}

/// State copied along with a node so it can be pasted into any graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node the snapshot was taken from
    pub source: NodeId,
    /// Position in the graph UI
    pub position: [f32; 2],
    /// Bound runtime node
    pub runtime: Option<RuntimeNode>,
    /// Input pins at copy time
    pub inputs: Vec<Pin>,
    /// Output pins at copy time
    pub outputs: Vec<Pin>,
    /// Pin breakpoints by pin identity
    pub pin_breakpoints: Vec<(PinKey, Breakpoint)>,
    /// Node breakpoint
    pub node_breakpoint: Breakpoint,
    /// Assigned node classes
    pub assigned_node_classes: Vec<String>,
    /// Instance-only pins
    pub instance_pins: Vec<PinDescriptor>,
    /// Context pins known at copy time
    pub context_pins: Vec<PinDescriptor>,
}

/// A flow node in the editor graph
#[derive(Debug, Serialize, Deserialize)]
pub struct FlowGraphNode {
    /// Unique instance ID
    pub id: NodeId,
    /// Position in the graph UI
    pub position: [f32; 2],
    runtime: Option<RuntimeNode>,
    inputs: Vec<Pin>,
    outputs: Vec<Pin>,
    pin_breakpoints: IndexMap<PinId, Breakpoint>,
    node_breakpoint: Breakpoint,
    /// Classes this graph node may represent; empty means any
    pub assigned_node_classes: Vec<String>,
    instance_pins: Vec<PinDescriptor>,
    context_pins: Vec<PinDescriptor>,
    #[serde(skip)]
    pending_recompile: bool,
    #[serde(skip)]
    needs_full_reconstruction: bool,
    #[serde(skip)]
    diagnostic: Option<NodeDiagnostic>,
    #[serde(skip)]
    subscription: Option<Subscription>,
    #[serde(skip)]
    reconstruction_count: u64,
}

impl FlowGraphNode {
    /// Create a node owning `runtime`. It has no pins until reconstructed.
    pub fn new(runtime: RuntimeNode) -> Self {
        Self {
            id: NodeId::new(),
            position: [0.0, 0.0],
            runtime: Some(runtime),
            inputs: Vec::new(),
            outputs: Vec::new(),
            pin_breakpoints: IndexMap::new(),
            node_breakpoint: Breakpoint::new(),
            assigned_node_classes: Vec::new(),
            instance_pins: Vec::new(),
            context_pins: Vec::new(),
            pending_recompile: false,
            needs_full_reconstruction: true,
            diagnostic: None,
            subscription: None,
            reconstruction_count: 0,
        }
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    // ---------------------------------------------------------------------
    // Runtime node binding

    /// The bound runtime node
    pub fn runtime(&self) -> Option<&RuntimeNode> {
        self.runtime.as_ref()
    }

    /// The bound runtime node, for editing its configuration
    pub fn runtime_mut(&mut self) -> Option<&mut RuntimeNode> {
        self.runtime.as_mut()
    }

    /// Bind a different runtime node. Pins follow on the next reconstruction.
    pub fn set_runtime_node(&mut self, runtime: RuntimeNode) {
        self.runtime = Some(runtime);
        self.needs_full_reconstruction = true;
    }

    /// Release the runtime node and stop listening for external changes
    pub fn unbind(&mut self) -> Option<RuntimeNode> {
        self.subscription = None;
        self.pending_recompile = false;
        self.runtime.take()
    }

    fn resolve_class(&self, ctx: &EditorContext) -> Option<Arc<dyn NodeClass>> {
        self.runtime.as_ref().and_then(|r| ctx.registry.resolve(&r.class))
    }

    /// Listen for class recompilation. Subscribing again to the same notifier is a no-op.
    pub fn subscribe_to_external_changes(&mut self, notifier: &RecompileNotifier) {
        if self.subscription.as_ref().is_some_and(|s| s.is_from(notifier)) {
            return;
        }
        self.subscription = Some(notifier.subscribe());
        tracing::debug!("Node {:?} subscribed to external changes", self.id);
    }

    /// Whether the node listens for class recompilation
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Apply pending recompilation events. Returns true if the node needs reconstruction.
    pub fn process_external_changes(&mut self) -> bool {
        let Some(subscription) = &self.subscription else {
            return false;
        };
        let mut changed = false;
        for event in subscription.drain() {
            match event {
                CompileEvent::PreCompile(class) => {
                    if self.runtime.as_ref().is_some_and(|r| r.class == class) {
                        self.pending_recompile = true;
                    }
                }
                CompileEvent::PostCompile => {
                    if self.pending_recompile {
                        self.pending_recompile = false;
                        self.on_external_change();
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    fn on_external_change(&mut self) {
        self.needs_full_reconstruction = true;
        tracing::info!("Node {:?} class recompiled, full reconstruction required", self.id);
    }

    /// The node was just placed by the user
    pub fn post_placed_new_node(&mut self, ctx: &EditorContext) -> PinChanges {
        self.subscribe_to_external_changes(&ctx.notifier);
        self.reconstruct(ctx)
    }

    /// The node was loaded from disk. Reconstruction waits until assets are loaded.
    pub fn post_load(&mut self, ctx: &EditorContext) -> Option<PinChanges> {
        self.subscribe_to_external_changes(&ctx.notifier);
        if ctx.readiness.is_loaded() {
            Some(self.reconstruct(ctx))
        } else {
            self.needs_full_reconstruction = true;
            tracing::debug!("Node {:?} waits for assets before reconstructing", self.id);
            None
        }
    }

    /// Whether a recompilation of the bound class is in progress
    pub fn pending_recompile(&self) -> bool {
        self.pending_recompile
    }

    /// Whether the next reconstruction must re-query everything
    pub fn needs_full_reconstruction(&self) -> bool {
        self.needs_full_reconstruction
    }

    /// Mark the node for a full reconstruction
    pub fn mark_needs_full_reconstruction(&mut self) {
        self.needs_full_reconstruction = true;
    }

    /// Diagnostic left by the last reconstruction
    pub fn diagnostic(&self) -> Option<&NodeDiagnostic> {
        self.diagnostic.as_ref()
    }

    /// Number of completed reconstruction passes since creation or load
    pub fn reconstruction_count(&self) -> u64 {
        self.reconstruction_count
    }

    // ---------------------------------------------------------------------
    // Reconstruction

    /// Pins the bound runtime node currently requires, in display order
    pub fn required_shape(&self, ctx: &EditorContext) -> Result<PinShape, NodeDiagnostic> {
        let runtime = self.runtime.as_ref().ok_or(NodeDiagnostic::Unbound)?;
        let class = ctx
            .registry
            .resolve(&runtime.class)
            .ok_or_else(|| NodeDiagnostic::UnresolvedClass(runtime.class.clone()))?;

        let mut shape = class_shape(class.as_ref(), runtime);
        if class.supports_context_pins() {
            shape.extend(self.context_pins.iter().cloned());
        }
        shape.extend(self.instance_pins.iter().cloned());

        if ctx.settings.duplicate_pins == DuplicatePinPolicy::Reject {
            let duplicates = duplicate_keys(&shape);
            if !duplicates.is_empty() {
                return Err(NodeDiagnostic::DuplicatePins(duplicates));
            }
        }
        Ok(shape)
    }

    /// Rebuild every pin from the runtime node, keeping links and breakpoints by name.
    ///
    /// Never fails: an unresolvable binding leaves the node without pins and with a
    /// diagnostic.
    pub fn reconstruct(&mut self, ctx: &EditorContext) -> PinChanges {
        ctx.queue.begin(self.id);

        let supports_context = self
            .resolve_class(ctx)
            .is_some_and(|c| c.supports_context_pins());
        if supports_context
            && (ctx.settings.refresh_context_pins_on_load || self.needs_full_reconstruction)
        {
            self.context_pins = self.query_context_pins(ctx);
        }

        let old_inputs = std::mem::take(&mut self.inputs);
        let old_outputs = std::mem::take(&mut self.outputs);

        let shape = match self.required_shape(ctx) {
            Ok(shape) => {
                self.diagnostic = self.assigned_class_diagnostic();
                shape
            }
            Err(diagnostic) => {
                tracing::warn!("Node {:?} reconstructed without pins: {diagnostic}", self.id);
                self.diagnostic = Some(diagnostic);
                PinShape::new()
            }
        };

        let sync = synchronize_shape(&old_inputs, &old_outputs, &shape);
        for duplicate in sync.duplicates() {
            tracing::warn!(
                "Node {:?} requested pin {:?} {} twice, keeping the first",
                self.id,
                duplicate.direction,
                duplicate.name
            );
        }

        self.inputs = sync.inputs.pins.clone();
        self.outputs = sync.outputs.pins.clone();
        let changes = PinChanges::from_sync(sync);
        self.rekey_breakpoints(&changes.remap);

        self.reconstruction_count += 1;
        // Requests absorbed by this pass carry over to the next one.
        self.needs_full_reconstruction = ctx.queue.finish(self.id);

        tracing::debug!(
            "Reconstructed node {:?}: {} inputs, {} outputs, {} orphaned",
            self.id,
            self.inputs.len(),
            self.outputs.len(),
            changes.orphaned.len()
        );
        changes
    }

    fn assigned_class_diagnostic(&self) -> Option<NodeDiagnostic> {
        let class = &self.runtime.as_ref()?.class;
        if self.assigned_node_classes.is_empty() || self.assigned_node_classes.contains(class) {
            None
        } else {
            Some(NodeDiagnostic::ClassNotAssigned(class.clone()))
        }
    }

    fn rekey_breakpoints(&mut self, remap: &HashMap<PinId, PinId>) {
        let old = std::mem::take(&mut self.pin_breakpoints);
        for (pin, breakpoint) in old {
            if let Some(new_pin) = remap.get(&pin) {
                self.pin_breakpoints.insert(*new_pin, breakpoint);
            }
        }
    }

    fn query_context_pins(&self, ctx: &EditorContext) -> Vec<PinDescriptor> {
        let Some(asset) = self.runtime.as_ref().and_then(|r| r.context_asset.as_deref()) else {
            return Vec::new();
        };
        let Some(source) = &ctx.context_source else {
            return Vec::new();
        };
        match source.context_pins(asset) {
            Some(pins) => pins
                .into_iter()
                .map(|d| d.with_origin(PinOrigin::Context))
                .collect(),
            None => {
                tracing::warn!("Context asset {asset} not found for node {:?}", self.id);
                Vec::new()
            }
        }
    }

    /// Re-query the context asset. With `reconstruct`, run a full reconstruction;
    /// otherwise only add and remove context pins.
    pub fn refresh_context_pins(&mut self, ctx: &EditorContext, reconstruct: bool) -> PinChanges {
        if !self.supports_context_pins(ctx) {
            return PinChanges::default();
        }
        if reconstruct {
            self.needs_full_reconstruction = true;
            return self.reconstruct(ctx);
        }

        let fresh = self.query_context_pins(ctx);
        let mut changes = PinChanges::default();

        let stale: Vec<PinId> = self
            .pins()
            .filter(|p| {
                p.origin == PinOrigin::Context
                    && !fresh.iter().any(|d| d.direction == p.direction && d.name == p.name)
            })
            .map(|p| p.id)
            .collect();
        for pin in stale {
            if let Some(removed) = self.remove_orphaned_pin(pin) {
                changes.orphaned.push(removed);
            }
        }

        for descriptor in &fresh {
            if self.find_pin(&descriptor.name, descriptor.direction).is_some() {
                continue;
            }
            let index = self.context_insert_index(descriptor.direction);
            if let Some(id) = self.create_pin(descriptor.clone(), Some(index)) {
                changes.added.push(id);
            }
        }

        self.context_pins = fresh;
        tracing::debug!(
            "Refreshed context pins on {:?}: {} added, {} removed",
            self.id,
            changes.added.len(),
            changes.orphaned.len()
        );
        changes
    }

    // ---------------------------------------------------------------------
    // Pins

    /// Input pins in display order
    pub fn inputs(&self) -> &[Pin] {
        &self.inputs
    }

    /// Output pins in display order
    pub fn outputs(&self) -> &[Pin] {
        &self.outputs
    }

    /// Pins of one direction
    pub fn pins_in(&self, direction: PinDirection) -> &[Pin] {
        match direction {
            PinDirection::Input => &self.inputs,
            PinDirection::Output => &self.outputs,
        }
    }

    fn pins_in_mut(&mut self, direction: PinDirection) -> &mut Vec<Pin> {
        match direction {
            PinDirection::Input => &mut self.inputs,
            PinDirection::Output => &mut self.outputs,
        }
    }

    /// All pins, inputs first
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Get a pin by ID
    pub fn pin(&self, id: PinId) -> Option<&Pin> {
        self.pins().find(|p| p.id == id)
    }

    /// Get a pin by index within its direction
    pub fn pin_at(&self, direction: PinDirection, index: usize) -> Option<&Pin> {
        self.pins_in(direction).get(index)
    }

    /// Get a pin by name and direction
    pub fn find_pin(&self, name: &str, direction: PinDirection) -> Option<&Pin> {
        self.pins_in(direction).iter().find(|p| p.name == name)
    }

    /// Create an input pin at `index`, or at the end
    pub fn create_input_pin(
        &mut self,
        descriptor: PinDescriptor,
        index: Option<usize>,
    ) -> Option<PinId> {
        self.create_pin(PinDescriptor { direction: PinDirection::Input, ..descriptor }, index)
    }

    /// Create an output pin at `index`, or at the end
    pub fn create_output_pin(
        &mut self,
        descriptor: PinDescriptor,
        index: Option<usize>,
    ) -> Option<PinId> {
        self.create_pin(PinDescriptor { direction: PinDirection::Output, ..descriptor }, index)
    }

    fn create_pin(&mut self, descriptor: PinDescriptor, index: Option<usize>) -> Option<PinId> {
        if self.find_pin(&descriptor.name, descriptor.direction).is_some() {
            tracing::warn!(
                "Pin {:?} {} already exists on {:?}",
                descriptor.direction,
                descriptor.name,
                self.id
            );
            return None;
        }
        let pin = Pin::from_descriptor(&descriptor);
        let id = pin.id;
        let pins = self.pins_in_mut(descriptor.direction);
        let index = index.unwrap_or(pins.len()).min(pins.len());
        pins.insert(index, pin);
        Some(id)
    }

    /// Remove a pin without asking, together with its breakpoint.
    /// The caller severs its links.
    pub fn remove_orphaned_pin(&mut self, pin: PinId) -> Option<Pin> {
        let direction = self.pin(pin)?.direction;
        let pins = self.pins_in_mut(direction);
        let index = pins.iter().position(|p| p.id == pin)?;
        let removed = pins.remove(index);
        self.pin_breakpoints.shift_remove(&pin);
        Some(removed)
    }

    /// Whether the bound class takes pins from a context asset
    pub fn supports_context_pins(&self, ctx: &EditorContext) -> bool {
        self.resolve_class(ctx).is_some_and(|c| c.supports_context_pins())
    }

    /// Whether the user may add an input
    pub fn can_user_add_input(&self, ctx: &EditorContext) -> bool {
        self.resolve_class(ctx).is_some_and(|c| c.can_user_add_input())
    }

    /// Whether the user may add an output
    pub fn can_user_add_output(&self, ctx: &EditorContext) -> bool {
        self.resolve_class(ctx).is_some_and(|c| c.can_user_add_output())
    }

    fn can_user_add(&self, ctx: &EditorContext, direction: PinDirection) -> bool {
        match direction {
            PinDirection::Input => self.can_user_add_input(ctx),
            PinDirection::Output => self.can_user_add_output(ctx),
        }
    }

    /// Whether the user may remove this input
    pub fn can_user_remove_input(&self, ctx: &EditorContext, pin: PinId) -> bool {
        self.can_user_remove(ctx, pin, PinDirection::Input)
    }

    /// Whether the user may remove this output
    pub fn can_user_remove_output(&self, ctx: &EditorContext, pin: PinId) -> bool {
        self.can_user_remove(ctx, pin, PinDirection::Output)
    }

    fn can_user_remove(&self, ctx: &EditorContext, pin: PinId, direction: PinDirection) -> bool {
        self.pin(pin)
            .is_some_and(|p| p.direction == direction && p.origin == PinOrigin::User)
            && self.can_user_add(ctx, direction)
    }

    /// Add a numbered input. Returns `None` if the class does not allow it.
    pub fn add_user_input(&mut self, ctx: &EditorContext) -> Option<PinId> {
        self.add_user_pin(ctx, PinDirection::Input)
    }

    /// Add a numbered output. Returns `None` if the class does not allow it.
    pub fn add_user_output(&mut self, ctx: &EditorContext) -> Option<PinId> {
        self.add_user_pin(ctx, PinDirection::Output)
    }

    fn add_user_pin(&mut self, ctx: &EditorContext, direction: PinDirection) -> Option<PinId> {
        if !self.can_user_add(ctx, direction) {
            tracing::warn!("Node {:?} does not accept user {direction:?} pins", self.id);
            return None;
        }
        let name = self.next_user_pin_name(direction, &ctx.settings);
        self.runtime.as_mut()?.add_user_pin(direction, name.clone());

        let index = self
            .pins_in(direction)
            .iter()
            .filter(|p| matches!(p.origin, PinOrigin::Default | PinOrigin::User))
            .count();
        let descriptor = PinDescriptor {
            name,
            direction,
            category: None,
            origin: PinOrigin::User,
        };
        self.create_pin(descriptor, Some(index))
    }

    fn next_user_pin_name(&self, direction: PinDirection, settings: &GraphSettings) -> String {
        (0..)
            .map(|n| format!("{}{n}", settings.user_pin_prefix))
            .find(|name| self.find_pin(name, direction).is_none())
            .unwrap_or_default()
    }

    /// Remove a user-added pin. Returns `None` if it is not user-removable.
    pub fn remove_user_pin(&mut self, ctx: &EditorContext, pin: PinId) -> Option<Pin> {
        let (direction, name) = self.pin(pin).map(|p| (p.direction, p.name.clone()))?;
        if !self.can_user_remove(ctx, pin, direction) {
            tracing::warn!("Pin {name} on {:?} cannot be removed by the user", self.id);
            return None;
        }
        self.runtime.as_mut()?.remove_user_pin(direction, &name);
        self.remove_orphaned_pin(pin)
    }

    /// Add a pin on this graph node only, after the class pins
    pub fn add_instance_pin(
        &mut self,
        direction: PinDirection,
        name: impl Into<String>,
    ) -> Option<PinId> {
        let descriptor = PinDescriptor {
            name: name.into(),
            direction,
            category: None,
            origin: PinOrigin::Instance,
        };
        let id = self.create_pin(descriptor.clone(), None)?;
        self.instance_pins.push(descriptor);
        Some(id)
    }

    /// Remove a pin added with [`FlowGraphNode::add_instance_pin`]
    pub fn remove_instance_pin(&mut self, pin: PinId) -> Option<Pin> {
        let target = self.pin(pin).filter(|p| p.origin == PinOrigin::Instance)?;
        let key = target.key();
        self.instance_pins.retain(|d| d.key() != key);
        self.remove_orphaned_pin(pin)
    }

    /// Pins added with [`FlowGraphNode::add_instance_pin`]
    pub fn instance_pins(&self) -> &[PinDescriptor] {
        &self.instance_pins
    }

    fn context_insert_index(&self, direction: PinDirection) -> usize {
        self.pins_in(direction)
            .iter()
            .filter(|p| p.origin != PinOrigin::Instance)
            .count()
    }

    // ---------------------------------------------------------------------
    // Breakpoints

    /// Breakpoint on a pin, if one was ever placed
    pub fn pin_breakpoint(&self, pin: PinId) -> Option<&Breakpoint> {
        self.pin_breakpoints.get(&pin)
    }

    /// All pin breakpoints
    pub fn pin_breakpoints(&self) -> impl Iterator<Item = (PinId, &Breakpoint)> {
        self.pin_breakpoints.iter().map(|(id, bp)| (*id, bp))
    }

    /// Place a breakpoint on a pin. False if the pin does not exist.
    pub fn add_pin_breakpoint(&mut self, pin: PinId) -> bool {
        if self.pin(pin).is_none() {
            return false;
        }
        self.pin_breakpoints.entry(pin).or_default().add();
        true
    }

    /// Remove a pin breakpoint. False if there was none.
    pub fn remove_pin_breakpoint(&mut self, pin: PinId) -> bool {
        self.pin_breakpoints.shift_remove(&pin).is_some()
    }

    /// Whether a pin breakpoint can be enabled
    pub fn can_enable_pin_breakpoint(&self, pin: PinId) -> bool {
        self.pin_breakpoints.get(&pin).is_some_and(Breakpoint::can_enable)
    }

    /// Arm a pin breakpoint
    pub fn enable_pin_breakpoint(&mut self, pin: PinId) -> bool {
        self.pin_breakpoints.get_mut(&pin).is_some_and(Breakpoint::enable)
    }

    /// Disarm a pin breakpoint
    pub fn disable_pin_breakpoint(&mut self, pin: PinId) -> bool {
        self.pin_breakpoints.get_mut(&pin).is_some_and(Breakpoint::disable)
    }

    /// Toggle a pin breakpoint
    pub fn toggle_pin_breakpoint(&mut self, pin: PinId) -> bool {
        self.pin_breakpoints.get_mut(&pin).is_some_and(Breakpoint::toggle)
    }

    /// The node-level breakpoint
    pub fn node_breakpoint(&self) -> &Breakpoint {
        &self.node_breakpoint
    }

    /// The node-level breakpoint, for placing and toggling
    pub fn node_breakpoint_mut(&mut self) -> &mut Breakpoint {
        &mut self.node_breakpoint
    }

    /// An input fired in the running session. Returns true if the session should pause.
    pub fn on_input_triggered(
        &mut self,
        index: usize,
        session_active: bool,
        settings: &GraphSettings,
    ) -> bool {
        self.on_pin_triggered(PinDirection::Input, index, session_active, settings)
    }

    /// An output fired in the running session. Returns true if the session should pause.
    pub fn on_output_triggered(
        &mut self,
        index: usize,
        session_active: bool,
        settings: &GraphSettings,
    ) -> bool {
        self.on_pin_triggered(PinDirection::Output, index, session_active, settings)
    }

    fn on_pin_triggered(
        &mut self,
        direction: PinDirection,
        index: usize,
        session_active: bool,
        settings: &GraphSettings,
    ) -> bool {
        let Some(pin) = self.pin_at(direction, index).map(|p| p.id) else {
            tracing::warn!("Stale {direction:?} index {index} on {:?} ignored", self.id);
            return false;
        };

        let mut pause = self
            .pin_breakpoints
            .get_mut(&pin)
            .is_some_and(|bp| bp.hit(session_active));

        // Node breakpoints wait on any pin.
        if settings.pause_on_node_breakpoint && self.node_breakpoint.hit(session_active) {
            pause = true;
        }
        pause
    }

    /// Clear hit state on every breakpoint of this node
    pub fn reset_breakpoints(&mut self) {
        self.node_breakpoint.reset_hit();
        for breakpoint in self.pin_breakpoints.values_mut() {
            breakpoint.reset_hit();
        }
    }

    // ---------------------------------------------------------------------
    // Queries

    /// Display name of the bound class
    pub fn title(&self, ctx: &EditorContext) -> String {
        match (self.resolve_class(ctx), &self.runtime) {
            (Some(class), _) => class.display_name().to_string(),
            (None, Some(runtime)) => format!("{} (missing)", runtime.class),
            (None, None) => "Unbound".to_string(),
        }
    }

    /// Short summary of the node's content
    pub fn node_description(&self, ctx: &EditorContext) -> String {
        match (self.resolve_class(ctx), &self.runtime) {
            (Some(class), Some(runtime)) => class.node_description(runtime),
            _ => self
                .diagnostic
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }

    /// Instance of this node in the inspected run
    pub fn inspected_node_instance<'a>(
        &self,
        session: &'a dyn SimulationSession,
    ) -> Option<&'a NodeInstanceState> {
        session.inspected_instance(self.id)
    }

    /// Activation state in the inspected run
    pub fn activation_state(&self, session: &dyn SimulationSession) -> ActivationState {
        self.inspected_node_instance(session)
            .map_or(ActivationState::Invalid, |i| i.activation)
    }

    /// Status text, shown while the instance is active
    pub fn status_string(&self, session: &dyn SimulationSession) -> String {
        self.inspected_node_instance(session)
            .filter(|i| i.activation == ActivationState::Active)
            .map(|i| i.status.clone())
            .unwrap_or_default()
    }

    /// Whether the inspected instance preloaded its content
    pub fn is_content_preloaded(&self, session: &dyn SimulationSession) -> bool {
        self.inspected_node_instance(session).is_some_and(|i| i.preloaded)
    }

    /// Whether the viewport can focus on what the inspected instance acts on
    pub fn can_focus_viewport(&self, session: &dyn SimulationSession) -> bool {
        self.inspected_node_instance(session)
            .is_some_and(|i| i.focus_target.is_some())
    }

    /// Whether the user may delete this node
    pub fn can_user_delete_node(&self, ctx: &EditorContext) -> bool {
        self.resolve_class(ctx).map_or(true, |c| c.can_user_delete())
    }

    /// Whether this node may be duplicated
    pub fn can_duplicate_node(&self, ctx: &EditorContext) -> bool {
        self.resolve_class(ctx).is_some_and(|c| c.can_duplicate())
    }

    // ---------------------------------------------------------------------
    // Copying

    /// Capture everything needed to recreate this node in another graph
    pub fn prepare_for_copying(&self) -> NodeSnapshot {
        let pin_breakpoints = self
            .pin_breakpoints
            .iter()
            .filter_map(|(id, bp)| {
                let mut bp = *bp;
                bp.reset_hit();
                self.pin(*id).map(|p| (p.key(), bp))
            })
            .collect();
        let mut node_breakpoint = self.node_breakpoint;
        node_breakpoint.reset_hit();

        NodeSnapshot {
            source: self.id,
            position: self.position,
            runtime: self.runtime.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            pin_breakpoints,
            node_breakpoint,
            assigned_node_classes: self.assigned_node_classes.clone(),
            instance_pins: self.instance_pins.clone(),
            context_pins: self.context_pins.clone(),
        }
    }

    /// Recreate a node from a snapshot with fresh node and pin IDs.
    /// Returns the node and the mapping from snapshot pin IDs to new ones.
    pub fn from_snapshot(snapshot: &NodeSnapshot) -> (Self, HashMap<PinId, PinId>) {
        let mut node = Self {
            position: snapshot.position,
            runtime: snapshot.runtime.clone(),
            assigned_node_classes: snapshot.assigned_node_classes.clone(),
            instance_pins: snapshot.instance_pins.clone(),
            context_pins: snapshot.context_pins.clone(),
            node_breakpoint: snapshot.node_breakpoint,
            ..Self::empty()
        };

        let mut remap = HashMap::new();
        let mut fresh = |pins: &[Pin]| -> Vec<Pin> {
            pins.iter()
                .map(|p| {
                    let pin = Pin { id: PinId::new(), ..p.clone() };
                    remap.insert(p.id, pin.id);
                    pin
                })
                .collect()
        };
        node.inputs = fresh(&snapshot.inputs);
        node.outputs = fresh(&snapshot.outputs);

        for (key, breakpoint) in &snapshot.pin_breakpoints {
            if let Some(pin) = node.find_pin(&key.name, key.direction).map(|p| p.id) {
                node.pin_breakpoints.insert(pin, *breakpoint);
            }
        }
        (node, remap)
    }

    fn empty() -> Self {
        let mut node = Self::new(RuntimeNode::new(String::new()));
        node.runtime = None;
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::PlaySession;
    use crate::runtime::{create_flow_registry, ConfigValue, NodeCategory, StaticNodeClass};

    fn ctx() -> EditorContext {
        EditorContext::new(create_flow_registry())
    }

    fn placed(ctx: &EditorContext, class: &str) -> FlowGraphNode {
        let mut node = FlowGraphNode::new(RuntimeNode::new(class));
        node.post_placed_new_node(ctx);
        node
    }

    fn names(pins: &[Pin]) -> Vec<&str> {
        pins.iter().map(|p| p.name.as_str()).collect()
    }

    /// Shape driven by configuration: `Outputs` numbered outputs.
    struct Switch;

    impl NodeClass for Switch {
        fn id(&self) -> &str {
            "switch"
        }

        fn display_name(&self) -> &str {
            "Switch"
        }

        fn category(&self) -> NodeCategory {
            NodeCategory::Route
        }

        fn default_pins(&self, node: &RuntimeNode) -> PinShape {
            let count = node.config("Outputs").and_then(ConfigValue::as_int).unwrap_or(0);
            let mut shape = PinShape::new().with_input(PinDescriptor::input("In"));
            for i in 0..count {
                shape.push(PinDescriptor::output(format!("Case {i}")));
            }
            shape
        }
    }

    #[test]
    fn test_placement_allocates_default_pins() {
        let ctx = ctx();
        let node = placed(&ctx, "play_sequence");
        assert_eq!(names(node.inputs()), ["Start", "Stop"]);
        assert_eq!(names(node.outputs()), ["Out", "Completed"]);
        assert!(node.is_subscribed());
        assert!(node.diagnostic().is_none());
        assert_eq!(node.reconstruction_count(), 1);
    }

    #[test]
    fn test_shape_follows_configuration() {
        let mut registry = create_flow_registry();
        registry.register(Switch);
        let ctx = EditorContext::new(registry);

        let runtime = RuntimeNode::new("switch").with_config("Outputs", ConfigValue::Int(2));
        let mut node = FlowGraphNode::new(runtime);
        node.post_placed_new_node(&ctx);
        assert_eq!(names(node.outputs()), ["Case 0", "Case 1"]);

        let case1 = node.outputs()[1].id;
        node.runtime_mut().unwrap().set_config("Outputs", ConfigValue::Int(3));
        let changes = node.reconstruct(&ctx);
        assert_eq!(names(node.outputs()), ["Case 0", "Case 1", "Case 2"]);
        assert_eq!(changes.remap.get(&case1), Some(&node.outputs()[1].id));
        assert_eq!(changes.added, vec![node.outputs()[2].id]);
    }

    #[test]
    fn test_unresolved_class_degrades() {
        let ctx = ctx();
        let mut node = placed(&ctx, "finish");
        assert_eq!(node.inputs().len(), 1);

        node.set_runtime_node(RuntimeNode::new("deleted_class"));
        let changes = node.reconstruct(&ctx);
        assert!(node.inputs().is_empty());
        assert!(node.outputs().is_empty());
        assert_eq!(
            node.diagnostic(),
            Some(&NodeDiagnostic::UnresolvedClass("deleted_class".into()))
        );
        assert_eq!(changes.orphaned.len(), 1);
        assert_eq!(node.title(&ctx), "deleted_class (missing)");
    }

    #[test]
    fn test_unbound_node_degrades() {
        let ctx = ctx();
        let mut node = placed(&ctx, "start");
        node.unbind();
        assert!(!node.is_subscribed());
        node.reconstruct(&ctx);
        assert_eq!(node.pins().count(), 0);
        assert_eq!(node.diagnostic(), Some(&NodeDiagnostic::Unbound));
        assert!(node.can_user_delete_node(&ctx));
        assert!(!node.can_duplicate_node(&ctx));
    }

    #[test]
    fn test_duplicate_policy_reject() {
        let mut registry = create_flow_registry();
        registry.register(
            StaticNodeClass::new("broken", "Broken", NodeCategory::Custom)
                .output("Out")
                .output("Out"),
        );
        let mut ctx = EditorContext::new(registry);

        let node = placed(&ctx, "broken");
        assert_eq!(names(node.outputs()), ["Out"]);

        ctx.settings.duplicate_pins = DuplicatePinPolicy::Reject;
        let node = placed(&ctx, "broken");
        assert!(node.outputs().is_empty());
        assert!(matches!(node.diagnostic(), Some(NodeDiagnostic::DuplicatePins(_))));
    }

    #[test]
    fn test_assigned_classes() {
        let ctx = ctx();
        let mut node = FlowGraphNode::new(RuntimeNode::new("finish"));
        node.assigned_node_classes = vec!["start".into()];
        node.post_placed_new_node(&ctx);
        assert_eq!(
            node.diagnostic(),
            Some(&NodeDiagnostic::ClassNotAssigned("finish".into()))
        );
        assert_eq!(node.inputs().len(), 1);
    }

    #[test]
    fn test_breakpoints_follow_pins() {
        let ctx = ctx();
        let mut node = placed(&ctx, "play_sequence");
        let stop = node.find_pin("Stop", PinDirection::Input).unwrap().id;
        assert!(node.add_pin_breakpoint(stop));
        assert!(node.enable_pin_breakpoint(stop));

        node.reconstruct(&ctx);
        let new_stop = node.find_pin("Stop", PinDirection::Input).unwrap().id;
        assert_ne!(stop, new_stop);
        assert!(node.pin_breakpoint(stop).is_none());
        assert!(node.pin_breakpoint(new_stop).is_some_and(Breakpoint::is_enabled));
    }

    #[test]
    fn test_breakpoint_ops_on_missing_pin_are_noops() {
        let ctx = ctx();
        let mut node = placed(&ctx, "finish");
        let ghost = PinId::new();
        assert!(!node.add_pin_breakpoint(ghost));
        assert!(!node.can_enable_pin_breakpoint(ghost));
        assert!(!node.enable_pin_breakpoint(ghost));
        assert!(!node.toggle_pin_breakpoint(ghost));
        assert!(node.pin_breakpoints().next().is_none());
    }

    #[test]
    fn test_trigger_hits_armed_breakpoint() {
        let ctx = ctx();
        let settings = GraphSettings::default();
        let mut node = placed(&ctx, "play_sequence");
        let stop = node.inputs()[1].id;
        node.add_pin_breakpoint(stop);

        // Placed but disarmed.
        assert!(!node.on_input_triggered(1, true, &settings));
        node.enable_pin_breakpoint(stop);
        assert!(!node.on_input_triggered(1, false, &settings));
        assert!(!node.on_input_triggered(0, true, &settings));
        assert!(node.on_input_triggered(1, true, &settings));
        assert!(node.pin_breakpoint(stop).is_some_and(Breakpoint::is_hit));

        node.reset_breakpoints();
        assert!(!node.pin_breakpoint(stop).is_some_and(Breakpoint::is_hit));
    }

    #[test]
    fn test_stale_index_is_ignored() {
        let ctx = ctx();
        let settings = GraphSettings::default();
        let mut node = placed(&ctx, "finish");
        node.node_breakpoint_mut().add();
        node.node_breakpoint_mut().enable();
        assert!(!node.on_input_triggered(7, true, &settings));
        assert!(!node.node_breakpoint().is_hit());
    }

    #[test]
    fn test_node_breakpoint_pauses_on_any_pin() {
        let ctx = ctx();
        let mut settings = GraphSettings::default();
        let mut node = placed(&ctx, "play_sequence");
        node.node_breakpoint_mut().add();
        node.node_breakpoint_mut().enable();
        assert!(node.on_output_triggered(1, true, &settings));
        assert!(node.node_breakpoint().is_hit());

        node.reset_breakpoints();
        settings.pause_on_node_breakpoint = false;
        assert!(!node.on_output_triggered(1, true, &settings));
    }

    #[test]
    fn test_user_pins() {
        let ctx = ctx();
        let mut node = placed(&ctx, "sequence");
        assert!(node.can_user_add_output(&ctx));
        assert!(!node.can_user_add_input(&ctx));
        assert!(node.add_user_input(&ctx).is_none());

        let first = node.add_user_output(&ctx).unwrap();
        let second = node.add_user_output(&ctx).unwrap();
        assert_eq!(names(node.outputs()), ["0", "1"]);
        assert_eq!(node.runtime().unwrap().user_outputs, vec!["0", "1"]);

        assert!(node.can_user_remove_output(&ctx, first));
        let input = node.inputs()[0].id;
        assert!(!node.can_user_remove_input(&ctx, input));
        assert!(node.remove_user_pin(&ctx, input).is_none());

        node.remove_user_pin(&ctx, first).unwrap();
        assert_eq!(names(node.outputs()), ["1"]);
        let third = node.add_user_output(&ctx).unwrap();
        assert_eq!(node.pin(third).unwrap().name, "0");
        assert!(node.pin(second).is_some());

        // User pins are part of the class shape and survive reconstruction.
        node.reconstruct(&ctx);
        assert_eq!(names(node.outputs()), ["1", "0"]);
    }

    #[test]
    fn test_user_pin_prefix() {
        let mut ctx = ctx();
        ctx.settings.user_pin_prefix = "Branch ".into();
        let mut node = placed(&ctx, "logical_and");
        node.add_user_input(&ctx);
        assert_eq!(names(node.inputs()), ["Branch 0"]);
    }

    #[test]
    fn test_instance_pins_stay_local() {
        let ctx = ctx();
        let mut node = placed(&ctx, "finish");
        let extra = node.add_instance_pin(PinDirection::Output, "Debug").unwrap();
        assert!(node.add_instance_pin(PinDirection::Output, "Debug").is_none());
        assert_eq!(node.runtime().unwrap().user_outputs.len(), 0);
        assert!(!node.can_user_remove_output(&ctx, extra));

        node.reconstruct(&ctx);
        assert_eq!(names(node.outputs()), ["Debug"]);

        let extra = node.outputs()[0].id;
        assert!(node.remove_instance_pin(extra).is_some());
        node.reconstruct(&ctx);
        assert!(node.outputs().is_empty());
    }

    #[test]
    fn test_create_pin_at_index() {
        let ctx = ctx();
        let mut node = placed(&ctx, "play_sequence");
        node.create_input_pin(PinDescriptor::input("Pause"), Some(1)).unwrap();
        node.create_output_pin(PinDescriptor::input("Late"), None).unwrap();
        assert_eq!(names(node.inputs()), ["Start", "Pause", "Stop"]);
        assert_eq!(names(node.outputs()), ["Out", "Completed", "Late"]);
        assert!(node.create_input_pin(PinDescriptor::input("Start"), None).is_none());

        let pause = node.inputs()[1].id;
        node.add_pin_breakpoint(pause);
        assert!(node.remove_orphaned_pin(pause).is_some());
        assert!(node.pin_breakpoint(pause).is_none());
        assert!(node.remove_orphaned_pin(pause).is_none());
    }

    #[test]
    fn test_recompile_events_filtered_by_class() {
        let ctx = ctx();
        let mut node = placed(&ctx, "finish");

        ctx.notifier.notify_pre_compile("start");
        ctx.notifier.notify_post_compile();
        assert!(!node.process_external_changes());

        ctx.notifier.notify_pre_compile("finish");
        assert!(!node.process_external_changes());
        assert!(node.pending_recompile());
        ctx.notifier.notify_post_compile();
        assert!(node.process_external_changes());
        assert!(!node.pending_recompile());
        assert!(node.needs_full_reconstruction());

        node.reconstruct(&ctx);
        assert!(!node.needs_full_reconstruction());
    }

    #[test]
    fn test_subscription_is_idempotent() {
        let ctx = ctx();
        let mut node = placed(&ctx, "finish");
        node.subscribe_to_external_changes(&ctx.notifier);
        node.post_placed_new_node(&ctx);
        assert_eq!(ctx.notifier.subscriber_count(), 1);

        ctx.notifier.notify_pre_compile("finish");
        ctx.notifier.notify_post_compile();
        assert!(node.process_external_changes());

        drop(node);
        assert_eq!(ctx.notifier.subscriber_count(), 0);
    }

    #[test]
    fn test_post_load_defers_until_assets_loaded() {
        let ctx = ctx();
        let mut node = FlowGraphNode::new(RuntimeNode::new("finish"));
        assert!(node.post_load(&ctx).is_none());
        assert!(node.inputs().is_empty());
        assert!(node.needs_full_reconstruction());

        ctx.readiness.mark_loaded();
        assert!(node.post_load(&ctx).is_some());
        assert_eq!(node.inputs().len(), 1);
    }

    #[test]
    fn test_inspection_queries() {
        let ctx = ctx();
        let node = placed(&ctx, "play_sequence");
        let mut session = PlaySession::new();
        assert_eq!(node.activation_state(&session), ActivationState::Invalid);
        assert_eq!(node.status_string(&session), "");

        session.set_instance(
            node.id,
            NodeInstanceState {
                activation: ActivationState::Active,
                status: "Playing Intro".into(),
                preloaded: true,
                focus_target: Some("Camera".into()),
            },
        );
        assert_eq!(node.activation_state(&session), ActivationState::Active);
        assert_eq!(node.status_string(&session), "Playing Intro");
        assert!(node.is_content_preloaded(&session));
        assert!(node.can_focus_viewport(&session));
        assert!(node.inspected_node_instance(&session).is_some());
    }

    #[test]
    fn test_delete_and_duplicate_gating() {
        let ctx = ctx();
        let start = placed(&ctx, "start");
        assert!(!start.can_user_delete_node(&ctx));
        assert!(!start.can_duplicate_node(&ctx));
        let finish = placed(&ctx, "finish");
        assert!(finish.can_user_delete_node(&ctx));
        assert!(finish.can_duplicate_node(&ctx));
    }

    #[test]
    fn test_snapshot_round_trip_gets_fresh_ids() {
        let ctx = ctx();
        let mut node = placed(&ctx, "play_sequence");
        let stop = node.inputs()[1].id;
        node.add_pin_breakpoint(stop);
        node.enable_pin_breakpoint(stop);
        node.on_input_triggered(1, true, &ctx.settings);

        let snapshot = node.prepare_for_copying();
        let (copy, remap) = FlowGraphNode::from_snapshot(&snapshot);
        assert_ne!(copy.id, node.id);
        assert_eq!(names(copy.inputs()), names(node.inputs()));
        let copied_stop = remap[&stop];
        assert_eq!(copy.pin(copied_stop).unwrap().name, "Stop");
        let bp = copy.pin_breakpoint(copied_stop).unwrap();
        assert!(bp.is_enabled());
        assert!(!bp.is_hit());
        assert!(!copy.is_subscribed());
    }
}
