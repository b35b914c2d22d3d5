// SPDX-License-Identifier: MIT OR Apache-2.0
//! Live debugging of a running simulation.
//!
//! This module handles:
//! - Pin trigger notifications from the running session
//! - Breakpoint hits and pausing the session
//! - Clearing hit state when the session resumes or ends
//! - Pin activation forced by the user

use crate::connection::{Connection, PinRef};
use crate::graph::FlowGraph;
use crate::node::NodeId;
use crate::pin::{PinDirection, PinKey};
use crate::reconstruction::EditorContext;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Activation state of a node instance in a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActivationState {
    /// No instance to inspect
    #[default]
    Invalid,
    /// The instance exists but never ran
    NeverActivated,
    /// Running
    Active,
    /// Finished normally
    Completed,
    /// Stopped before finishing
    Aborted,
}

/// What the running session knows about one node instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeInstanceState {
    /// Activation state
    pub activation: ActivationState,
    /// Status text shown while active
    pub status: String,
    /// Whether the node preloaded its content
    pub preloaded: bool,
    /// Object the viewport can focus on
    pub focus_target: Option<String>,
}

/// Event delivered by a running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A pin fired
    PinTriggered {
        /// Node owning the pin
        node: NodeId,
        /// Pin side
        direction: PinDirection,
        /// Index in that side's pin list
        index: usize,
    },
    /// The user resumed a paused session
    Resumed,
    /// The session ended
    Ended,
}

/// A running simulation the editor can inspect and pause
pub trait SimulationSession {
    /// Whether a session is running or paused
    fn is_active(&self) -> bool;

    /// Whether the session is paused
    fn is_paused(&self) -> bool;

    /// Pause the simulated program; the editor keeps running
    fn request_pause(&mut self);

    /// Instance of a node in the inspected run
    fn inspected_instance(&self, node: NodeId) -> Option<&NodeInstanceState>;

    /// Fire a pin outside normal flow. Returns false if the session refused.
    fn activate_pin(&mut self, node: NodeId, pin: &PinKey) -> bool;

    /// Take pending events
    fn poll_events(&mut self) -> Vec<SessionEvent>;
}

/// Play state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    /// Not running
    #[default]
    Stopped,
    /// Running
    Playing,
    /// Paused
    Paused,
}

impl PlayState {
    /// Check if we're in any play mode (playing or paused)
    pub fn is_active(&self) -> bool {
        matches!(self, PlayState::Playing | PlayState::Paused)
    }
}

/// In-editor play session
#[derive(Debug, Default)]
pub struct PlaySession {
    /// Current play state
    pub state: PlayState,
    instances: IndexMap<NodeId, NodeInstanceState>,
    events: Vec<SessionEvent>,
    forced: Vec<(NodeId, PinKey)>,
}

impl PlaySession {
    /// Create a stopped session
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playing. Returns false if already active.
    pub fn play(&mut self) -> bool {
        if self.state.is_active() {
            return false;
        }
        self.state = PlayState::Playing;
        tracing::info!("Simulation started");
        true
    }

    /// Resume after a pause
    pub fn resume(&mut self) -> bool {
        if self.state != PlayState::Paused {
            return false;
        }
        self.state = PlayState::Playing;
        self.events.push(SessionEvent::Resumed);
        tracing::info!("Simulation resumed");
        true
    }

    /// Stop the session and forget every instance
    pub fn stop(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.state = PlayState::Stopped;
        self.instances.clear();
        self.events.push(SessionEvent::Ended);
        tracing::info!("Simulation ended");
        true
    }

    /// Report a pin firing in the running program
    pub fn trigger(&mut self, node: NodeId, direction: PinDirection, index: usize) {
        if self.state == PlayState::Playing {
            self.events.push(SessionEvent::PinTriggered {
                node,
                direction,
                index,
            });
        }
    }

    /// Record the state of a node instance
    pub fn set_instance(&mut self, node: NodeId, instance: NodeInstanceState) {
        self.instances.insert(node, instance);
    }

    /// Pins activated by the user so far
    pub fn forced_activations(&self) -> &[(NodeId, PinKey)] {
        &self.forced
    }
}

impl SimulationSession for PlaySession {
    fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn is_paused(&self) -> bool {
        self.state == PlayState::Paused
    }

    fn request_pause(&mut self) {
        if self.state == PlayState::Playing {
            self.state = PlayState::Paused;
            tracing::info!("Simulation paused");
        }
    }

    fn inspected_instance(&self, node: NodeId) -> Option<&NodeInstanceState> {
        self.instances.get(&node)
    }

    fn activate_pin(&mut self, node: NodeId, pin: &PinKey) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.forced.push((node, pin.clone()));
        true
    }

    fn poll_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Connects a running session to the breakpoints of a graph
#[derive(Debug)]
pub struct DebugSessionAdapter<S: SimulationSession> {
    session: S,
    paused_by: IndexSet<NodeId>,
    severed: Vec<(NodeId, Vec<Connection>)>,
}

impl<S: SimulationSession> DebugSessionAdapter<S> {
    /// Wrap a session
    pub fn new(session: S) -> Self {
        Self {
            session,
            paused_by: IndexSet::new(),
            severed: Vec::new(),
        }
    }

    /// The wrapped session
    pub fn session(&self) -> &S {
        &self.session
    }

    /// The wrapped session, mutably
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Nodes whose breakpoints paused the session and wait for resume
    pub fn paused_by(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.paused_by.iter().copied()
    }

    /// Take the links cut by reconstructions this adapter ran before resolving triggers
    pub fn take_severed_links(&mut self) -> Vec<(NodeId, Vec<Connection>)> {
        std::mem::take(&mut self.severed)
    }

    /// Handle every pending session event. Returns true if the session was paused.
    pub fn pump(&mut self, graph: &mut FlowGraph, ctx: &EditorContext) -> bool {
        let mut paused = false;
        for event in self.session.poll_events() {
            paused |= self.handle(graph, ctx, event);
        }
        paused
    }

    /// Handle one session event. Returns true if it paused the session.
    pub fn handle(
        &mut self,
        graph: &mut FlowGraph,
        ctx: &EditorContext,
        event: SessionEvent,
    ) -> bool {
        match event {
            SessionEvent::PinTriggered {
                node,
                direction,
                index,
            } => self.on_pin_triggered(graph, ctx, node, direction, index),
            SessionEvent::Resumed => {
                self.reset_paused_nodes(graph);
                false
            }
            SessionEvent::Ended => {
                self.paused_by.clear();
                graph.reset_breakpoints();
                false
            }
        }
    }

    /// A pin fired; hit matching breakpoints and pause if any was armed
    pub fn on_pin_triggered(
        &mut self,
        graph: &mut FlowGraph,
        ctx: &EditorContext,
        node_id: NodeId,
        direction: PinDirection,
        index: usize,
    ) -> bool {
        // Indices must resolve against fully reconstructed pins.
        let report = graph.flush_reconstructions(ctx);
        self.severed.extend(report.severed);
        if ctx.queue.is_pending(node_id) {
            tracing::warn!("Trigger on {node_id:?} ignored, its reconstruction waits for assets");
            return false;
        }

        let active = self.session.is_active();
        let Some(node) = graph.node_mut(node_id) else {
            tracing::warn!("Trigger for unknown node {node_id:?} ignored");
            return false;
        };
        let pause = match direction {
            PinDirection::Input => node.on_input_triggered(index, active, &ctx.settings),
            PinDirection::Output => node.on_output_triggered(index, active, &ctx.settings),
        };
        if pause {
            self.paused_by.insert(node_id);
            self.session.request_pause();
            tracing::info!("Breakpoint hit on {node_id:?}, pausing session");
        }
        pause
    }

    /// Fire a pin on the inspected instance outside normal flow
    pub fn force_pin_activation(&mut self, graph: &FlowGraph, pin: PinRef) -> bool {
        if !self.session.is_active() {
            return false;
        }
        let key = graph.node(pin.node).and_then(|n| n.pin(pin.pin)).map(|p| p.key());
        let Some(key) = key else {
            tracing::warn!("Forced activation of unknown pin {pin:?} ignored");
            return false;
        };
        self.session.activate_pin(pin.node, &key)
    }

    fn reset_paused_nodes(&mut self, graph: &mut FlowGraph) {
        for node_id in self.paused_by.drain(..) {
            if let Some(node) = graph.node_mut(node_id) {
                node.reset_breakpoints();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::AssetReadiness;
    use crate::breakpoint::BreakpointState;
    use crate::node::FlowGraphNode;
    use crate::pin::{PinDescriptor, PinId};
    use crate::runtime::{create_flow_registry, NodeCategory, RuntimeNode, StaticNodeClass};
    use std::sync::Arc;

    #[test]
    fn test_play_session_lifecycle() {
        let mut session = PlaySession::new();
        assert!(!session.is_active());
        assert!(session.play());
        assert!(!session.play());
        session.request_pause();
        assert!(session.is_paused());
        assert!(session.resume());
        assert!(session.stop());
        assert_eq!(
            session.poll_events(),
            vec![SessionEvent::Resumed, SessionEvent::Ended]
        );
    }

    #[test]
    fn test_triggers_only_while_playing() {
        let mut session = PlaySession::new();
        let node = NodeId::new();
        session.trigger(node, PinDirection::Input, 0);
        assert!(session.poll_events().is_empty());
        session.play();
        session.trigger(node, PinDirection::Input, 0);
        assert_eq!(session.poll_events().len(), 1);
    }

    #[test]
    fn test_activate_pin_requires_active_session() {
        let mut session = PlaySession::new();
        let node = NodeId::new();
        let key = PinKey::new("In", PinDirection::Input);
        assert!(!session.activate_pin(node, &key));
        session.play();
        assert!(session.activate_pin(node, &key));
        assert_eq!(session.forced_activations(), &[(node, key)]);
    }

    fn setup() -> (FlowGraph, EditorContext, NodeId) {
        let ctx =
            EditorContext::new(create_flow_registry()).with_readiness(AssetReadiness::loaded());
        let mut graph = FlowGraph::default();
        let runtime = RuntimeNode::new("play_sequence");
        let node = graph.add_placed_node(&ctx, FlowGraphNode::new(runtime));
        (graph, ctx, node)
    }

    fn arm(graph: &mut FlowGraph, node: NodeId, direction: PinDirection, index: usize) -> PinId {
        let n = graph.node_mut(node).unwrap();
        let pin = n.pin_at(direction, index).unwrap().id;
        n.add_pin_breakpoint(pin);
        n.enable_pin_breakpoint(pin);
        pin
    }

    fn state(
        graph: &FlowGraph,
        node: NodeId,
        name: &str,
        direction: PinDirection,
    ) -> BreakpointState {
        let n = graph.node(node).unwrap();
        let pin = n.find_pin(name, direction).unwrap().id;
        n.pin_breakpoint(pin).map_or(BreakpointState::NoBreakpoint, |bp| bp.state())
    }

    #[test]
    fn test_hit_pauses_session() {
        let (mut graph, ctx, node) = setup();
        arm(&mut graph, node, PinDirection::Output, 1);
        let mut adapter = DebugSessionAdapter::new(PlaySession::new());
        adapter.session_mut().play();

        adapter.session_mut().trigger(node, PinDirection::Output, 0);
        assert!(!adapter.pump(&mut graph, &ctx));
        assert!(!adapter.session().is_paused());

        adapter.session_mut().trigger(node, PinDirection::Output, 1);
        assert!(adapter.pump(&mut graph, &ctx));
        assert!(adapter.session().is_paused());
        assert_eq!(adapter.paused_by().collect::<Vec<_>>(), vec![node]);
        assert_eq!(state(&graph, node, "Completed", PinDirection::Output), BreakpointState::Hit);
    }

    #[test]
    fn test_inactive_session_never_hits() {
        let (mut graph, ctx, node) = setup();
        arm(&mut graph, node, PinDirection::Input, 0);
        let mut adapter = DebugSessionAdapter::new(PlaySession::new());
        assert!(!adapter.on_pin_triggered(&mut graph, &ctx, node, PinDirection::Input, 0));
        assert_eq!(state(&graph, node, "Start", PinDirection::Input), BreakpointState::Enabled);
    }

    #[test]
    fn test_resume_and_end_clear_hits() {
        let (mut graph, ctx, node) = setup();
        arm(&mut graph, node, PinDirection::Input, 1);
        let mut adapter = DebugSessionAdapter::new(PlaySession::new());
        adapter.session_mut().play();
        assert!(adapter.on_pin_triggered(&mut graph, &ctx, node, PinDirection::Input, 1));

        adapter.session_mut().resume();
        adapter.pump(&mut graph, &ctx);
        assert_eq!(state(&graph, node, "Stop", PinDirection::Input), BreakpointState::Enabled);
        assert_eq!(adapter.paused_by().count(), 0);

        adapter.on_pin_triggered(&mut graph, &ctx, node, PinDirection::Input, 1);
        adapter.session_mut().stop();
        adapter.pump(&mut graph, &ctx);
        assert_eq!(state(&graph, node, "Stop", PinDirection::Input), BreakpointState::Enabled);
    }

    #[test]
    fn test_trigger_resolves_against_rebuilt_pins() {
        let (mut graph, ctx, node) = setup();
        let mut adapter = DebugSessionAdapter::new(PlaySession::new());
        adapter.session_mut().play();

        // A new input appears ahead of the armed one once the node is rebuilt.
        let stop = arm(&mut graph, node, PinDirection::Input, 1);
        let extra = graph
            .node_mut(node)
            .unwrap()
            .create_input_pin(PinDescriptor::input("Pause"), Some(0));
        assert!(extra.is_some());
        graph.node_mut(node).unwrap().add_instance_pin(PinDirection::Input, "Skip");
        graph.request_reconstruction(&ctx, node);

        // After the rebuild the order is Start, Stop, Skip.
        assert!(adapter.on_pin_triggered(&mut graph, &ctx, node, PinDirection::Input, 1));
        assert!(ctx.queue.is_empty());
        let n = graph.node(node).unwrap();
        assert_eq!(n.inputs()[1].name, "Stop");
        assert_ne!(n.inputs()[1].id, stop);
        assert!(!adapter.on_pin_triggered(&mut graph, &ctx, node, PinDirection::Input, 3));
    }

    #[test]
    fn test_trigger_waits_for_assets() {
        let (mut graph, mut ctx, _) = setup();
        let start = graph.place_node(&ctx, "start", [0.0, 0.0], None).unwrap();
        let finish = graph.place_node(&ctx, "finish", [200.0, 0.0], None).unwrap();
        let out = graph.node(start).unwrap().outputs()[0].id;
        let in_pin = graph.node(finish).unwrap().inputs()[0].id;
        graph.connect(PinRef::new(start, out), PinRef::new(finish, in_pin)).unwrap();
        arm(&mut graph, finish, PinDirection::Input, 0);
        let mut adapter = DebugSessionAdapter::new(PlaySession::new());
        adapter.session_mut().play();

        ctx.readiness.begin_load();
        let recompiled =
            StaticNodeClass::new("finish", "Finish", NodeCategory::Graph).input("Done");
        ctx.registry.recompile(Arc::new(recompiled), &ctx.notifier);
        assert!(graph.process_external_changes(&ctx).is_empty());

        assert!(!adapter.on_pin_triggered(&mut graph, &ctx, finish, PinDirection::Input, 0));
        let n = graph.node(finish).unwrap();
        assert_eq!(n.inputs()[0].name, "In");
        assert_eq!(n.reconstruction_count(), 1);
        assert!(ctx.queue.is_pending(finish));
        assert!(!adapter.session().is_paused());
        assert!(adapter.take_severed_links().is_empty());

        graph.on_assets_loaded(&ctx);
        assert_eq!(graph.node(finish).unwrap().inputs()[0].name, "Done");
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_trigger_reports_links_cut_by_its_flush() {
        let (mut graph, mut ctx, _) = setup();
        let start = graph.place_node(&ctx, "start", [0.0, 0.0], None).unwrap();
        let finish = graph.place_node(&ctx, "finish", [200.0, 0.0], None).unwrap();
        let out = graph.node(start).unwrap().outputs()[0].id;
        let in_pin = graph.node(finish).unwrap().inputs()[0].id;
        graph.connect(PinRef::new(start, out), PinRef::new(finish, in_pin)).unwrap();
        let mut adapter = DebugSessionAdapter::new(PlaySession::new());
        adapter.session_mut().play();

        let recompiled =
            StaticNodeClass::new("finish", "Finish", NodeCategory::Graph).input("Done");
        ctx.registry.recompile(Arc::new(recompiled), &ctx.notifier);
        for node in [start, finish] {
            if graph.node_mut(node).unwrap().process_external_changes() {
                graph.request_reconstruction(&ctx, node);
            }
        }

        assert!(!adapter.on_pin_triggered(&mut graph, &ctx, finish, PinDirection::Input, 0));
        let severed = adapter.take_severed_links();
        assert_eq!(severed.len(), 1);
        assert_eq!(severed[0].0, finish);
        assert_eq!(severed[0].1[0].from, PinRef::new(start, out));
        assert!(adapter.take_severed_links().is_empty());
    }

    #[test]
    fn test_force_pin_activation() {
        let (graph, _ctx, node) = setup();
        let pin = graph.node(node).unwrap().inputs()[0].id;
        let mut adapter = DebugSessionAdapter::new(PlaySession::new());
        assert!(!adapter.force_pin_activation(&graph, PinRef::new(node, pin)));

        adapter.session_mut().play();
        assert!(adapter.force_pin_activation(&graph, PinRef::new(node, pin)));
        assert!(!adapter.force_pin_activation(&graph, PinRef::new(node, PinId::new())));
        assert_eq!(
            adapter.session().forced_activations(),
            &[(node, PinKey::new("Start", PinDirection::Input))]
        );
    }
}
