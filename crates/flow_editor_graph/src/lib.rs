// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flow graph editor core.
//!
//! Keeps editor graph nodes in sync with the runtime nodes they edit:
//! - Pins are regenerated from the runtime node's class on every reconstruction
//! - Links and breakpoints follow pins by name and direction
//! - Recompiled classes and changed context assets trigger reconstruction
//! - Breakpoints can pause a running simulation
//!
//! ## Architecture
//!
//! - [`sync`] is the pure pin synchronizer
//! - [`FlowGraphNode`] owns a runtime node, its pins and its breakpoints
//! - [`FlowGraph`] owns the links and applies pin changes to them
//! - [`EditorContext`] carries the class registry, context source, readiness gate,
//!   recompile notifier, reconstruction queue and settings
//! - [`DebugSessionAdapter`] feeds session events into breakpoints

pub mod binding;
pub mod breakpoint;
pub mod connection;
pub mod context;
pub mod debugger;
pub mod graph;
pub mod node;
pub mod pin;
pub mod reconstruction;
pub mod runtime;
pub mod settings;
pub mod sync;

pub use binding::{AssetReadiness, CompileEvent, RecompileNotifier, Subscription};
pub use breakpoint::{Breakpoint, BreakpointState};
pub use connection::{Connection, ConnectionId, PinRef};
pub use context::{ContextPinSource, EventSequence, EventSequenceLibrary};
pub use debugger::{
    ActivationState, DebugSessionAdapter, NodeInstanceState, PlaySession, SessionEvent,
    SimulationSession,
};
pub use graph::{ClipboardError, ConnectionError, FlowGraph, GraphClipboard, ReconstructionReport};
pub use node::{FlowGraphNode, NodeDiagnostic, NodeId, NodeSnapshot, PinChanges};
pub use pin::{Pin, PinCategory, PinDescriptor, PinDirection, PinId, PinKey, PinOrigin, PinShape};
pub use reconstruction::{ControllerState, EditorContext, ReconstructionQueue, RequestOutcome};
pub use runtime::{create_flow_registry, NodeClass, NodeClassRegistry, RuntimeNode, StaticNodeClass};
pub use settings::{DuplicatePinPolicy, GraphSettings, SettingsError};
