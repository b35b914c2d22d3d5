// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime node definitions and the class registry.
//!
//! A [`RuntimeNode`] is the data a graph node edits. Its class, looked up in the
//! [`NodeClassRegistry`], decides which pins the node needs. That decision may read
//! the node's configuration, so it is re-evaluated on every reconstruction.

use crate::binding::RecompileNotifier;
use crate::pin::{PinCategory, PinDescriptor, PinDirection, PinOrigin, PinShape};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Node class category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Graph entry and exit points
    Graph,
    /// Flow routing (branches, gates, sequences)
    Route,
    /// Nodes driven by external events
    Events,
    /// Logic operators
    Operators,
    /// Nodes that act on the world
    World,
    /// Utility nodes
    Utility,
    /// Custom/user-defined
    Custom,
}

/// Configuration value stored on a runtime node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String or name
    String(String),
}

impl ConfigValue {
    /// Integer payload, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
        }
    }
}

/// The runtime node a graph node owns and edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeNode {
    /// Class ID in the registry
    pub class: String,
    /// Configuration fields
    #[serde(default)]
    pub config: IndexMap<String, ConfigValue>,
    /// Input pins added by the user
    #[serde(default)]
    pub user_inputs: Vec<String>,
    /// Output pins added by the user
    #[serde(default)]
    pub user_outputs: Vec<String>,
    /// External asset that contributes context pins
    #[serde(default)]
    pub context_asset: Option<String>,
}

impl RuntimeNode {
    /// Create a node of the given class with no configuration
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            config: IndexMap::new(),
            user_inputs: Vec::new(),
            user_outputs: Vec::new(),
            context_asset: None,
        }
    }

    /// Builder-style configuration
    pub fn with_config(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Builder-style context asset
    pub fn with_context_asset(mut self, asset: impl Into<String>) -> Self {
        self.context_asset = Some(asset.into());
        self
    }

    /// Set a configuration field
    pub fn set_config(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.config.insert(key.into(), value);
    }

    /// Read a configuration field
    pub fn config(&self, key: &str) -> Option<&ConfigValue> {
        self.config.get(key)
    }

    /// User pins in one direction
    pub fn user_pins(&self, direction: PinDirection) -> &[String] {
        match direction {
            PinDirection::Input => &self.user_inputs,
            PinDirection::Output => &self.user_outputs,
        }
    }

    /// Record a user pin
    pub fn add_user_pin(&mut self, direction: PinDirection, name: impl Into<String>) {
        let name = name.into();
        match direction {
            PinDirection::Input => self.user_inputs.push(name),
            PinDirection::Output => self.user_outputs.push(name),
        }
    }

    /// Forget a user pin, returning whether it existed
    pub fn remove_user_pin(&mut self, direction: PinDirection, name: &str) -> bool {
        let pins = match direction {
            PinDirection::Input => &mut self.user_inputs,
            PinDirection::Output => &mut self.user_outputs,
        };
        let before = pins.len();
        pins.retain(|p| p != name);
        pins.len() != before
    }

    /// Short summary of the configuration, one `key: value` line per field
    pub fn config_summary(&self) -> String {
        self.config
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Definition of a runtime node class
pub trait NodeClass: Send + Sync {
    /// Unique class identifier
    fn id(&self) -> &str;

    /// Display name
    fn display_name(&self) -> &str;

    /// Palette category
    fn category(&self) -> NodeCategory {
        NodeCategory::Utility
    }

    /// Pins every node of this class has, given its configuration.
    /// User and context pins are added on top by the caller.
    fn default_pins(&self, node: &RuntimeNode) -> PinShape;

    /// Whether users may add numbered inputs
    fn can_user_add_input(&self) -> bool {
        false
    }

    /// Whether users may add numbered outputs
    fn can_user_add_output(&self) -> bool {
        false
    }

    /// Whether pins are also derived from the node's context asset
    fn supports_context_pins(&self) -> bool {
        false
    }

    /// Whether users may delete nodes of this class
    fn can_user_delete(&self) -> bool {
        true
    }

    /// Whether nodes of this class may be duplicated
    fn can_duplicate(&self) -> bool {
        true
    }

    /// Short summary of a node's content
    fn node_description(&self, node: &RuntimeNode) -> String {
        node.config_summary()
    }
}

/// A node class with a fixed pin layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticNodeClass {
    /// Unique class identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Default input pins
    pub inputs: Vec<PinDescriptor>,
    /// Default output pins
    pub outputs: Vec<PinDescriptor>,
    /// Users may add inputs
    pub user_inputs: bool,
    /// Users may add outputs
    pub user_outputs: bool,
    /// Pins come from the context asset too
    pub context_pins: bool,
    /// Users may delete the node
    pub deletable: bool,
    /// The node may be duplicated
    pub duplicable: bool,
}

impl StaticNodeClass {
    /// Create a class with no pins
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: NodeCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            user_inputs: false,
            user_outputs: false,
            context_pins: false,
            deletable: true,
            duplicable: true,
        }
    }

    /// Add a default exec input
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(PinDescriptor::input(name).with_category(PinCategory::Exec));
        self
    }

    /// Add a default exec output
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(PinDescriptor::output(name).with_category(PinCategory::Exec));
        self
    }

    /// Allow user-added inputs and outputs
    pub fn user_extensible(mut self, inputs: bool, outputs: bool) -> Self {
        self.user_inputs = inputs;
        self.user_outputs = outputs;
        self
    }

    /// Derive extra pins from the context asset
    pub fn with_context_pins(mut self) -> Self {
        self.context_pins = true;
        self
    }

    /// Forbid deletion and duplication, as for graph entry points
    pub fn undeletable(mut self) -> Self {
        self.deletable = false;
        self.duplicable = false;
        self
    }
}

impl NodeClass for StaticNodeClass {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> NodeCategory {
        self.category
    }

    fn default_pins(&self, _node: &RuntimeNode) -> PinShape {
        PinShape {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }

    fn can_user_add_input(&self) -> bool {
        self.user_inputs
    }

    fn can_user_add_output(&self) -> bool {
        self.user_outputs
    }

    fn supports_context_pins(&self) -> bool {
        self.context_pins
    }

    fn can_user_delete(&self) -> bool {
        self.deletable
    }

    fn can_duplicate(&self) -> bool {
        self.duplicable
    }

    fn node_description(&self, node: &RuntimeNode) -> String {
        let summary = node.config_summary();
        if summary.is_empty() {
            self.description.clone()
        } else {
            summary
        }
    }
}

/// Pins a class requests for a node, including user pins, in display order
pub fn class_shape(class: &dyn NodeClass, node: &RuntimeNode) -> PinShape {
    let mut shape = class.default_pins(node);
    if class.can_user_add_input() {
        shape.extend(node.user_inputs.iter().map(|name| {
            PinDescriptor::input(name.clone()).with_origin(PinOrigin::User)
        }));
    }
    if class.can_user_add_output() {
        shape.extend(node.user_outputs.iter().map(|name| {
            PinDescriptor::output(name.clone()).with_origin(PinOrigin::User)
        }));
    }
    shape
}

/// Registry of available node classes
#[derive(Default, Clone)]
pub struct NodeClassRegistry {
    classes: IndexMap<String, Arc<dyn NodeClass>>,
}

impl NodeClassRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node class, replacing any class with the same ID
    pub fn register(&mut self, class: impl NodeClass + 'static) {
        self.register_shared(Arc::new(class));
    }

    /// Register an already shared node class
    pub fn register_shared(&mut self, class: Arc<dyn NodeClass>) {
        self.classes.insert(class.id().to_string(), class);
    }

    /// Resolve a class by ID
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn NodeClass>> {
        self.classes.get(id).cloned()
    }

    /// Check if a class is registered
    pub fn contains(&self, id: &str) -> bool {
        self.classes.contains_key(id)
    }

    /// Remove a class, as when its definition fails to load
    pub fn unregister(&mut self, id: &str) -> Option<Arc<dyn NodeClass>> {
        self.classes.shift_remove(id)
    }

    /// Get all registered class IDs
    pub fn class_ids(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Get classes by category
    pub fn classes_in_category(
        &self,
        category: NodeCategory,
    ) -> impl Iterator<Item = &Arc<dyn NodeClass>> {
        self.classes.values().filter(move |c| c.category() == category)
    }

    /// Create a runtime node of a registered class
    pub fn instantiate(&self, id: &str) -> Option<RuntimeNode> {
        self.classes.get(id).map(|c| RuntimeNode::new(c.id()))
    }

    /// Replace a class definition in place, notifying subscribers before and after
    pub fn recompile(&mut self, class: Arc<dyn NodeClass>, notifier: &RecompileNotifier) {
        let id = class.id().to_string();
        notifier.notify_pre_compile(&id);
        self.register_shared(class);
        notifier.notify_post_compile();
        tracing::info!("Recompiled node class {id}");
    }
}

impl fmt::Debug for NodeClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeClassRegistry")
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Classes every flow graph can use
pub fn create_flow_registry() -> NodeClassRegistry {
    let mut registry = NodeClassRegistry::new();

    registry.register(
        StaticNodeClass::new("start", "Start", NodeCategory::Graph)
            .output("Out")
            .undeletable(),
    );

    registry.register(StaticNodeClass::new("finish", "Finish", NodeCategory::Graph).input("In"));

    registry.register(
        StaticNodeClass::new("sequence", "Sequence", NodeCategory::Route)
            .input("In")
            .user_extensible(false, true),
    );

    registry.register(
        StaticNodeClass::new("logical_and", "AND", NodeCategory::Operators)
            .output("Out")
            .user_extensible(true, false),
    );

    registry.register(
        StaticNodeClass::new("play_sequence", "Play Sequence", NodeCategory::World)
            .input("Start")
            .input("Stop")
            .output("Out")
            .output("Completed")
            .with_context_pins(),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolve_and_instantiate() {
        let registry = create_flow_registry();
        assert!(registry.contains("start"));
        let node = registry.instantiate("sequence").unwrap();
        assert_eq!(node.class, "sequence");
        assert!(registry.instantiate("missing").is_none());
    }

    #[test]
    fn test_class_shape_appends_user_pins() {
        let registry = create_flow_registry();
        let class = registry.resolve("sequence").unwrap();
        let mut node = RuntimeNode::new("sequence");
        node.add_user_pin(PinDirection::Output, "0");
        node.add_user_pin(PinDirection::Output, "1");
        // Not user-extensible on inputs, so this one is ignored.
        node.add_user_pin(PinDirection::Input, "x");

        let shape = class_shape(class.as_ref(), &node);
        assert_eq!(shape.inputs.len(), 1);
        let names: Vec<_> = shape.outputs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["0", "1"]);
        assert!(shape.outputs.iter().all(|d| d.origin == PinOrigin::User));
    }

    #[test]
    fn test_remove_user_pin() {
        let mut node = RuntimeNode::new("sequence");
        node.add_user_pin(PinDirection::Output, "0");
        assert!(node.remove_user_pin(PinDirection::Output, "0"));
        assert!(!node.remove_user_pin(PinDirection::Output, "0"));
    }

    #[test]
    fn test_description_prefers_config() {
        let registry = create_flow_registry();
        let class = registry.resolve("finish").unwrap();
        let node = RuntimeNode::new("finish").with_config("Delay", ConfigValue::Float(1.5));
        assert_eq!(class.node_description(&node), "Delay: 1.5");
    }
}
