// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin definitions for flow node inputs/outputs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a pin
///
/// Pins are recreated on every reconstruction, so a `PinId` is only stable
/// between two reconstruction passes. Use [`PinKey`] for identity that
/// survives reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinId(pub Uuid);

impl PinId {
    /// Create a new random pin ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PinId {
    fn default() -> Self {
        Self::new()
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    /// Input pin
    Input,
    /// Output pin
    Output,
}

impl PinDirection {
    /// The direction a pin must have to link with this one
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

/// Semantic category of a pin
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinCategory {
    /// Execution flow
    Exec,
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// String value
    String,
    /// Object reference
    Object,
    /// Any type (for generic nodes)
    Any,
    /// Custom type
    Custom(String),
}

impl PinCategory {
    /// Check if this category can link to another category
    pub fn can_link_to(&self, other: &PinCategory) -> bool {
        if matches!(self, Self::Any) || matches!(other, Self::Any) {
            return true;
        }
        if self == other {
            return true;
        }
        matches!((self, other), (Self::Int, Self::Float) | (Self::Float, Self::Int))
    }
}

/// Where a pin came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PinOrigin {
    /// Declared by the node class
    #[default]
    Default,
    /// Added by the user on a user-extensible node
    User,
    /// Derived from the node's context asset
    Context,
    /// Added to this graph node only
    Instance,
}

/// Identity of a pin for rewiring purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinKey {
    /// Pin name
    pub name: String,
    /// Pin direction
    pub direction: PinDirection,
}

impl PinKey {
    /// Create a new pin key
    pub fn new(name: impl Into<String>, direction: PinDirection) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }
}

/// Description of a connection point requested by a runtime node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinDescriptor {
    /// Pin name
    pub name: String,
    /// Pin direction
    pub direction: PinDirection,
    /// Semantic category; `None` is treated as [`PinCategory::Exec`]
    pub category: Option<PinCategory>,
    /// Where the descriptor came from
    #[serde(default)]
    pub origin: PinOrigin,
}

impl PinDescriptor {
    /// Create a new input descriptor
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PinDirection::Input,
            category: None,
            origin: PinOrigin::Default,
        }
    }

    /// Create a new output descriptor
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PinDirection::Output,
            category: None,
            origin: PinOrigin::Default,
        }
    }

    /// Set the category
    pub fn with_category(mut self, category: PinCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set the origin
    pub fn with_origin(mut self, origin: PinOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Identity used for rewiring
    pub fn key(&self) -> PinKey {
        PinKey::new(self.name.clone(), self.direction)
    }
}

/// A pin on a graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    /// Unique pin ID
    pub id: PinId,
    /// Pin name
    pub name: String,
    /// Pin direction
    pub direction: PinDirection,
    /// Data category
    pub category: PinCategory,
    /// Where the pin came from
    pub origin: PinOrigin,
}

impl Pin {
    /// Create a fresh pin from a descriptor
    pub fn from_descriptor(descriptor: &PinDescriptor) -> Self {
        Self {
            id: PinId::new(),
            name: descriptor.name.clone(),
            direction: descriptor.direction,
            category: descriptor.category.clone().unwrap_or(PinCategory::Exec),
            origin: descriptor.origin,
        }
    }

    /// Identity used for rewiring
    pub fn key(&self) -> PinKey {
        PinKey::new(self.name.clone(), self.direction)
    }

    /// Check if this pin matches a name and direction
    pub fn matches(&self, name: &str, direction: PinDirection) -> bool {
        self.direction == direction && self.name == name
    }

    /// Whether more than one connection may be attached
    ///
    /// Flow outputs fire a single continuation, inputs may be reached from many places.
    pub fn multi_connect(&self) -> bool {
        self.direction == PinDirection::Input
    }

    /// Check if a link to another pin is valid
    pub fn can_link(&self, other: &Pin) -> bool {
        if self.direction == other.direction {
            return false;
        }
        self.category.can_link_to(&other.category)
    }
}

/// Ordered pin descriptors demanded by a runtime node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinShape {
    /// Input descriptors in display order
    pub inputs: Vec<PinDescriptor>,
    /// Output descriptors in display order
    pub outputs: Vec<PinDescriptor>,
}

impl PinShape {
    /// Create an empty shape
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style input
    pub fn with_input(mut self, descriptor: PinDescriptor) -> Self {
        self.push(descriptor);
        self
    }

    /// Builder-style output
    pub fn with_output(mut self, descriptor: PinDescriptor) -> Self {
        self.push(descriptor);
        self
    }

    /// Append a descriptor to the list matching its direction
    pub fn push(&mut self, descriptor: PinDescriptor) {
        match descriptor.direction {
            PinDirection::Input => self.inputs.push(descriptor),
            PinDirection::Output => self.outputs.push(descriptor),
        }
    }

    /// Append every descriptor of `other`
    pub fn extend(&mut self, other: impl IntoIterator<Item = PinDescriptor>) {
        for descriptor in other {
            self.push(descriptor);
        }
    }

    /// Descriptors for one direction
    pub fn side(&self, direction: PinDirection) -> &[PinDescriptor] {
        match direction {
            PinDirection::Input => &self.inputs,
            PinDirection::Output => &self.outputs,
        }
    }

    /// Check whether a descriptor with this identity is present
    pub fn contains(&self, name: &str, direction: PinDirection) -> bool {
        self.side(direction).iter().any(|d| d.name == name)
    }

    /// Total descriptor count
    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    /// Check if the shape has no pins
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}
