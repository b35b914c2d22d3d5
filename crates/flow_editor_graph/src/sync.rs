// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin synchronization: regenerate pins from a shape and carry links over by name.
//!
//! Pins are never patched in place. Every pass builds a fresh pin for each requested
//! descriptor; when an old pin has the same name and direction, the new pin takes
//! over its links. Old pins without a match are orphaned and lose their links.
//! A renamed pin is therefore a removal plus an addition.
//!
//! Everything here is pure. Applying the result to connections is the graph's job.

use crate::pin::{Pin, PinDescriptor, PinDirection, PinId, PinKey, PinShape};
use std::collections::{HashMap, HashSet};

/// Result of synchronizing one direction
#[derive(Debug, Clone, Default)]
pub struct PinSync {
    /// New pins, in descriptor order
    pub pins: Vec<Pin>,
    /// Old pin -> new pin, for every pin that survived
    pub carried: Vec<(PinId, PinId)>,
    /// Old pins with no matching descriptor
    pub orphaned: Vec<Pin>,
    /// Descriptors dropped because their name was already taken
    pub duplicates: Vec<PinDescriptor>,
}

/// Result of synchronizing both directions
#[derive(Debug, Clone, Default)]
pub struct ShapeSync {
    /// Input side
    pub inputs: PinSync,
    /// Output side
    pub outputs: PinSync,
}

impl ShapeSync {
    /// Old pin -> new pin for both directions
    pub fn remap(&self) -> HashMap<PinId, PinId> {
        self.inputs
            .carried
            .iter()
            .chain(&self.outputs.carried)
            .copied()
            .collect()
    }

    /// Orphaned pins of both directions
    pub fn orphaned(&self) -> impl Iterator<Item = &Pin> {
        self.inputs.orphaned.iter().chain(&self.outputs.orphaned)
    }

    /// Dropped duplicate descriptors of both directions
    pub fn duplicates(&self) -> impl Iterator<Item = &PinDescriptor> {
        self.inputs.duplicates.iter().chain(&self.outputs.duplicates)
    }
}

/// Split descriptors into the first occurrence of each name and the later repeats
pub fn dedupe_descriptors(
    descriptors: &[PinDescriptor],
) -> (Vec<PinDescriptor>, Vec<PinDescriptor>) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(descriptors.len());
    let mut duplicates = Vec::new();
    for descriptor in descriptors {
        if seen.insert(descriptor.key()) {
            kept.push(descriptor.clone());
        } else {
            duplicates.push(descriptor.clone());
        }
    }
    (kept, duplicates)
}

/// Names requested more than once in the same direction
pub fn duplicate_keys(shape: &PinShape) -> Vec<PinKey> {
    let (_, inputs) = dedupe_descriptors(&shape.inputs);
    let (_, outputs) = dedupe_descriptors(&shape.outputs);
    inputs.iter().chain(&outputs).map(PinDescriptor::key).collect()
}

/// Build the pins of one direction from `descriptors`, inheriting identity from `old`.
///
/// Descriptors whose direction differs from `direction` are ignored.
pub fn synchronize_pins(
    direction: PinDirection,
    old: &[Pin],
    descriptors: &[PinDescriptor],
) -> PinSync {
    let requested: Vec<PinDescriptor> = descriptors
        .iter()
        .filter(|d| d.direction == direction)
        .cloned()
        .collect();
    let (requested, duplicates) = dedupe_descriptors(&requested);

    let mut by_name: HashMap<&str, &Pin> = HashMap::new();
    for pin in old.iter().filter(|p| p.direction == direction) {
        by_name.entry(pin.name.as_str()).or_insert(pin);
    }

    let mut pins = Vec::with_capacity(requested.len());
    let mut carried = Vec::new();
    let mut matched = HashSet::new();
    for descriptor in &requested {
        let pin = Pin::from_descriptor(descriptor);
        if let Some(old_pin) = by_name.get(descriptor.name.as_str()) {
            carried.push((old_pin.id, pin.id));
            matched.insert(old_pin.id);
        }
        pins.push(pin);
    }

    let orphaned = old
        .iter()
        .filter(|p| p.direction == direction && !matched.contains(&p.id))
        .cloned()
        .collect();

    PinSync {
        pins,
        carried,
        orphaned,
        duplicates,
    }
}

/// Synchronize inputs and outputs independently
pub fn synchronize_shape(old_inputs: &[Pin], old_outputs: &[Pin], shape: &PinShape) -> ShapeSync {
    ShapeSync {
        inputs: synchronize_pins(PinDirection::Input, old_inputs, &shape.inputs),
        outputs: synchronize_pins(PinDirection::Output, old_outputs, &shape.outputs),
    }
}
