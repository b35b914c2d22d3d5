// SPDX-License-Identifier: MIT OR Apache-2.0
//! Context pins: pins derived from an asset the node references.

use crate::pin::{PinCategory, PinDescriptor, PinOrigin};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Source of pins derived from external assets
pub trait ContextPinSource {
    /// Descriptors contributed by `asset`, or `None` if the asset is unknown
    fn context_pins(&self, asset: &str) -> Option<Vec<PinDescriptor>>;
}

impl<T: ContextPinSource> ContextPinSource for RwLock<T> {
    fn context_pins(&self, asset: &str) -> Option<Vec<PinDescriptor>> {
        self.read().context_pins(asset)
    }
}

/// A named event at a point on a sequence timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMarker {
    /// Time of the event in seconds
    pub time: f32,
    /// Event name
    pub event_name: String,
}

/// Sequence asset with event markers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSequence {
    /// Markers sorted by time
    pub events: Vec<EventMarker>,
}

impl EventSequence {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event marker, keeping markers in time order
    pub fn add_event(&mut self, time: f32, name: impl Into<String>) {
        self.events.push(EventMarker {
            time,
            event_name: name.into(),
        });
        self.events.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Remove every marker with this name
    pub fn remove_event(&mut self, name: &str) {
        self.events.retain(|e| e.event_name != name);
    }

    /// Distinct event names in order of first occurrence
    pub fn event_names(&self) -> IndexSet<&str> {
        self.events.iter().map(|e| e.event_name.as_str()).collect()
    }
}

/// Event sequences keyed by asset name; every distinct event becomes an output pin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSequenceLibrary {
    sequences: IndexMap<String, EventSequence>,
}

impl EventSequenceLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a sequence
    pub fn insert(&mut self, asset: impl Into<String>, sequence: EventSequence) {
        self.sequences.insert(asset.into(), sequence);
    }

    /// Get a sequence for editing
    pub fn sequence_mut(&mut self, asset: &str) -> Option<&mut EventSequence> {
        self.sequences.get_mut(asset)
    }

    /// Remove a sequence
    pub fn remove(&mut self, asset: &str) -> Option<EventSequence> {
        self.sequences.shift_remove(asset)
    }
}

impl ContextPinSource for EventSequenceLibrary {
    fn context_pins(&self, asset: &str) -> Option<Vec<PinDescriptor>> {
        let sequence = self.sequences.get(asset)?;
        Some(
            sequence
                .event_names()
                .into_iter()
                .map(|name| {
                    PinDescriptor::output(name)
                        .with_category(PinCategory::Exec)
                        .with_origin(PinOrigin::Context)
                })
                .collect(),
        )
    }
}
