// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin and node breakpoints.
//!
//! A breakpoint moves between four states:
//!
//! - `NoBreakpoint` -> `Disabled` via [`Breakpoint::add`]
//! - `Disabled` -> `Enabled` via [`Breakpoint::enable`]
//! - `Enabled | Hit` -> `Disabled` via [`Breakpoint::disable`]
//! - `Enabled` -> `Hit` via [`Breakpoint::hit`], only while a session is active
//! - any -> `NoBreakpoint` via [`Breakpoint::remove`]
//!
//! Only existence and the enabled flag are persisted; hit state lives for one session.

use serde::{Deserialize, Serialize};

/// Observable breakpoint state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakpointState {
    /// No breakpoint placed
    #[default]
    NoBreakpoint,
    /// Placed but not armed
    Disabled,
    /// Armed
    Enabled,
    /// Armed and triggered during the current session
    Hit,
}

/// Breakpoint attached to a pin or to a whole node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Breakpoint {
    has_breakpoint: bool,
    enabled: bool,
    #[serde(skip)]
    hit: bool,
}

impl Breakpoint {
    /// Create an empty breakpoint slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> BreakpointState {
        match (self.has_breakpoint, self.enabled, self.hit) {
            (false, _, _) => BreakpointState::NoBreakpoint,
            (true, false, _) => BreakpointState::Disabled,
            (true, true, false) => BreakpointState::Enabled,
            (true, true, true) => BreakpointState::Hit,
        }
    }

    /// Place a breakpoint; the enabled flag is left as it was
    pub fn add(&mut self) {
        self.has_breakpoint = true;
    }

    /// Remove the breakpoint, clearing every flag
    pub fn remove(&mut self) {
        self.has_breakpoint = false;
        self.enabled = false;
        self.hit = false;
    }

    /// Whether a breakpoint is placed
    pub fn has_breakpoint(&self) -> bool {
        self.has_breakpoint
    }

    /// Arm the breakpoint. Returns false and leaves state untouched when not allowed.
    pub fn enable(&mut self) -> bool {
        if !self.can_enable() {
            return false;
        }
        self.enabled = true;
        true
    }

    /// Whether [`Breakpoint::enable`] would succeed
    pub fn can_enable(&self) -> bool {
        self.has_breakpoint && !self.enabled
    }

    /// Disarm the breakpoint and clear its hit flag
    pub fn disable(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.enabled = false;
        self.hit = false;
        true
    }

    /// Whether the breakpoint is armed
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable if placed and disarmed, otherwise disable
    pub fn toggle(&mut self) -> bool {
        if self.can_enable() {
            self.enable()
        } else {
            self.disable()
        }
    }

    /// Whether the breakpoint was hit in the current session
    pub fn is_hit(&self) -> bool {
        self.hit
    }

    /// Mark the breakpoint hit. Only armed breakpoints in an active session can be hit.
    pub fn hit(&mut self, session_active: bool) -> bool {
        if !session_active || !self.enabled {
            return false;
        }
        self.hit = true;
        true
    }

    /// Clear the hit flag after the session resumed or ended
    pub fn reset_hit(&mut self) {
        self.hit = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(bp: &Breakpoint) {
        assert!(!bp.is_enabled() || bp.has_breakpoint());
        assert!(!bp.is_hit() || bp.is_enabled());
    }

    #[test]
    fn test_add_leaves_disabled() {
        let mut bp = Breakpoint::new();
        assert_eq!(bp.state(), BreakpointState::NoBreakpoint);
        bp.add();
        assert_eq!(bp.state(), BreakpointState::Disabled);
        assert!(bp.can_enable());
        assert_invariants(&bp);
    }

    #[test]
    fn test_enable_without_breakpoint_is_rejected() {
        let mut bp = Breakpoint::new();
        assert!(!bp.enable());
        assert_eq!(bp, Breakpoint::new());
        assert_invariants(&bp);
    }

    #[test]
    fn test_enable_twice_is_rejected() {
        let mut bp = Breakpoint::new();
        bp.add();
        assert!(bp.enable());
        assert!(!bp.can_enable());
        assert!(!bp.enable());
        assert_eq!(bp.state(), BreakpointState::Enabled);
    }

    #[test]
    fn test_disable_hit_clears_hit() {
        let mut bp = Breakpoint::new();
        bp.add();
        bp.enable();
        assert!(bp.hit(true));
        assert_eq!(bp.state(), BreakpointState::Hit);
        assert!(bp.disable());
        assert_eq!(bp.state(), BreakpointState::Disabled);
        assert!(!bp.is_hit());
        assert_invariants(&bp);
    }

    #[test]
    fn test_hit_requires_armed_and_active_session() {
        let mut bp = Breakpoint::new();
        bp.add();
        assert!(!bp.hit(true));
        bp.enable();
        assert!(!bp.hit(false));
        assert_eq!(bp.state(), BreakpointState::Enabled);
        assert!(bp.hit(true));
        assert_invariants(&bp);
    }

    #[test]
    fn test_toggle() {
        let mut bp = Breakpoint::new();
        assert!(!bp.toggle());
        bp.add();
        assert!(bp.toggle());
        assert!(bp.is_enabled());
        assert!(bp.toggle());
        assert!(!bp.is_enabled());
        assert!(bp.has_breakpoint());
    }

    #[test]
    fn test_remove_clears_everything() {
        let mut bp = Breakpoint::new();
        bp.add();
        bp.enable();
        bp.hit(true);
        bp.remove();
        assert_eq!(bp.state(), BreakpointState::NoBreakpoint);
        assert_invariants(&bp);
    }

    #[test]
    fn test_hit_is_not_persisted() {
        let mut bp = Breakpoint::new();
        bp.add();
        bp.enable();
        bp.hit(true);
        let ron_str = ron::to_string(&bp).unwrap();
        let loaded: Breakpoint = ron::from_str(&ron_str).unwrap();
        assert_eq!(loaded.state(), BreakpointState::Enabled);
    }
}
