// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph editor settings, stored as RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// How duplicate pin names within one direction are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicatePinPolicy {
    /// Keep the first descriptor, drop later ones
    #[default]
    KeepFirst,
    /// Refuse the whole shape; the node is left without pins
    Reject,
}

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid RON
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serializing failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Written by a newer editor
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },
}

/// Settings for flow graph editing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Settings format version
    pub version: u32,
    /// Re-query context assets on every reconstruction, not only on full ones
    pub refresh_context_pins_on_load: bool,
    /// Duplicate pin handling
    pub duplicate_pins: DuplicatePinPolicy,
    /// Armed node breakpoints pause on any pin trigger
    pub pause_on_node_breakpoint: bool,
    /// Prefix for user-added numbered pins
    pub user_pin_prefix: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            refresh_context_pins_on_load: true,
            duplicate_pins: DuplicatePinPolicy::KeepFirst,
            pause_on_node_breakpoint: true,
            user_pin_prefix: String::new(),
        }
    }
}

impl GraphSettings {
    /// Parse settings from RON text
    pub fn from_ron_str(content: &str) -> Result<Self, SettingsError> {
        let settings: GraphSettings = ron::from_str(content)?;
        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }
        Ok(settings)
    }

    /// Serialize settings to RON text
    pub fn to_ron_string(&self) -> Result<String, SettingsError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = GraphSettings::default();
        assert_eq!(settings.version, SETTINGS_FORMAT_VERSION);
        assert!(settings.refresh_context_pins_on_load);
        assert_eq!(settings.duplicate_pins, DuplicatePinPolicy::KeepFirst);
    }

    #[test]
    fn test_serialization() {
        let settings = GraphSettings {
            duplicate_pins: DuplicatePinPolicy::Reject,
            user_pin_prefix: "Branch ".to_string(),
            ..GraphSettings::default()
        };
        let ron_str = settings.to_ron_string().unwrap();
        let loaded = GraphSettings::from_ron_str(&ron_str).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let loaded = GraphSettings::from_ron_str("(pause_on_node_breakpoint: false)").unwrap();
        assert!(!loaded.pause_on_node_breakpoint);
        assert!(loaded.refresh_context_pins_on_load);
    }

    #[test]
    fn test_newer_version_rejected() {
        let result = GraphSettings::from_ron_str("(version: 99)");
        assert!(matches!(
            result,
            Err(SettingsError::UnsupportedVersion { found: 99, .. })
        ));
    }
}
