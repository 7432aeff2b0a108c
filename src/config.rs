//! Emulator settings.
//!
//! Stored as JSON by the host; every field has a default so an empty object
//! (or a partial one) is a valid configuration.

use serde::{Deserialize, Serialize};

/// What `run` produces while no program is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleMode {
    #[default]
    Silence,
    /// Inputs are copied to the outputs.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmulatorConfig {
    #[serde(default)]
    pub idle: IdleMode,
    /// Refuse to install a program whose assembly reported errors.
    #[serde(default)]
    pub reject_on_error: bool,
    /// Host sample rate in Hz. LFO frequencies in `dump_state` are
    /// reported against it.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_sample_rate() -> u32 {
    32768
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            idle: IdleMode::default(),
            reject_on_error: false,
            sample_rate: default_sample_rate(),
        }
    }
}

impl EmulatorConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
