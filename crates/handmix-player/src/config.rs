//! Everything the player reads from `~/.config/handmix/config.yaml`
//!
//! One section per crate plus the profile selection. Sections missing from
//! the file keep their defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use handmix_core::config::{default_config_path, AudioBackendChoice, EngineConfig};
use handmix_core::monitor::MonitorConfig;
use handmix_gesture::mapping::MappingConfig;
use handmix_gesture::GestureConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Stem count, quantum, sample rate and master bus settings
    pub engine: EngineConfig,
    /// Capture rate, smoothing and classifier tuning
    pub gesture: GestureConfig,
    /// Output throttle per parameter class
    pub mapping: MappingConfig,
    /// Latency thresholds and degradation timing
    pub monitor: MonitorConfig,
    /// Profile file; ~/.config/handmix/profiles.yaml when unset
    pub profiles_path: Option<PathBuf>,
    /// Profile to activate; the first in the file when unset
    pub active_profile: Option<String>,
    pub audio: AudioBackendChoice,
}

impl PlayerConfig {
    /// The configured profile file, else `profiles.yaml` next to the config
    pub fn profiles_path(&self) -> PathBuf {
        match &self.profiles_path {
            Some(path) => path.clone(),
            None => default_config_path("profiles.yaml"),
        }
    }
}
