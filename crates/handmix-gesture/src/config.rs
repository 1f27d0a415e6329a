//! Control-path configuration

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierConfig;
use crate::smoother::SmootherConfig;

/// Settings of the capture → smooth → classify path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Control ticks per second, matching the pose capture rate
    pub capture_hz: f32,
    pub smoother: SmootherConfig,
    pub classifier: ClassifierConfig,
    /// Bounded UI event queue length; events are dropped when it is full
    pub ui_queue: usize,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            capture_hz: 60.0,
            smoother: SmootherConfig::default(),
            classifier: ClassifierConfig::default(),
            ui_queue: 256,
        }
    }
}

impl GestureConfig {
    /// Control tick period in microseconds
    pub fn tick_period_us(&self) -> u64 {
        let hz = if self.capture_hz.is_finite() && self.capture_hz > 0.0 {
            self.capture_hz
        } else {
            GestureConfig::default().capture_hz
        };
        (1_000_000.0 / hz) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_period() {
        assert_eq!(GestureConfig::default().tick_period_us(), 16_666);
        let broken = GestureConfig { capture_hz: 0.0, ..Default::default() };
        assert_eq!(broken.tick_period_us(), 16_666);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: GestureConfig = serde_yaml::from_str("capture_hz: 30\nclassifier:\n  activate_ticks: 2\n").unwrap();
        assert_eq!(config.capture_hz, 30.0);
        assert_eq!(config.classifier.activate_ticks, 2);
        assert_eq!(config.classifier.release_ticks, 4);
        assert_eq!(config.smoother, SmootherConfig::default());
    }
}
