//! Audio engine configuration

use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_BUS_CAPACITY;
use crate::error::{EngineError, EngineResult};
use crate::types::{MAX_QUANTUM_FRAMES, MAX_STEMS, SAMPLE_RATE};

/// Audio output selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioBackendChoice {
    /// Render on a paced thread without an output device
    #[default]
    Headless,
    /// System output device (requires the `cpal-backend` feature)
    Device,
}

/// Settings of the stem mixing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of stems mixed (1 to `MAX_STEMS`)
    pub num_stems: usize,
    /// Frames per processing quantum (1 to `MAX_QUANTUM_FRAMES`)
    pub quantum_frames: usize,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Master limiter ceiling in dBFS
    pub limiter_ceiling_db: f32,
    /// Soft clipper knee, linear amplitude
    pub soft_clip_knee: f32,
    /// Master fade on stop, in milliseconds
    pub fade_out_ms: f32,
    /// Quanta between engine reports
    pub report_interval_quanta: u32,
    /// Command ring capacity
    pub bus_capacity: usize,
    /// Spatial distance attenuation factor
    pub distance_rolloff: f32,
    /// Release of the sidechain key follower, in milliseconds
    pub sidechain_release_ms: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_stems: 4,
            quantum_frames: 128, // 2.7 ms at 48 kHz
            sample_rate: SAMPLE_RATE,
            limiter_ceiling_db: -0.3,
            soft_clip_knee: 0.8,
            fade_out_ms: 20.0,
            report_interval_quanta: 32,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            distance_rolloff: 1.0,
            sidechain_release_ms: 120.0,
        }
    }
}

impl EngineConfig {
    /// Check every field is usable by the engine
    pub fn validate(&self) -> EngineResult<()> {
        if self.num_stems == 0 || self.num_stems > MAX_STEMS {
            return Err(EngineError::InvalidStemCount { requested: self.num_stems, max: MAX_STEMS });
        }
        if self.quantum_frames == 0 || self.quantum_frames > MAX_QUANTUM_FRAMES {
            return Err(EngineError::InvalidQuantum {
                frames: self.quantum_frames,
                max: MAX_QUANTUM_FRAMES,
            });
        }
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(EngineError::InvalidSampleRate(self.sample_rate));
        }
        if self.bus_capacity == 0 {
            return Err(EngineError::InvalidSetting("bus_capacity must be at least 1".into()));
        }
        if !(self.fade_out_ms.is_finite() && self.fade_out_ms >= 0.0) {
            return Err(EngineError::InvalidSetting(format!(
                "fade_out_ms must be a non-negative number, got {}",
                self.fade_out_ms
            )));
        }
        if !(self.soft_clip_knee > 0.0 && self.soft_clip_knee < 1.0) {
            return Err(EngineError::InvalidSetting(format!(
                "soft_clip_knee must be inside (0, 1), got {}",
                self.soft_clip_knee
            )));
        }
        if !(self.limiter_ceiling_db.is_finite() && self.limiter_ceiling_db <= 0.0) {
            return Err(EngineError::InvalidSetting(format!(
                "limiter_ceiling_db must be at most 0 dBFS, got {}",
                self.limiter_ceiling_db
            )));
        }
        Ok(())
    }

    /// Duration of one quantum in microseconds
    pub fn quantum_us(&self) -> u64 {
        self.quantum_frames as u64 * 1_000_000 / self.sample_rate.max(1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quantum_us(), 2666);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        let too_many = EngineConfig { num_stems: MAX_STEMS + 1, ..Default::default() };
        assert!(matches!(too_many.validate(), Err(EngineError::InvalidStemCount { .. })));

        let no_frames = EngineConfig { quantum_frames: 0, ..Default::default() };
        assert!(matches!(no_frames.validate(), Err(EngineError::InvalidQuantum { .. })));

        let knee = EngineConfig { soft_clip_knee: 1.5, ..Default::default() };
        assert!(matches!(knee.validate(), Err(EngineError::InvalidSetting(_))));
    }
}
