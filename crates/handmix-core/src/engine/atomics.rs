//! Lock-free state published by the audio thread
//!
//! The audio thread writes these with relaxed stores; the control thread,
//! the monitor and the UI read them. Nothing here is ever read back into
//! audio processing.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use super::command::ParamKind;
use crate::types::Micros;

/// f32 stored as its bit pattern in an `AtomicU32`
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}

/// Applied parameter values of one stem (lock-free, for UI display)
#[derive(Debug)]
pub struct StemAtomics {
    pub volume: AtomicF32,
    pub muted: AtomicBool,
    pub pan: AtomicF32,
    /// Crossfade gain product currently applied to the stem
    pub crossfade_gain: AtomicF32,
    /// Peak level of the stem's processed output over the last quantum
    pub peak: AtomicF32,
}

impl StemAtomics {
    pub fn new() -> Self {
        Self {
            volume: AtomicF32::new(ParamKind::Volume.default_value()),
            muted: AtomicBool::new(false),
            pan: AtomicF32::new(ParamKind::Pan.default_value()),
            crossfade_gain: AtomicF32::new(1.0),
            peak: AtomicF32::new(0.0),
        }
    }

    /// Applied volume (lock-free)
    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }
}

impl Default for StemAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// A rejected command, as published by the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RejectedCommand {
    pub stem: usize,
    pub param: Option<ParamKind>,
}

/// Engine-wide counters and flags
///
/// Counters are cumulative; readers diff them between polls.
#[derive(Debug)]
pub struct EngineAtomics {
    /// Quanta processed since start
    pub quanta: AtomicU64,
    /// Commands applied since start (published every report interval)
    pub applied_commands: AtomicU64,
    /// Commands rejected for an invalid target
    pub rejected_commands: AtomicU64,
    /// Last rejected command, packed as `stem << 32 | param code`
    pub last_rejected: AtomicU64,
    /// Largest (quantum start - command timestamp) over the last report interval
    pub max_apply_latency_us: AtomicU64,
    /// Callback time / quantum duration, published by the driver
    pub callback_load: AtomicF32,
    /// Callbacks that exceeded their budget
    pub overruns: AtomicU64,
    /// Stem inputs that delivered fewer frames than the quantum
    pub underruns: AtomicU64,
    /// Master peak over the last report interval
    pub peak: AtomicF32,
    /// Quanta in which the master soft clipper saturated
    pub clipped_quanta: AtomicU64,
    /// Fade-out finished and channels were reset
    pub stopped: AtomicBool,
    /// Set by the control side, observed at the next quantum boundary
    pub stop_requested: AtomicBool,
}

impl EngineAtomics {
    pub fn new() -> Self {
        Self {
            quanta: AtomicU64::new(0),
            applied_commands: AtomicU64::new(0),
            rejected_commands: AtomicU64::new(0),
            last_rejected: AtomicU64::new(0),
            max_apply_latency_us: AtomicU64::new(0),
            callback_load: AtomicF32::new(0.0),
            overruns: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            peak: AtomicF32::new(0.0),
            clipped_quanta: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Ask the engine to fade out and stop (safe from any thread)
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected_commands.load(Ordering::Relaxed)
    }

    /// Decode the last rejected command
    pub fn last_rejected(&self) -> RejectedCommand {
        let packed = self.last_rejected.load(Ordering::Relaxed);
        RejectedCommand {
            stem: (packed >> 32) as usize,
            param: ParamKind::from_code(packed as u32),
        }
    }

    pub(crate) fn record_rejection(&self, stem: usize, param: ParamKind) {
        let packed = ((stem as u64 & 0xFFFF_FFFF) << 32) | param.code() as u64;
        self.last_rejected.store(packed, Ordering::Relaxed);
        self.rejected_commands.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn max_apply_latency_us(&self) -> Micros {
        self.max_apply_latency_us.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn callback_load(&self) -> f32 {
        self.callback_load.load()
    }
}

impl Default for EngineAtomics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::EqBand;

    #[test]
    fn test_atomic_f32_roundtrip() {
        let a = AtomicF32::new(0.25);
        assert_eq!(a.load(), 0.25);
        a.store(-3.5);
        assert_eq!(a.load(), -3.5);
    }

    #[test]
    fn test_rejection_packing() {
        let atomics = EngineAtomics::new();
        atomics.record_rejection(9, ParamKind::Eq(EqBand::Mid));
        atomics.record_rejection(6, ParamKind::Crossfade { other: 6 });
        assert_eq!(atomics.rejected(), 2);
        assert_eq!(
            atomics.last_rejected(),
            RejectedCommand { stem: 6, param: Some(ParamKind::Crossfade { other: 6 }) }
        );
    }
}
