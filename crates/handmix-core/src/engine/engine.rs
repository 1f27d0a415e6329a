//! Main audio engine - applies commands at quantum boundaries and mixes stems

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::types::{Micros, StereoBuffer, MAX_QUANTUM_FRAMES};

use super::{
    CommandMode, CommandReceiver, ControlCommand, EngineAtomics, Mixer, ParamKind, StemAtomics,
    StemInputs, StemParams,
};

/// The stem mixing engine
///
/// Owned exclusively by the audio thread. Control reaches it only through
/// the [`CommandReceiver`] passed to [`AudioEngine::process`]; state leaves
/// it only through [`EngineAtomics`] and [`StemAtomics`].
pub struct AudioEngine {
    config: EngineConfig,
    sample_rate: f32,
    mixer: Mixer,
    stem_atomics: Vec<Arc<StemAtomics>>,
    atomics: Arc<EngineAtomics>,

    /// Master gain applied after the master chain (stop fade, overrun fade-in)
    gain: f32,
    gain_target: f32,
    /// Per-sample gain change while fading
    gain_step: f32,
    stopping: bool,
    stopped: bool,
    fade_in_pending: bool,

    // Report accumulators
    quanta: u64,
    applied_total: u64,
    max_latency_us: Micros,
    peak: f32,
}

impl AudioEngine {
    /// Create an engine after validating the config
    ///
    /// `sample_rate` is the rate the output actually runs at, which may
    /// differ from the configured one when a device picks its own.
    pub fn new(mut config: EngineConfig, sample_rate: u32) -> EngineResult<Self> {
        config.sample_rate = sample_rate;
        config.validate()?;

        let sr = sample_rate as f32;
        let mixer = Mixer::new(
            config.num_stems,
            MAX_QUANTUM_FRAMES,
            sr,
            config.distance_rolloff,
            config.sidechain_release_ms,
            config.soft_clip_knee,
            config.limiter_ceiling_db,
        );

        log::info!(
            "[ENGINE] {} stems, {} frames/quantum at {}Hz ({} samples master latency)",
            config.num_stems,
            config.quantum_frames,
            sample_rate,
            mixer.latency_samples()
        );

        Ok(Self {
            stem_atomics: (0..config.num_stems).map(|_| Arc::new(StemAtomics::new())).collect(),
            atomics: Arc::new(EngineAtomics::new()),
            config,
            sample_rate: sr,
            mixer,
            gain: 1.0,
            gain_target: 1.0,
            gain_step: 0.0,
            stopping: false,
            stopped: false,
            fade_in_pending: false,
            quanta: 0,
            applied_total: 0,
            max_latency_us: 0,
            peak: 0.0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn num_stems(&self) -> usize {
        self.config.num_stems
    }

    /// Get the per-stem atomics for lock-free UI access
    pub fn stem_atomics(&self) -> Vec<Arc<StemAtomics>> {
        self.stem_atomics.clone()
    }

    /// Get the engine-wide atomics (monitor, driver, stop flag)
    pub fn engine_atomics(&self) -> Arc<EngineAtomics> {
        Arc::clone(&self.atomics)
    }

    /// Current parameters of a stem
    pub fn stem_params(&self, stem: usize) -> Option<&StemParams> {
        self.mixer.channel(stem).map(|c| c.params())
    }

    /// Crossfade position of the pair (a, b)
    pub fn crossfade_position(&self, a: usize, b: usize) -> f32 {
        self.mixer.crossfade().get(a, b)
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Start the fade to silence
    pub fn request_stop(&self) {
        self.atomics.request_stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Record a missed deadline; the next quantum fades in from silence
    pub fn note_overrun(&mut self) {
        self.atomics.overruns.fetch_add(1, Ordering::Relaxed);
        self.fade_in_pending = true;
    }

    /// Process one quantum
    ///
    /// Applies every command due at `quantum_start_us`, then mixes `inputs`
    /// into `out`, which is sized to the quantum from its pre-allocated
    /// capacity. Real-time safe: no allocation, locks or logging.
    pub fn process(
        &mut self,
        quantum_start_us: Micros,
        inputs: &StemInputs,
        out: &mut StereoBuffer,
        commands: &mut CommandReceiver,
    ) {
        let frames = inputs.frames().min(MAX_QUANTUM_FRAMES);
        out.set_len_from_capacity(frames);

        if self.atomics.stop_requested.load(Ordering::Relaxed) && !self.stopping && !self.stopped {
            self.begin_stop();
        }

        if self.stopped {
            // Keep the ring moving, but a stopped engine takes no new state
            commands.drain_due(quantum_start_us, |_| {});
            out.fill_silence();
            self.finish_quantum(0.0);
            return;
        }

        commands.drain_due(quantum_start_us, |cmd| self.apply_command(cmd, quantum_start_us));

        let starved = inputs.starved();
        if starved > 0 {
            self.atomics.underruns.fetch_add(starved as u64, Ordering::Relaxed);
        }

        self.mixer.process(inputs, out);

        if self.fade_in_pending && !self.stopping {
            self.fade_in_pending = false;
            self.gain = 0.0;
            self.gain_target = 1.0;
            self.gain_step = 1.0 / out.len().max(1) as f32;
        }
        self.apply_master_gain(out);

        let peak = out.peak();
        if self.stopping && self.gain <= 0.0 {
            self.finish_stop();
        }
        self.finish_quantum(peak);
    }

    /// Apply one command with clamping, or reject it
    pub(crate) fn apply_command(&mut self, cmd: ControlCommand, quantum_start_us: Micros) {
        if !self.try_apply(cmd) {
            self.atomics.record_rejection(cmd.stem, cmd.param);
            return;
        }
        self.applied_total += 1;
        self.max_latency_us = self
            .max_latency_us
            .max(quantum_start_us.saturating_sub(cmd.timestamp_us));
    }

    fn try_apply(&mut self, cmd: ControlCommand) -> bool {
        let num_stems = self.config.num_stems;
        if cmd.stem >= num_stems || !cmd.value.is_finite() {
            return false;
        }

        if let ParamKind::Crossfade { other } = cmd.param {
            if other >= num_stems || other == cmd.stem {
                return false;
            }
            let crossfade = self.mixer.crossfade_mut();
            let value = match cmd.mode {
                CommandMode::Set => cmd.value,
                CommandMode::Delta => crossfade.get(cmd.stem, other) + cmd.value,
            };
            crossfade.set(cmd.stem, other, cmd.param.clamp(value));
            return true;
        }

        let Some(channel) = self.mixer.channel_mut(cmd.stem) else {
            return false;
        };
        let current = channel.params().get(cmd.param).unwrap_or(cmd.param.default_value());
        let value = match (cmd.mode, cmd.param) {
            (CommandMode::Set, _) => cmd.value,
            // A mute delta toggles
            (CommandMode::Delta, ParamKind::Mute) => {
                let muted = current >= 0.5;
                if (cmd.value != 0.0) != muted { 1.0 } else { 0.0 }
            }
            (CommandMode::Delta, _) => current + cmd.value,
        };

        if cmd.param == ParamKind::SidechainSource && value.round() >= num_stems as f32 {
            return false;
        }

        let applied = channel.set_param(cmd.param, value);
        let atomics = &self.stem_atomics[cmd.stem];
        match cmd.param {
            ParamKind::Volume => atomics.volume.store(applied),
            ParamKind::Mute => atomics.muted.store(applied >= 0.5, Ordering::Relaxed),
            ParamKind::Pan => atomics.pan.store(applied),
            _ => {}
        }
        true
    }

    fn apply_master_gain(&mut self, out: &mut StereoBuffer) {
        if self.gain == 1.0 && self.gain_target == 1.0 {
            return;
        }
        let target = self.gain_target;
        let step = self.gain_step;
        let mut gain = self.gain;
        for sample in out.iter_mut() {
            gain = if gain < target {
                (gain + step).min(target)
            } else {
                (gain - step).max(target)
            };
            *sample *= gain;
        }
        self.gain = gain;
    }

    fn begin_stop(&mut self) {
        self.stopping = true;
        self.fade_in_pending = false;
        let fade_samples = (self.config.fade_out_ms / 1000.0 * self.sample_rate).max(1.0);
        self.gain_target = 0.0;
        self.gain_step = self.gain.max(1e-3) / fade_samples;
    }

    fn finish_stop(&mut self) {
        self.stopping = false;
        self.stopped = true;
        self.mixer.reset();
        for atomics in &self.stem_atomics {
            atomics.volume.store(ParamKind::Volume.default_value());
            atomics.muted.store(false, Ordering::Relaxed);
            atomics.pan.store(ParamKind::Pan.default_value());
            atomics.crossfade_gain.store(1.0);
            atomics.peak.store(0.0);
        }
        self.atomics.stopped.store(true, Ordering::Relaxed);
    }

    /// Count the quantum and publish a report every interval
    fn finish_quantum(&mut self, peak: f32) {
        self.quanta += 1;
        self.peak = self.peak.max(peak);

        let interval = self.config.report_interval_quanta.max(1) as u64;
        if self.quanta % interval != 0 {
            return;
        }

        let num_stems = self.config.num_stems;
        for (stem, atomics) in self.stem_atomics.iter().enumerate() {
            atomics.peak.store(self.mixer.stem_peak(stem));
            atomics.crossfade_gain.store(self.mixer.crossfade().gain_for(stem, num_stems));
        }
        self.atomics.quanta.store(self.quanta, Ordering::Relaxed);
        self.atomics.applied_commands.store(self.applied_total, Ordering::Relaxed);
        self.atomics.max_apply_latency_us.store(self.max_latency_us, Ordering::Relaxed);
        self.atomics.peak.store(self.peak);
        self.atomics.clipped_quanta.store(self.mixer.saturated_quanta(), Ordering::Relaxed);
        self.max_latency_us = 0;
        self.peak = 0.0;
    }

    /// Return every stem to defaults and resume from a stopped state
    pub fn reset(&mut self) {
        self.mixer.reset();
        self.gain = 1.0;
        self.gain_target = 1.0;
        self.gain_step = 0.0;
        self.stopping = false;
        self.stopped = false;
        self.fade_in_pending = false;
        self.atomics.stopped.store(false, Ordering::Relaxed);
        self.atomics.stop_requested.store(false, Ordering::Relaxed);
    }
}
