//! Mixer - combines stem channels through the crossfade matrix and sidechain
//!
//! Per quantum:
//! 1. Key envelopes are tracked on every stem's raw input
//! 2. Each active channel strip runs into its own pre-allocated buffer
//! 3. Ducked stems are scaled by `1 - depth × key envelope`
//! 4. Stems are summed to the master bus
//! 5. Master chain: soft clipper → lookahead limiter (brickwall at the ceiling)

use super::channel::StemChannel;
use super::dsp::EnvelopeFollower;
use super::master_clipper::SoftClipper;
use super::master_limiter::MasterLimiter;
use super::source::StemInputs;
use crate::types::{StereoBuffer, MAX_STEMS};

/// Sidechain key attack (fast, so transients duck immediately)
const SIDECHAIN_ATTACK_SECS: f32 = 0.001;

/// Gain pair for a crossfade position `p` in [0, 1]
///
/// Returns `(lower stem gain, higher stem gain)`. Both are unity at 0.5.
#[inline]
pub fn crossfade_gains(p: f32) -> (f32, f32) {
    let p = p.clamp(0.0, 1.0);
    ((2.0 * (1.0 - p)).min(1.0), (2.0 * p).min(1.0))
}

/// Pairwise crossfade positions between stems
///
/// Only the upper triangle (`a < b`) is stored; `set`/`get` accept either order.
#[derive(Debug, Clone)]
pub struct CrossfadeMatrix {
    positions: [[f32; MAX_STEMS]; MAX_STEMS],
}

impl CrossfadeMatrix {
    /// All pairs at the neutral position
    pub fn new() -> Self {
        Self { positions: [[0.5; MAX_STEMS]; MAX_STEMS] }
    }

    /// Set the position of pair (a, b). Returns false for an invalid pair.
    pub fn set(&mut self, a: usize, b: usize, position: f32) -> bool {
        let Some((lo, hi)) = Self::pair(a, b) else {
            return false;
        };
        self.positions[lo][hi] = position.clamp(0.0, 1.0);
        true
    }

    /// Position of pair (a, b), neutral for an invalid pair
    pub fn get(&self, a: usize, b: usize) -> f32 {
        Self::pair(a, b).map_or(0.5, |(lo, hi)| self.positions[lo][hi])
    }

    /// Product of this stem's gains over every pair it belongs to
    pub fn gain_for(&self, stem: usize, num_stems: usize) -> f32 {
        let mut gain = 1.0;
        for other in 0..num_stems.min(MAX_STEMS) {
            if other == stem {
                continue;
            }
            let (lo_gain, hi_gain) = crossfade_gains(self.get(stem, other));
            gain *= if stem < other { lo_gain } else { hi_gain };
        }
        gain
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    fn pair(a: usize, b: usize) -> Option<(usize, usize)> {
        if a == b || a >= MAX_STEMS || b >= MAX_STEMS {
            None
        } else {
            Some((a.min(b), a.max(b)))
        }
    }
}

impl Default for CrossfadeMatrix {
    fn default() -> Self {
        Self::new()
    }
}

/// Stem mixer with the master chain
pub struct Mixer {
    channels: Vec<StemChannel>,
    /// Processed output of each stem
    stem_buffers: Vec<StereoBuffer>,
    /// Key envelope of each stem's raw input, one value per frame
    key_envelopes: Vec<Vec<f32>>,
    key_followers: Vec<EnvelopeFollower>,
    crossfade: CrossfadeMatrix,
    /// Per-stem output peak over the last quantum
    stem_peaks: [f32; MAX_STEMS],
    clipper: SoftClipper,
    limiter: MasterLimiter,
}

impl Mixer {
    /// Create a mixer with all buffers sized for `max_frames`
    pub fn new(
        num_stems: usize,
        max_frames: usize,
        sample_rate: f32,
        distance_rolloff: f32,
        sidechain_release_ms: f32,
        soft_clip_knee: f32,
        limiter_ceiling_db: f32,
    ) -> Self {
        let num_stems = num_stems.min(MAX_STEMS);
        Self {
            channels: (0..num_stems)
                .map(|_| StemChannel::new(sample_rate, distance_rolloff))
                .collect(),
            stem_buffers: (0..num_stems).map(|_| StereoBuffer::silence(max_frames)).collect(),
            key_envelopes: (0..num_stems).map(|_| vec![0.0; max_frames]).collect(),
            key_followers: (0..num_stems)
                .map(|_| {
                    EnvelopeFollower::new(
                        SIDECHAIN_ATTACK_SECS,
                        sidechain_release_ms / 1000.0,
                        sample_rate,
                    )
                })
                .collect(),
            crossfade: CrossfadeMatrix::new(),
            stem_peaks: [0.0; MAX_STEMS],
            clipper: SoftClipper::with_knee(soft_clip_knee),
            limiter: MasterLimiter::with_ceiling_db(limiter_ceiling_db, sample_rate),
        }
    }

    pub fn num_stems(&self) -> usize {
        self.channels.len()
    }

    /// Get a reference to a stem's channel strip
    pub fn channel(&self, stem: usize) -> Option<&StemChannel> {
        self.channels.get(stem)
    }

    /// Get a mutable reference to a stem's channel strip
    pub fn channel_mut(&mut self, stem: usize) -> Option<&mut StemChannel> {
        self.channels.get_mut(stem)
    }

    pub fn crossfade(&self) -> &CrossfadeMatrix {
        &self.crossfade
    }

    pub fn crossfade_mut(&mut self) -> &mut CrossfadeMatrix {
        &mut self.crossfade
    }

    /// Output peak of a stem over the last quantum
    pub fn stem_peak(&self, stem: usize) -> f32 {
        self.stem_peaks.get(stem).copied().unwrap_or(0.0)
    }

    /// Quanta in which the soft clipper saturated
    pub fn saturated_quanta(&self) -> u64 {
        self.clipper.saturated_quanta()
    }

    /// Latency of the master chain in samples
    pub fn latency_samples(&self) -> usize {
        self.limiter.latency_samples()
    }

    /// Mix one quantum of stem inputs into `master`
    ///
    /// `master` must already be sized to the quantum. Real-time safe.
    pub fn process(&mut self, inputs: &StemInputs, master: &mut StereoBuffer) {
        let frames = master.len().min(inputs.frames());
        master.fill_silence();

        // Phase 1: key envelopes on raw inputs, so a muted source still keys
        for (stem, (follower, env)) in self
            .key_followers
            .iter_mut()
            .zip(self.key_envelopes.iter_mut())
            .enumerate()
        {
            let input = inputs.stem(stem);
            let end = frames.min(env.len());
            let n = end.min(input.len());
            for (value, sample) in env[..n].iter_mut().zip(input) {
                *value = follower.process(sample.peak()).min(1.0);
            }
            for value in env[n..end].iter_mut() {
                *value = follower.process(0.0);
            }
        }

        // Phase 2: channel strips, sidechain, summing
        let num_stems = self.channels.len();
        for stem in 0..num_stems {
            let buffer = &mut self.stem_buffers[stem];
            buffer.set_len_from_capacity(frames);
            let channel = &mut self.channels[stem];

            if !channel.is_active() {
                channel.process_silent(buffer.as_mut_slice());
                self.stem_peaks[stem] = 0.0;
                continue;
            }

            let gain = self.crossfade.gain_for(stem, num_stems);
            channel.process(inputs.stem(stem), buffer.as_mut_slice(), gain);

            let source = channel.params().sidechain_source.filter(|&s| s < num_stems);
            let duck = channel.duck_depth();
            match source {
                Some(source) if duck.target() > 0.0 || duck.current() > 0.0 => {
                    let step = duck.step(frames);
                    let mut depth = duck.current();
                    let key = &self.key_envelopes[source];
                    for (sample, &env) in buffer.as_mut_slice().iter_mut().zip(key.iter()) {
                        depth += step;
                        *sample *= 1.0 - depth.clamp(0.0, 1.0) * env;
                    }
                    duck.finish();
                }
                Some(_) => duck.finish(),
                None => duck.reset(0.0),
            }

            let mut peak = 0.0_f32;
            for (out, sample) in master.as_mut_slice().iter_mut().zip(buffer.as_slice()) {
                *out += *sample;
                peak = peak.max(sample.peak());
            }
            self.stem_peaks[stem] = peak;
        }

        // Phase 3: master chain
        self.clipper.process(master);
        self.limiter.process(master);
    }

    /// Restore every channel to defaults and clear all DSP state
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        for follower in &mut self.key_followers {
            follower.reset();
        }
        self.crossfade.reset();
        self.stem_peaks = [0.0; MAX_STEMS];
        self.limiter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::ParamKind;
    use crate::engine::source::{ConstantSource, StemSource};
    use crate::types::StereoSample;

    const SR: f32 = 48000.0;

    fn mixer(num_stems: usize) -> Mixer {
        Mixer::new(num_stems, 256, SR, 1.0, 120.0, 0.8, -0.3)
    }

    fn constant_inputs(values: &[f32], frames: usize) -> StemInputs {
        let mut inputs = StemInputs::new(values.len(), frames);
        let mut sources: Vec<Box<dyn StemSource>> = values
            .iter()
            .map(|&v| Box::new(ConstantSource(StereoSample::mono(v))) as Box<dyn StemSource>)
            .collect();
        inputs.fill(&mut sources);
        inputs
    }

    #[test]
    fn test_crossfade_curve() {
        assert_eq!(crossfade_gains(0.5), (1.0, 1.0));
        assert_eq!(crossfade_gains(0.0), (1.0, 0.0));
        assert_eq!(crossfade_gains(1.0), (0.0, 1.0));
        let (a, b) = crossfade_gains(0.75);
        assert!((a - 0.5).abs() < 1e-6 && b == 1.0);
    }

    #[test]
    fn test_crossfade_matrix_pairs() {
        let mut matrix = CrossfadeMatrix::new();
        assert!(matrix.set(2, 0, 1.0));
        assert_eq!(matrix.get(0, 2), 1.0);
        assert!(!matrix.set(1, 1, 0.3));
        assert!(!matrix.set(0, MAX_STEMS, 0.3));

        // Pair (0, 2) at 1.0: stem 0 silent, stem 2 unity, stem 1 untouched
        assert_eq!(matrix.gain_for(0, 3), 0.0);
        assert_eq!(matrix.gain_for(1, 3), 1.0);
        assert_eq!(matrix.gain_for(2, 3), 1.0);

        // Product over pairs
        matrix.set(1, 2, 0.25);
        assert!((matrix.gain_for(2, 3) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_stems_sum_to_master() {
        let mut mixer = mixer(2);
        let inputs = constant_inputs(&[0.2, 0.3], 128);
        let mut master = StereoBuffer::silence(128);
        for _ in 0..4 {
            mixer.process(&inputs, &mut master);
        }
        let last = master[127];
        assert!((last.left - 0.5).abs() < 1e-4, "{}", last.left);
        assert!(mixer.stem_peak(1) > 0.29);
    }

    #[test]
    fn test_sidechain_ducks_target() {
        let mut mixer = mixer(2);
        let target = mixer.channel_mut(1).unwrap();
        target.set_param(ParamKind::SidechainSource, 0.0);
        target.set_param(ParamKind::SidechainDepth, 0.8);
        // Muted source still keys
        mixer.channel_mut(0).unwrap().set_param(ParamKind::Mute, 1.0);

        let inputs = constant_inputs(&[1.0, 0.5], 128);
        let mut master = StereoBuffer::silence(128);
        for _ in 0..8 {
            mixer.process(&inputs, &mut master);
        }
        // 0.5 × (1 - 0.8 × 1.0) = 0.1
        assert!((master[127].left - 0.1).abs() < 0.01, "{}", master[127].left);
    }

    #[test]
    fn test_starved_key_decays_instead_of_holding() {
        struct Burst(usize);
        impl StemSource for Burst {
            fn render(&mut self, out: &mut [StereoSample]) -> usize {
                let n = self.0.min(out.len());
                out[..n].fill(StereoSample::mono(1.0));
                self.0 -= n;
                n
            }
        }
        let mut mixer = mixer(2);
        mixer.channel_mut(0).unwrap().set_param(ParamKind::Mute, 1.0);
        let target = mixer.channel_mut(1).unwrap();
        target.set_param(ParamKind::SidechainSource, 0.0);
        target.set_param(ParamKind::SidechainDepth, 1.0);

        // The key plays for 8 quanta, then its source runs dry
        let mut sources: Vec<Box<dyn StemSource>> =
            vec![Box::new(Burst(128 * 8)), Box::new(ConstantSource(StereoSample::mono(0.5)))];
        let mut inputs = StemInputs::new(2, 128);
        let mut master = StereoBuffer::silence(128);
        for _ in 0..8 {
            inputs.fill(&mut sources);
            mixer.process(&inputs, &mut master);
        }
        assert!(master[127].left.abs() < 0.05, "{}", master[127].left);

        // 200 quanta of 128 frames is over four 120 ms release constants
        for _ in 0..200 {
            inputs.fill(&mut sources);
            mixer.process(&inputs, &mut master);
        }
        assert!(master[127].left > 0.45, "{}", master[127].left);
    }

    #[test]
    fn test_missing_key_input_reads_as_silence() {
        let mut mixer = mixer(2);
        let target = mixer.channel_mut(0).unwrap();
        target.set_param(ParamKind::SidechainSource, 1.0);
        target.set_param(ParamKind::SidechainDepth, 1.0);

        // Inputs for stem 0 only: stem 1's key has no samples
        let inputs = constant_inputs(&[0.4], 128);
        let mut master = StereoBuffer::silence(128);
        for _ in 0..4 {
            mixer.process(&inputs, &mut master);
        }
        assert!((master[127].left - 0.4).abs() < 1e-3, "{}", master[127].left);
    }

    #[test]
    fn test_saturation_is_counted_per_quantum() {
        let mut mixer = mixer(1);
        let mut master = StereoBuffer::silence(64);
        mixer.process(&constant_inputs(&[0.3], 64), &mut master);
        assert_eq!(mixer.saturated_quanta(), 0);
        for _ in 0..3 {
            mixer.process(&constant_inputs(&[1.0], 64), &mut master);
        }
        assert_eq!(mixer.saturated_quanta(), 3);
    }

    #[test]
    fn test_master_stays_bounded() {
        let mut mixer = mixer(4);
        let inputs = constant_inputs(&[1.0, 1.0, -1.0, 1.0], 256);
        let mut master = StereoBuffer::silence(256);
        for _ in 0..16 {
            mixer.process(&inputs, &mut master);
            for s in master.iter() {
                assert!(s.left.abs() <= 1.0 && s.right.abs() <= 1.0);
            }
        }
    }

    #[test]
    fn test_reset_clears_crossfade() {
        let mut mixer = mixer(2);
        mixer.crossfade_mut().set(0, 1, 0.0);
        mixer.reset();
        assert_eq!(mixer.crossfade().get(0, 1), 0.5);
        assert_eq!(mixer.stem_peak(0), 0.0);
    }
}
