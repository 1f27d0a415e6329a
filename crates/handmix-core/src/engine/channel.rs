//! Per-stem channel state and processing
//!
//! A [`StemChannel`] owns the authoritative parameters of one stem
//! ([`StemParams`]) together with the DSP state that processes it. The
//! per-sample chain is:
//!
//! ```text
//! input → pan → 3-band EQ → compressor → spatial gain/pan → crossfade × volume → out
//! ```
//!
//! Gain stages ramp linearly across the quantum so parameter changes applied
//! at a quantum boundary never step the signal.

use super::command::{EqBand, ParamKind};
use super::dsp::{pan_gains, BiquadCoeffs, BiquadState, EnvelopeFollower, LinearRamp};
use crate::types::{db_to_linear, linear_to_db, StereoSample};

/// EQ frequency centers
const EQ_LO_FREQ: f32 = 100.0;   // Low shelf at 100 Hz
const EQ_MID_FREQ: f32 = 1000.0; // Mid peak at 1 kHz
const EQ_HI_FREQ: f32 = 10000.0; // High shelf at 10 kHz
const EQ_MID_Q: f32 = 0.7;       // Q for mid band

/// Gains within this many dB of flat use a passthrough band
const EQ_FLAT_DB: f32 = 0.1;

/// Authoritative parameters of one stem
///
/// Values always lie within [`ParamKind::range`]; they are only changed by
/// [`StemChannel::set_param`] which clamps. Crossfade weights are pairwise
/// and live in the mixer's crossfade matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct StemParams {
    pub volume: f32,
    pub muted: bool,
    pub pan: f32,
    /// EQ gains in dB: low, mid, high
    pub eq_db: [f32; 3],
    pub comp_threshold_db: f32,
    pub comp_ratio: f32,
    pub comp_attack_ms: f32,
    pub comp_release_ms: f32,
    /// Spatial position (x, y, z), each in [-1, 1]
    pub position: [f32; 3],
    /// Stem whose envelope ducks this one
    pub sidechain_source: Option<usize>,
    pub sidechain_depth: f32,
}

impl Default for StemParams {
    fn default() -> Self {
        Self {
            volume: ParamKind::Volume.default_value(),
            muted: false,
            pan: ParamKind::Pan.default_value(),
            eq_db: [0.0; 3],
            comp_threshold_db: ParamKind::CompThreshold.default_value(),
            comp_ratio: ParamKind::CompRatio.default_value(),
            comp_attack_ms: ParamKind::CompAttack.default_value(),
            comp_release_ms: ParamKind::CompRelease.default_value(),
            position: [0.0; 3],
            sidechain_source: None,
            sidechain_depth: ParamKind::SidechainDepth.default_value(),
        }
    }
}

impl StemParams {
    /// Current value of a per-stem parameter (None for crossfade pairs)
    pub fn get(&self, param: ParamKind) -> Option<f32> {
        Some(match param {
            ParamKind::Volume => self.volume,
            ParamKind::Mute => if self.muted { 1.0 } else { 0.0 },
            ParamKind::Pan => self.pan,
            ParamKind::Eq(band) => self.eq_db[band.index()],
            ParamKind::Spatial(axis) => self.position[axis.index()],
            ParamKind::CompThreshold => self.comp_threshold_db,
            ParamKind::CompRatio => self.comp_ratio,
            ParamKind::CompAttack => self.comp_attack_ms,
            ParamKind::CompRelease => self.comp_release_ms,
            ParamKind::SidechainSource => self.sidechain_source.map_or(-1.0, |s| s as f32),
            ParamKind::SidechainDepth => self.sidechain_depth,
            ParamKind::Crossfade { .. } => return None,
        })
    }

    /// True when the stem would contribute nothing to the mix
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.muted || self.volume <= 0.0
    }
}

/// Left/right gains for a spatial position
///
/// Distance from the listener attenuates as `1 / (1 + rolloff × distance)`,
/// the x coordinate adds a constant-power pan offset.
pub(crate) fn spatial_gains(position: [f32; 3], rolloff: f32) -> (f32, f32) {
    let [x, y, z] = position;
    let distance = (x * x + y * y + z * z).sqrt();
    let attenuation = 1.0 / (1.0 + rolloff.max(0.0) * distance);
    let (l, r) = pan_gains(x);
    (l * attenuation, r * attenuation)
}

/// Feed-forward compressor with a peak envelope detector
#[derive(Debug, Clone)]
struct Compressor {
    detector: EnvelopeFollower,
    threshold_db: f32,
    /// 1 - 1/ratio
    slope: f32,
    sample_rate: f32,
}

impl Compressor {
    fn new(params: &StemParams, sample_rate: f32) -> Self {
        let mut comp = Self {
            detector: EnvelopeFollower::new(0.0, 0.0, sample_rate),
            threshold_db: 0.0,
            slope: 0.0,
            sample_rate,
        };
        comp.configure(params);
        comp
    }

    fn configure(&mut self, params: &StemParams) {
        self.detector.set_times(
            params.comp_attack_ms / 1000.0,
            params.comp_release_ms / 1000.0,
            self.sample_rate,
        );
        self.threshold_db = params.comp_threshold_db;
        self.slope = 1.0 - 1.0 / params.comp_ratio.max(1.0);
    }

    #[inline]
    fn is_bypassed(&self) -> bool {
        self.slope <= 0.0
    }

    /// Gain to apply for one stereo sample
    #[inline]
    fn gain(&mut self, left: f32, right: f32) -> f32 {
        let env = self.detector.process(left.abs().max(right.abs()));
        let over_db = linear_to_db(env) - self.threshold_db;
        if over_db <= 0.0 {
            1.0
        } else {
            db_to_linear(-over_db * self.slope)
        }
    }

    fn reset(&mut self) {
        self.detector.reset();
    }
}

/// Channel strip for a single stem
#[derive(Debug, Clone)]
pub struct StemChannel {
    params: StemParams,
    sample_rate: f32,
    distance_rolloff: f32,

    // EQ filter states and cached coefficients
    eq_states: [BiquadState; 3],
    eq_coeffs: [BiquadCoeffs; 3],
    eq_dirty: bool,

    compressor: Compressor,
    comp_dirty: bool,

    // Ramped gains: pan stage and post stage (spatial × crossfade × volume)
    pan_l: LinearRamp,
    pan_r: LinearRamp,
    post_l: LinearRamp,
    post_r: LinearRamp,
    /// Sidechain depth, ramped so ducking engages smoothly
    duck_depth: LinearRamp,
}

impl StemChannel {
    /// Create a channel with default parameters
    pub fn new(sample_rate: f32, distance_rolloff: f32) -> Self {
        let params = StemParams::default();
        let compressor = Compressor::new(&params, sample_rate);
        let mut channel = Self {
            params,
            sample_rate,
            distance_rolloff,
            eq_states: Default::default(),
            eq_coeffs: [
                BiquadCoeffs::passthrough(),
                BiquadCoeffs::passthrough(),
                BiquadCoeffs::passthrough(),
            ],
            eq_dirty: false,
            compressor,
            comp_dirty: false,
            pan_l: LinearRamp::new(1.0),
            pan_r: LinearRamp::new(1.0),
            post_l: LinearRamp::new(0.0),
            post_r: LinearRamp::new(0.0),
            duck_depth: LinearRamp::new(0.0),
        };
        channel.snap_gains(1.0);
        channel
    }

    pub fn params(&self) -> &StemParams {
        &self.params
    }

    /// Set a per-stem parameter, clamped to its declared range
    ///
    /// Crossfade pairs are not handled here. Returns the applied value.
    pub fn set_param(&mut self, param: ParamKind, value: f32) -> f32 {
        let value = param.clamp(value);
        match param {
            ParamKind::Volume => self.params.volume = value,
            ParamKind::Mute => self.params.muted = value >= 0.5,
            ParamKind::Pan => self.params.pan = value,
            ParamKind::Eq(band) => {
                self.params.eq_db[band.index()] = value;
                self.eq_dirty = true;
            }
            ParamKind::Spatial(axis) => self.params.position[axis.index()] = value,
            ParamKind::CompThreshold => {
                self.params.comp_threshold_db = value;
                self.comp_dirty = true;
            }
            ParamKind::CompRatio => {
                self.params.comp_ratio = value;
                self.comp_dirty = true;
            }
            ParamKind::CompAttack => {
                self.params.comp_attack_ms = value;
                self.comp_dirty = true;
            }
            ParamKind::CompRelease => {
                self.params.comp_release_ms = value;
                self.comp_dirty = true;
            }
            ParamKind::SidechainSource => {
                let idx = value.round();
                self.params.sidechain_source = if idx < 0.0 { None } else { Some(idx as usize) };
            }
            ParamKind::SidechainDepth => self.params.sidechain_depth = value,
            ParamKind::Crossfade { .. } => {}
        }
        self.params.get(param).unwrap_or(value)
    }

    /// Whether the stem needs processing this quantum
    ///
    /// A silent stem still runs while its gain ramps down to zero.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.params.is_silent()
            || self.post_l.current() > 0.0
            || self.post_r.current() > 0.0
    }

    /// Current ramped sidechain depth target
    #[inline]
    pub(crate) fn duck_depth(&mut self) -> &mut LinearRamp {
        &mut self.duck_depth
    }

    /// Process one quantum
    ///
    /// `crossfade_gain` is this stem's product of crossfade-matrix weights.
    /// `input` and `out` must be the same length.
    pub fn process(&mut self, input: &[StereoSample], out: &mut [StereoSample], crossfade_gain: f32) {
        self.update_eq_coeffs();
        if self.comp_dirty {
            self.compressor.configure(&self.params);
            self.comp_dirty = false;
        }
        self.retarget_gains(crossfade_gain);
        self.duck_depth.set_target(self.params.sidechain_depth);

        let frames = input.len().min(out.len());
        let pan_l_step = self.pan_l.step(frames);
        let pan_r_step = self.pan_r.step(frames);
        let post_l_step = self.post_l.step(frames);
        let post_r_step = self.post_r.step(frames);
        let mut pan_l = self.pan_l.current();
        let mut pan_r = self.pan_r.current();
        let mut post_l = self.post_l.current();
        let mut post_r = self.post_r.current();

        let eq_active = self.eq_coeffs.iter().any(|c| !c.is_passthrough());
        let comp_active = !self.compressor.is_bypassed();

        for (src, dst) in input[..frames].iter().zip(out[..frames].iter_mut()) {
            pan_l += pan_l_step;
            pan_r += pan_r_step;
            post_l += post_l_step;
            post_r += post_r_step;

            let mut left = src.left * pan_l;
            let mut right = src.right * pan_r;

            if eq_active {
                for band in 0..3 {
                    (left, right) = self.eq_states[band].process(left, right, &self.eq_coeffs[band]);
                }
            }

            if comp_active {
                let gain = self.compressor.gain(left, right);
                left *= gain;
                right *= gain;
            }

            *dst = StereoSample::new(left * post_l, right * post_r);
        }

        self.pan_l.finish();
        self.pan_r.finish();
        self.post_l.finish();
        self.post_r.finish();
    }

    /// Output silence and keep ramps settled (used for inactive stems)
    pub fn process_silent(&mut self, out: &mut [StereoSample]) {
        out.fill(StereoSample::silence());
        self.retarget_gains(0.0);
        self.pan_l.finish();
        self.pan_r.finish();
        self.post_l.finish();
        self.post_r.finish();
        self.duck_depth.set_target(self.params.sidechain_depth);
        self.duck_depth.finish();
    }

    /// Restore default parameters and clear all DSP state
    pub fn reset(&mut self) {
        self.params = StemParams::default();
        for state in &mut self.eq_states {
            state.reset();
        }
        self.eq_dirty = true;
        self.update_eq_coeffs();
        self.compressor.configure(&self.params);
        self.compressor.reset();
        self.comp_dirty = false;
        self.duck_depth.reset(0.0);
        self.snap_gains(1.0);
    }

    fn retarget_gains(&mut self, crossfade_gain: f32) {
        let (pl, pr) = pan_gains(self.params.pan);
        self.pan_l.set_target(pl);
        self.pan_r.set_target(pr);

        let fader = if self.params.is_silent() { 0.0 } else { self.params.volume };
        let (sl, sr) = spatial_gains(self.params.position, self.distance_rolloff);
        let gain = fader * crossfade_gain.max(0.0);
        self.post_l.set_target(sl * gain);
        self.post_r.set_target(sr * gain);
    }

    fn snap_gains(&mut self, crossfade_gain: f32) {
        self.retarget_gains(crossfade_gain);
        self.pan_l.finish();
        self.pan_r.finish();
        self.post_l.finish();
        self.post_r.finish();
    }

    /// Recalculate EQ coefficients if dirty
    fn update_eq_coeffs(&mut self) {
        if !self.eq_dirty {
            return;
        }

        let sr = self.sample_rate;
        for band in EqBand::ALL {
            let db = self.params.eq_db[band.index()];
            let idx = band.index();
            self.eq_coeffs[idx] = if db.abs() <= EQ_FLAT_DB {
                BiquadCoeffs::passthrough()
            } else {
                match band {
                    EqBand::Low => BiquadCoeffs::low_shelf(EQ_LO_FREQ, db, sr),
                    EqBand::Mid => BiquadCoeffs::peaking(EQ_MID_FREQ, db, EQ_MID_Q, sr),
                    EqBand::High => BiquadCoeffs::high_shelf(EQ_HI_FREQ, db, sr),
                }
            };
        }

        self.eq_dirty = false;
    }
}
