//! Master peak limiter
//!
//! Last stage of the master bus: stem sum → soft clipper → **limiter** → out.
//!
//! The signal is delayed by a short lookahead while the gain computer sees
//! every sample first, so gain reduction is already in place when a peak
//! leaves the delay line. Whatever the envelope hasn't absorbed is clamped
//! at the ceiling, which makes the output bound hard: no sample ever
//! exceeds the ceiling, whatever the gesture path asks of the stems.
//!
//! Processing never allocates; every ring is a fixed array.

use crate::types::{db_to_linear, StereoBuffer, StereoSample};

/// Ring length, enough for 5 ms of lookahead at 192 kHz
const RING: usize = 1024;

/// Lookahead in seconds
const LOOKAHEAD_SECS: f32 = 0.0015;

/// Time constant of gain recovery in seconds
const RELEASE_SECS: f32 = 0.1;

/// ln(0.01): the attack settles to 1% within the lookahead
const ATTACK_LN: f32 = -4.605_17;

/// Default output ceiling in dBFS
pub const DEFAULT_CEILING_DB: f32 = -0.3;

/// Fixed-length stereo delay
struct DelayLine {
    ring: [StereoSample; RING],
    delay: usize,
}

impl DelayLine {
    fn new(delay: usize) -> Self {
        Self { ring: [StereoSample::silence(); RING], delay }
    }

    /// Store `input` at `pos` and return the sample written `delay` positions ago
    #[inline]
    fn exchange(&mut self, pos: usize, input: StereoSample) -> StereoSample {
        let out = self.ring[(pos + RING - self.delay) % RING];
        self.ring[pos] = input;
        out
    }
}

/// Gain each upcoming sample needs, and the envelope that follows it
struct GainComputer {
    /// Required gain per ring position (1.0 when under the ceiling)
    required: [f32; RING],
    window: usize,
    current: f32,
    attack: f32,
    release: f32,
}

impl GainComputer {
    fn new(window: usize, sample_rate: f32) -> Self {
        Self {
            required: [1.0; RING],
            window,
            current: 1.0,
            attack: (ATTACK_LN / window as f32).exp(),
            release: (-1.0 / (RELEASE_SECS * sample_rate)).exp(),
        }
    }

    /// Record the need at `pos` and advance the envelope one sample
    #[inline]
    fn step(&mut self, pos: usize, need: f32) -> f32 {
        self.required[pos] = need;
        let lowest = (0..=self.window)
            .map(|back| self.required[(pos + RING - back) % RING])
            .fold(1.0_f32, f32::min);
        let coeff = if lowest < self.current { self.attack } else { self.release };
        self.current = lowest + (self.current - lowest) * coeff;
        self.current
    }
}

/// Lookahead limiter with a brickwall ceiling
///
/// Below the ceiling the output is the input, delayed by
/// [`latency_samples`](Self::latency_samples).
pub struct MasterLimiter {
    /// Linear ceiling, at most 1.0
    ceiling: f32,
    lookahead: usize,
    sample_rate: f32,
    delay: DelayLine,
    gain: GainComputer,
    pos: usize,
}

impl MasterLimiter {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_ceiling_db(DEFAULT_CEILING_DB, sample_rate)
    }

    /// Limiter at `db` dBFS; ceilings above 0 dBFS are lowered to 0
    pub fn with_ceiling_db(db: f32, sample_rate: f32) -> Self {
        let lookahead = ((LOOKAHEAD_SECS * sample_rate).round() as usize).clamp(1, RING - 1);
        Self {
            ceiling: db_to_linear(db.min(0.0)),
            lookahead,
            sample_rate,
            delay: DelayLine::new(lookahead),
            gain: GainComputer::new(lookahead, sample_rate),
            pos: 0,
        }
    }

    pub fn latency_samples(&self) -> usize {
        self.lookahead
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Empty the delay and return to unity gain
    pub fn reset(&mut self) {
        self.delay = DelayLine::new(self.lookahead);
        self.gain = GainComputer::new(self.lookahead, self.sample_rate);
        self.pos = 0;
    }

    /// Limit a buffer in place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let ceiling = self.ceiling;
        for sample in buffer.iter_mut() {
            let peak = sample.peak();
            let need = if peak > ceiling { ceiling / peak } else { 1.0 };
            let gain = self.gain.step(self.pos, need);
            let delayed = self.delay.exchange(self.pos, *sample);

            sample.left = (delayed.left * gain).clamp(-ceiling, ceiling);
            sample.right = (delayed.right * gain).clamp(-ceiling, ceiling);
            self.pos = (self.pos + 1) % RING;
        }
    }
}
