//! DSP building blocks shared by the stem channels and the master bus
//!
//! Everything here is allocation-free and works on single samples so it can
//! run inside the per-quantum loop.

use std::f32::consts::PI;

/// Shelf slope shared by both shelving bands
const SHELF_SLOPE: f32 = 0.9;

/// Two-pole filter memory for one channel (transposed direct form II)
#[derive(Debug, Clone, Copy, Default)]
struct Section {
    s1: f32,
    s2: f32,
}

impl Section {
    #[inline]
    fn tick(&mut self, x: f32, c: &BiquadCoeffs) -> f32 {
        let y = c.b0 * x + self.s1;
        self.s1 = flush_denormal(c.b1 * x - c.a1 * y + self.s2);
        self.s2 = flush_denormal(c.b2 * x - c.a2 * y);
        y
    }
}

/// Stereo filter memory for one EQ band
#[derive(Debug, Clone, Default)]
pub(crate) struct BiquadState {
    left: Section,
    right: Section,
}

impl BiquadState {
    #[inline]
    pub(crate) fn process(&mut self, left: f32, right: f32, coeffs: &BiquadCoeffs) -> (f32, f32) {
        (self.left.tick(left, coeffs), self.right.tick(right, coeffs))
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Biquad coefficients with `a0` divided out
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

/// Normalized angular frequency and the shelf/bell amplitude for a band
fn band_terms(freq: f32, gain_db: f32, sample_rate: f32) -> (f32, f32, f32) {
    let amp = 10.0_f32.powf(gain_db / 40.0);
    let w0 = 2.0 * PI * freq / sample_rate;
    (amp, w0.cos(), w0.sin())
}

impl BiquadCoeffs {
    fn normalized(b: [f32; 3], a: [f32; 3]) -> Self {
        let inv = 1.0 / a[0];
        Self { b0: b[0] * inv, b1: b[1] * inv, b2: b[2] * inv, a1: a[1] * inv, a2: a[2] * inv }
    }

    /// Shelving band; `low` picks which side of `freq` gets the gain
    fn shelf(low: bool, freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let (amp, cos, sin) = band_terms(freq, gain_db, sample_rate);
        let sign = if low { 1.0 } else { -1.0 };
        let alpha = sin / 2.0 * ((amp + 1.0 / amp) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt();
        let lift = 2.0 * amp.sqrt() * alpha;
        let (plus, minus) = (amp + 1.0, amp - 1.0);

        Self::normalized(
            [
                amp * (plus - sign * minus * cos + lift),
                2.0 * sign * amp * (minus - sign * plus * cos),
                amp * (plus - sign * minus * cos - lift),
            ],
            [
                plus + sign * minus * cos + lift,
                -2.0 * sign * (minus + sign * plus * cos),
                plus + sign * minus * cos - lift,
            ],
        )
    }

    pub(crate) fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        Self::shelf(true, freq, gain_db, sample_rate)
    }

    pub(crate) fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        Self::shelf(false, freq, gain_db, sample_rate)
    }

    /// Bell around `freq` with bandwidth `q`
    pub(crate) fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let (amp, cos, sin) = band_terms(freq, gain_db, sample_rate);
        let alpha = sin / (2.0 * q);
        Self::normalized(
            [1.0 + alpha * amp, -2.0 * cos, 1.0 - alpha * amp],
            [1.0 + alpha / amp, -2.0 * cos, 1.0 - alpha / amp],
        )
    }

    /// Identity filter
    pub(crate) fn passthrough() -> Self {
        Self::normalized([1.0, 0.0, 0.0], [1.0, 0.0, 0.0])
    }

    pub(crate) fn is_passthrough(&self) -> bool {
        *self == Self::passthrough()
    }
}

/// One-pole smoothing coefficient for a time constant
///
/// `coeff = exp(-1 / (τ × fs))`. A zero or negative τ yields 0 (no smoothing).
#[inline]
pub(crate) fn time_constant_coeff(tau_secs: f32, sample_rate: f32) -> f32 {
    if tau_secs <= 0.0 {
        return 0.0;
    }
    (-1.0 / (tau_secs * sample_rate)).exp()
}

/// Peak envelope follower with separate attack and release
#[derive(Debug, Clone)]
pub(crate) struct EnvelopeFollower {
    envelope: f32,
    rise: f32,
    fall: f32,
}

impl EnvelopeFollower {
    pub(crate) fn new(attack_secs: f32, release_secs: f32, sample_rate: f32) -> Self {
        Self {
            envelope: 0.0,
            rise: time_constant_coeff(attack_secs, sample_rate),
            fall: time_constant_coeff(release_secs, sample_rate),
        }
    }

    pub(crate) fn set_times(&mut self, attack_secs: f32, release_secs: f32, sample_rate: f32) {
        self.rise = time_constant_coeff(attack_secs, sample_rate);
        self.fall = time_constant_coeff(release_secs, sample_rate);
    }

    /// Feed one rectified level and return the new envelope
    #[inline]
    pub(crate) fn process(&mut self, level: f32) -> f32 {
        let coeff = if level > self.envelope { self.rise } else { self.fall };
        self.envelope = flush_denormal(level + coeff * (self.envelope - level));
        self.envelope
    }

    pub(crate) fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Linear parameter ramp across one quantum
///
/// Gain-like parameters move from their previous value to the new target
/// over the quantum instead of jumping, which keeps changes click-free.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinearRamp {
    current: f32,
    target: f32,
}

impl LinearRamp {
    pub(crate) fn new(value: f32) -> Self {
        Self { current: value, target: value }
    }

    pub(crate) fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump straight to a value
    pub(crate) fn reset(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    #[inline]
    pub(crate) fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub(crate) fn current(&self) -> f32 {
        self.current
    }

    /// Per-sample increment for a quantum of `frames`
    #[inline]
    pub(crate) fn step(&self, frames: usize) -> f32 {
        if frames == 0 {
            0.0
        } else {
            (self.target - self.current) / frames as f32
        }
    }

    /// Commit the end of the quantum
    #[inline]
    pub(crate) fn finish(&mut self) {
        self.current = self.target;
    }
}

/// Replace subnormal values with zero so feedback paths don't stall the FPU
#[inline]
pub(crate) fn flush_denormal(value: f32) -> f32 {
    if value.abs() < 1e-20 { 0.0 } else { value }
}

/// Constant-power pan law
///
/// Returns `(left_gain, right_gain)` for `pan` in [-1, 1], normalized so the
/// center position is unity on both sides.
#[inline]
pub(crate) fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * 0.25 * PI;
    let norm = std::f32::consts::SQRT_2;
    (angle.cos() * norm, angle.sin() * norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_biquad_is_identity() {
        let mut state = BiquadState::default();
        let coeffs = BiquadCoeffs::passthrough();
        for step in 0..16 {
            let x = (step as f32 * 0.3).sin();
            let (l, r) = state.process(x, -x, &coeffs);
            assert_eq!(l, x);
            assert_eq!(r, -x);
        }
    }

    #[test]
    fn test_low_shelf_boosts_dc() {
        let coeffs = BiquadCoeffs::low_shelf(100.0, 6.0, 48000.0);
        let mut state = BiquadState::default();
        let mut out = 0.0;
        for _ in 0..48000 {
            out = state.process(1.0, 1.0, &coeffs).0;
        }
        // +6 dB at DC is ~2x
        assert!((out - 1.995).abs() < 0.05, "DC gain was {}", out);
    }

    #[test]
    fn test_high_shelf_leaves_dc_and_peaking_leaves_dc() {
        for coeffs in [
            BiquadCoeffs::high_shelf(8000.0, -12.0, 48000.0),
            BiquadCoeffs::peaking(1000.0, 9.0, 0.7, 48000.0),
        ] {
            let mut state = BiquadState::default();
            let mut out = 0.0;
            for _ in 0..48000 {
                out = state.process(1.0, 1.0, &coeffs).1;
            }
            assert!((out - 1.0).abs() < 0.01, "DC gain was {}", out);
        }
    }

    #[test]
    fn test_envelope_attack_faster_than_release() {
        let mut env = EnvelopeFollower::new(0.001, 0.1, 48000.0);
        let after_attack = (0..480).map(|_| env.process(1.0)).last().unwrap();
        assert!(after_attack > 0.99);

        // 10 ms into a 100 ms release: still above 0.85
        let after_release = (0..480).map(|_| env.process(0.0)).last().unwrap();
        assert!(after_release > 0.85);
    }

    #[test]
    fn test_pan_center_is_unity() {
        let (l, r) = pan_gains(0.0);
        assert!((l - 1.0).abs() < 1e-5);
        assert!((r - 1.0).abs() < 1e-5);

        let (l, r) = pan_gains(-1.0);
        assert!((l - std::f32::consts::SQRT_2).abs() < 1e-5);
        assert!(r.abs() < 1e-5);
    }

    #[test]
    fn test_ramp_reaches_target() {
        let mut ramp = LinearRamp::new(0.0);
        ramp.set_target(1.0);
        let step = ramp.step(128);
        let mut value = ramp.current();
        for _ in 0..128 {
            value += step;
        }
        assert!((value - 1.0).abs() < 1e-4);
        ramp.finish();
        assert_eq!(ramp.current(), ramp.target());
    }
}
