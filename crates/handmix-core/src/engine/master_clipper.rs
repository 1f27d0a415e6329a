//! Master soft clipper: tanh saturation above a knee
//!
//! First stage of the master chain:
//!   stem sum → **soft clipper** → limiter → output
//!
//! Properties:
//! - Pure bypass when the signal is below the knee (bit-identical output)
//! - Above the knee the excess is folded through `tanh`, so the output
//!   never exceeds 1.0 (very hot input saturates at exactly 1.0 in f32)
//! - Zero latency; the only state is a count of saturated quanta

use crate::types::StereoBuffer;

/// Default knee in linear amplitude (≈ -1.9 dBFS)
pub const DEFAULT_SOFT_CLIP_KNEE: f32 = 0.8;

/// Master soft clipper.
///
/// `y = x` for `|x| <= knee`, otherwise
/// `y = sign(x) × (knee + (1 - knee) × tanh((|x| - knee) / (1 - knee)))`.
/// The curve is continuous with slope 1 at the knee.
pub struct SoftClipper {
    /// Knee in linear amplitude, in (0, 1)
    knee: f32,
    /// Pre-computed: 1 - knee
    headroom: f32,

    /// Quanta in which at least one sample left the linear region
    saturated_quanta: u64,
}

impl SoftClipper {
    pub fn new() -> Self {
        Self::with_knee(DEFAULT_SOFT_CLIP_KNEE)
    }

    /// Knee clamped to [0.1, 0.99]; non-finite knees use the default
    pub fn with_knee(knee: f32) -> Self {
        let knee = if knee.is_finite() { knee.clamp(0.1, 0.99) } else { DEFAULT_SOFT_CLIP_KNEE };
        Self {
            knee,
            headroom: 1.0 - knee,
            saturated_quanta: 0,
        }
    }

    /// Quanta that saturated since construction
    pub fn saturated_quanta(&self) -> u64 {
        self.saturated_quanta
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let mut hit = false;
        for frame in buffer.iter_mut() {
            let (left, l_hit) = self.shape(frame.left);
            let (right, r_hit) = self.shape(frame.right);
            frame.left = left;
            frame.right = right;
            hit |= l_hit || r_hit;
        }
        if hit {
            self.saturated_quanta += 1;
        }
    }

    /// Shaped sample, and whether it left the linear region
    ///
    /// NaN and infinities come out silent.
    #[inline]
    fn shape(&self, x: f32) -> (f32, bool) {
        if !x.is_finite() {
            return (0.0, true);
        }
        let over = x.abs() - self.knee;
        if over <= 0.0 {
            return (x, false);
        }
        let y = self.knee + self.headroom * (over / self.headroom).tanh();
        (y.copysign(x), true)
    }
}

impl Default for SoftClipper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn buffer_of(values: &[f32]) -> StereoBuffer {
        let mut buf = StereoBuffer::silence(values.len());
        for (s, &v) in buf.iter_mut().zip(values) {
            *s = StereoSample::new(v, -v);
        }
        buf
    }

    #[test]
    fn test_below_knee_is_bit_identical() {
        let mut clipper = SoftClipper::new();
        let mut buf = buffer_of(&[0.0, 0.1, -0.5, 0.79]);
        clipper.process(&mut buf);
        assert_eq!(buf[3].left, 0.79);
        assert_eq!(buf[2].right, 0.5);
        assert_eq!(clipper.saturated_quanta(), 0);
    }

    #[test]
    fn test_hot_input_never_exceeds_one() {
        let mut clipper = SoftClipper::new();
        let mut buf = buffer_of(&[1.0, 2.0, 8.0, 1000.0]);
        clipper.process(&mut buf);
        for s in buf.iter() {
            assert!(s.left <= 1.0 && s.left > 0.8);
            assert!(s.right >= -1.0 && s.right < -0.8);
        }
        // tanh rounds to 1.0 in f32 for large arguments
        assert_eq!(buf[3].left, 1.0);
        assert!(buf[0].left < 1.0);

        clipper.process(&mut buffer_of(&[0.1]));
        clipper.process(&mut buffer_of(&[1.5]));
        assert_eq!(clipper.saturated_quanta(), 2);
    }

    #[test]
    fn test_curve_is_monotonic() {
        let clipper = SoftClipper::with_knee(0.5);
        let mut prev = -1.0;
        for step in 0..400 {
            let (y, _) = clipper.shape(step as f32 * 0.01);
            assert!(y >= prev);
            prev = y;
        }
    }

    #[test]
    fn test_non_finite_becomes_silence() {
        let mut clipper = SoftClipper::new();
        let mut buf = buffer_of(&[f32::NAN, f32::INFINITY]);
        clipper.process(&mut buf);
        assert_eq!(buf[0].left, 0.0);
        assert_eq!(buf[1].left, 0.0);
    }
}
