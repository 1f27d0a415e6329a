//! Shared audio and timing types
//!
//! Samples and buffers used by the engine, the drivers and the stem
//! sources, plus the session clock that both timing domains stamp with.

use std::ops::{AddAssign, Index, IndexMut, Mul, MulAssign};
use std::time::Instant;

/// Engine sample rate unless configured otherwise
pub const SAMPLE_RATE: u32 = 48000;

/// Most stems one engine mixes
pub const MAX_STEMS: usize = 8;

/// Largest processing quantum in frames
///
/// Audio-thread buffers are allocated at this length once; a quantum only
/// changes their working length.
pub const MAX_QUANTUM_FRAMES: usize = 4096;

/// Session time in microseconds
pub type Micros = u64;

pub type Sample = f32;

/// One stereo frame
///
/// `#[repr(C)]` and `Pod` make `&[StereoSample]` castable to interleaved
/// `&[f32]` without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub const fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub const fn silence() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Same value on both sides
    #[inline]
    pub const fn mono(value: Sample) -> Self {
        Self::new(value, value)
    }

    /// Larger absolute value of the two sides
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, gain: Sample) -> Self {
        Self::new(self.left * gain, self.right * gain)
    }
}

impl MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, gain: Sample) {
        *self = *self * gain;
    }
}

/// Pre-allocated run of stereo frames
///
/// Audio-thread buffers come from [`StereoBuffer::silence`] at
/// [`MAX_QUANTUM_FRAMES`]; [`set_len_from_capacity`](Self::set_len_from_capacity)
/// then sizes them per quantum without allocating.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    frames: Vec<StereoSample>,
}

impl StereoBuffer {
    /// `len` frames of silence
    pub fn silence(len: usize) -> Self {
        Self { frames: vec![StereoSample::silence(); len] }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.frames.capacity()
    }

    /// Set the working length, at most the capacity (real-time safe)
    ///
    /// Frames exposed by growing are silent.
    #[inline]
    pub fn set_len_from_capacity(&mut self, len: usize) {
        let len = len.min(self.frames.capacity());
        self.frames.resize(len, StereoSample::silence());
    }

    pub fn fill_silence(&mut self) {
        self.frames.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.frames
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.frames
    }

    /// The frames as interleaved `[L, R, L, R, ...]`
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.frames)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StereoSample> {
        self.frames.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, StereoSample> {
        self.frames.iter_mut()
    }

    /// Largest absolute sample in the buffer
    pub fn peak(&self) -> Sample {
        self.frames.iter().map(StereoSample::peak).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &StereoSample {
        &self.frames[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut StereoSample {
        &mut self.frames[index]
    }
}

/// Session clock shared by the control and audio domains
///
/// Both sides stamp with microseconds since the same origin, so a command's
/// timestamp can be compared directly against a quantum's start time.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    /// Start a new clock at zero
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Microseconds elapsed since the clock started
    #[inline]
    pub fn now_us(&self) -> Micros {
        self.micros_at(Instant::now())
    }

    /// An instant on this clock's timebase (0 for instants before the origin)
    #[inline]
    pub fn micros_at(&self, instant: Instant) -> Micros {
        instant.saturating_duration_since(self.origin).as_micros() as Micros
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Linear amplitude in dB, floored at -120 dB
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-6).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_arithmetic() {
        let mut a = StereoSample::new(1.0, 2.0);
        a += StereoSample::mono(0.5);
        assert_eq!(a, StereoSample::new(1.5, 2.5));
        assert_eq!(a * 2.0, StereoSample::new(3.0, 5.0));
        a *= 0.0;
        assert_eq!(a, StereoSample::silence());
        assert_eq!(StereoSample::new(-0.7, 0.2).peak(), 0.7);
    }

    #[test]
    fn test_interleaved_view() {
        let mut buffer = StereoBuffer::silence(3);
        buffer[0] = StereoSample::new(1.0, 2.0);
        buffer[2] = StereoSample::new(5.0, 6.0);
        assert_eq!(buffer.as_interleaved(), &[1.0, 2.0, 0.0, 0.0, 5.0, 6.0]);
        assert_eq!(buffer.peak(), 6.0);
    }

    #[test]
    fn test_working_length_stays_within_capacity() {
        let mut buffer = StereoBuffer::silence(64);
        let capacity = buffer.capacity();

        buffer.set_len_from_capacity(16);
        assert_eq!(buffer.len(), 16);

        buffer.set_len_from_capacity(10_000);
        assert_eq!(buffer.len(), capacity);
        assert_eq!(buffer.capacity(), capacity);
        assert!(buffer.iter().all(|s| *s == StereoSample::silence()));
    }

    #[test]
    fn test_db_conversion() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0) - 0.501).abs() < 0.01);
        assert!((linear_to_db(0.5) + 6.02).abs() < 0.01);
        assert_eq!(linear_to_db(0.0), -120.0);
    }

    #[test]
    fn test_clock_timebase() {
        let before = Instant::now();
        let clock = Clock::new();
        let a = clock.now_us();
        let b = clock.now_us();
        assert!(b >= a);
        assert_eq!(clock.micros_at(before), 0);
    }
}
