//! Stem audio inputs
//!
//! Decoding and stem separation live outside this crate. Whatever produces
//! stem audio implements [`StemSource`]; the audio thread pulls one quantum
//! per stem into [`StemInputs`] before the engine runs.

use std::f32::consts::TAU;

use crate::types::{StereoBuffer, StereoSample};

/// Samples over which a starved stem's tail fades to silence
const STARVATION_RAMP: usize = 64;

/// Producer of one stem's audio
///
/// `render` runs on the audio thread: it must not block or allocate.
pub trait StemSource: Send {
    /// Fill `out` with the next samples and return how many were written
    ///
    /// Returning fewer than `out.len()` signals starvation.
    fn render(&mut self, out: &mut [StereoSample]) -> usize;
}

/// Pre-allocated per-stem input buffers for one quantum
pub struct StemInputs {
    buffers: Vec<StereoBuffer>,
    frames: usize,
    /// Stems that came up short in the last `fill`
    starved: usize,
}

impl StemInputs {
    /// Allocate buffers for `num_stems` stems of up to `max_frames` each
    pub fn new(num_stems: usize, max_frames: usize) -> Self {
        Self {
            buffers: (0..num_stems).map(|_| StereoBuffer::silence(max_frames)).collect(),
            frames: max_frames,
            starved: 0,
        }
    }

    pub fn num_stems(&self) -> usize {
        self.buffers.len()
    }

    /// Frames in the current quantum
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Change the quantum length (capped at the allocated size, real-time safe)
    pub fn set_frames(&mut self, frames: usize) {
        for buffer in &mut self.buffers {
            buffer.set_len_from_capacity(frames);
        }
        self.frames = self.buffers.first().map_or(0, |b| b.len());
    }

    /// Input samples of one stem (empty for an unknown stem)
    #[inline]
    pub fn stem(&self, index: usize) -> &[StereoSample] {
        self.buffers.get(index).map_or(&[], |b| b.as_slice())
    }

    /// Mutable input samples of one stem
    pub fn stem_mut(&mut self, index: usize) -> Option<&mut [StereoSample]> {
        self.buffers.get_mut(index).map(|b| b.as_mut_slice())
    }

    /// Number of stems that delivered fewer frames than the quantum on the
    /// last `fill`
    #[inline]
    pub fn starved(&self) -> usize {
        self.starved
    }

    /// Pull one quantum from every source
    ///
    /// Stems without a source are silent. A source that returns short has its
    /// last sample faded to silence over at most [`STARVATION_RAMP`] samples.
    pub fn fill(&mut self, sources: &mut [Box<dyn StemSource>]) -> usize {
        self.starved = 0;
        for (index, buffer) in self.buffers.iter_mut().enumerate() {
            let out = buffer.as_mut_slice();
            let Some(source) = sources.get_mut(index) else {
                out.fill(StereoSample::silence());
                continue;
            };
            let written = source.render(out).min(out.len());
            if written < out.len() {
                conceal_tail(out, written);
                self.starved += 1;
            }
        }
        self.starved
    }
}

/// Fade from the last delivered sample down to silence
fn conceal_tail(out: &mut [StereoSample], written: usize) {
    let last = if written > 0 { out[written - 1] } else { StereoSample::silence() };
    let missing = out.len() - written;
    let ramp = missing.min(STARVATION_RAMP);
    for (k, sample) in out[written..].iter_mut().enumerate() {
        *sample = if k < ramp {
            last * (1.0 - (k + 1) as f32 / ramp as f32)
        } else {
            StereoSample::silence()
        };
    }
}

/// Waveform of a [`ToneSource`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToneShape {
    Sine,
    /// Decaying sine burst retriggered every `period_secs`, like a kick drum
    Pulse { period_secs: f32, decay_secs: f32 },
}

/// Synthetic oscillator stem
#[derive(Debug, Clone)]
pub struct ToneSource {
    shape: ToneShape,
    amplitude: f32,
    phase: f32,
    phase_inc: f32,
    sample_rate: f32,
    /// Samples since the last pulse trigger
    elapsed: u64,
}

impl ToneSource {
    pub fn sine(freq_hz: f32, amplitude: f32, sample_rate: f32) -> Self {
        Self::new(ToneShape::Sine, freq_hz, amplitude, sample_rate)
    }

    pub fn pulse(freq_hz: f32, amplitude: f32, period_secs: f32, sample_rate: f32) -> Self {
        let shape = ToneShape::Pulse { period_secs, decay_secs: period_secs * 0.25 };
        Self::new(shape, freq_hz, amplitude, sample_rate)
    }

    pub fn new(shape: ToneShape, freq_hz: f32, amplitude: f32, sample_rate: f32) -> Self {
        Self {
            shape,
            amplitude,
            phase: 0.0,
            phase_inc: TAU * freq_hz / sample_rate,
            sample_rate,
            elapsed: 0,
        }
    }

    #[inline]
    fn envelope(&mut self) -> f32 {
        match self.shape {
            ToneShape::Sine => 1.0,
            ToneShape::Pulse { period_secs, decay_secs } => {
                let period = (period_secs * self.sample_rate).max(1.0) as u64;
                if self.elapsed >= period {
                    self.elapsed = 0;
                    self.phase = 0.0;
                }
                let t = self.elapsed as f32 / self.sample_rate;
                self.elapsed += 1;
                (-t / decay_secs.max(1e-4)).exp()
            }
        }
    }
}

impl StemSource for ToneSource {
    fn render(&mut self, out: &mut [StereoSample]) -> usize {
        for sample in out.iter_mut() {
            let env = self.envelope();
            *sample = StereoSample::mono(self.phase.sin() * self.amplitude * env);
            self.phase += self.phase_inc;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
        out.len()
    }
}

/// Stem holding a constant sample value
#[derive(Debug, Clone, Copy)]
pub struct ConstantSource(pub StereoSample);

impl StemSource for ConstantSource {
    fn render(&mut self, out: &mut [StereoSample]) -> usize {
        out.fill(self.0);
        out.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Delivers a fixed number of frames per call
    struct ShortSource(usize);

    impl StemSource for ShortSource {
        fn render(&mut self, out: &mut [StereoSample]) -> usize {
            let n = self.0.min(out.len());
            out[..n].fill(StereoSample::mono(1.0));
            n
        }
    }

    #[test]
    fn test_fill_without_sources_is_silent() {
        let mut inputs = StemInputs::new(2, 32);
        inputs.stem_mut(1).unwrap().fill(StereoSample::mono(0.3));
        inputs.fill(&mut []);
        assert!(inputs.stem(1).iter().all(|s| *s == StereoSample::silence()));
        assert_eq!(inputs.starved(), 0);
    }

    #[test]
    fn test_starved_tail_ramps_to_silence() {
        let mut inputs = StemInputs::new(1, 256);
        let mut sources: Vec<Box<dyn StemSource>> = vec![Box::new(ShortSource(100))];
        assert_eq!(inputs.fill(&mut sources), 1);

        let stem = inputs.stem(0);
        assert_eq!(stem[99].left, 1.0);
        for pair in stem[99..170].windows(2) {
            assert!(pair[1].left <= pair[0].left);
            assert!(pair[0].left - pair[1].left <= 1.0 / 64.0 + 1e-6);
        }
        assert_eq!(stem[163].left, 0.0);
        assert!(stem[164..].iter().all(|s| s.left == 0.0));
    }

    #[test]
    fn test_set_frames_caps_at_capacity() {
        let mut inputs = StemInputs::new(3, 128);
        inputs.set_frames(64);
        assert_eq!(inputs.frames(), 64);
        assert_eq!(inputs.stem(2).len(), 64);
        inputs.set_frames(4096);
        assert_eq!(inputs.frames(), 128);
    }

    #[test]
    fn test_tone_source_amplitude() {
        let mut tone = ToneSource::sine(440.0, 0.5, 48000.0);
        let mut out = vec![StereoSample::silence(); 480];
        assert_eq!(tone.render(&mut out), 480);
        let peak = out.iter().map(|s| s.peak()).fold(0.0, f32::max);
        assert!(peak > 0.49 && peak <= 0.5);
    }

    #[test]
    fn test_pulse_decays_and_retriggers() {
        let mut pulse = ToneSource::pulse(60.0, 1.0, 0.1, 1000.0);
        let mut out = vec![StereoSample::silence(); 200];
        pulse.render(&mut out);
        let early = out[..25].iter().map(|s| s.peak()).fold(0.0, f32::max);
        let late = out[75..100].iter().map(|s| s.peak()).fold(0.0, f32::max);
        assert!(early > late * 5.0, "early {} late {}", early, late);
        let retrigger = out[100..125].iter().map(|s| s.peak()).fold(0.0, f32::max);
        assert!(retrigger > late * 5.0);
    }
}
