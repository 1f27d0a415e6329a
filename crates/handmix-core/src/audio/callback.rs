//! State owned by the audio thread
//!
//! Both backends move one [`AudioCallbackState`] into their audio thread or
//! stream callback. It owns the engine, the command receiver, the stem
//! sources and every buffer, so rendering needs no lock and no allocation.

use std::sync::Arc;
use std::time::Instant;

use crate::engine::{AudioEngine, CommandReceiver, EngineAtomics, StemInputs, StemSource};
use crate::types::{Clock, Micros, StereoBuffer, StereoSample, MAX_QUANTUM_FRAMES};

/// Consumer side of an output tap, for recording what the engine renders
pub type TapReader = rtrb::Consumer<StereoSample>;

/// Everything the audio callback needs
pub struct AudioCallbackState {
    engine: AudioEngine,
    commands: CommandReceiver,
    sources: Vec<Box<dyn StemSource>>,
    inputs: StemInputs,
    /// Pre-allocated engine output for one quantum
    quantum_out: StereoBuffer,
    clock: Clock,
    atomics: Arc<EngineAtomics>,
    quantum_frames: usize,
    sample_rate: u32,
    /// Optional copy of the output for a recorder thread
    tap: Option<rtrb::Producer<StereoSample>>,
}

impl AudioCallbackState {
    pub fn new(
        engine: AudioEngine,
        commands: CommandReceiver,
        sources: Vec<Box<dyn StemSource>>,
        clock: Clock,
    ) -> Self {
        let quantum_frames = engine.config().quantum_frames;
        let sample_rate = engine.config().sample_rate;
        Self {
            inputs: StemInputs::new(engine.num_stems(), quantum_frames),
            quantum_out: StereoBuffer::silence(MAX_QUANTUM_FRAMES),
            atomics: engine.engine_atomics(),
            engine,
            commands,
            sources,
            clock,
            quantum_frames,
            sample_rate,
            tap: None,
        }
    }

    /// Copy every rendered sample into a ring of `capacity` samples
    ///
    /// Samples that don't fit are dropped; the audio thread never waits.
    pub fn with_tap(mut self, capacity: usize) -> (Self, TapReader) {
        let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
        self.tap = Some(producer);
        (self, consumer)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn quantum_frames(&self) -> usize {
        self.quantum_frames
    }

    pub fn engine_atomics(&self) -> Arc<EngineAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn is_stopped(&self) -> bool {
        self.engine.is_stopped()
    }

    /// Record a late wake-up detected by the driver
    pub fn note_overrun(&mut self) {
        self.engine.note_overrun();
    }

    /// Render `out.len()` frames, one engine quantum at a time
    ///
    /// Each quantum is stamped with its start on the session clock. The
    /// time spent is published as callback load; a callback that takes
    /// longer than the audio it produced counts as an overrun.
    pub fn render(&mut self, out: &mut [StereoSample]) {
        let started = Instant::now();
        let start_us = self.clock.micros_at(started);

        let mut offset = 0;
        while offset < out.len() {
            let frames = (out.len() - offset).min(self.quantum_frames);
            let quantum_start_us = start_us + frames_to_us(offset, self.sample_rate);

            self.inputs.set_frames(frames);
            self.inputs.fill(&mut self.sources);
            self.engine.process(
                quantum_start_us,
                &self.inputs,
                &mut self.quantum_out,
                &mut self.commands,
            );

            let rendered = self.quantum_out.as_slice();
            out[offset..offset + rendered.len()].copy_from_slice(rendered);
            if let Some(tap) = self.tap.as_mut() {
                for &sample in rendered {
                    if tap.push(sample).is_err() {
                        break;
                    }
                }
            }
            offset += rendered.len().max(1);
        }

        let budget_us = frames_to_us(out.len(), self.sample_rate).max(1);
        let elapsed_us = started.elapsed().as_micros() as Micros;
        let load = elapsed_us as f32 / budget_us as f32;
        self.atomics.callback_load.store(load);
        if load > 1.0 {
            self.engine.note_overrun();
        }
    }

    /// Render into interleaved device frames of `channels` channels
    ///
    /// Channels beyond the first two are filled with silence.
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize, scratch: &mut StereoBuffer) {
        let channels = channels.max(1);
        let mut frames_done = 0;
        let total = data.len() / channels;
        while frames_done < total {
            let chunk = (total - frames_done).min(scratch.capacity());
            scratch.set_len_from_capacity(chunk);
            self.render(scratch.as_mut_slice());
            let dst = &mut data[frames_done * channels..(frames_done + chunk) * channels];
            if channels == 2 {
                dst.copy_from_slice(scratch.as_interleaved());
                frames_done += chunk.max(1);
                continue;
            }
            for (frame, sample) in dst.chunks_mut(channels).zip(scratch.iter()) {
                frame[0] = sample.left;
                if channels > 1 {
                    frame[1] = sample.right;
                }
                for ch in frame.iter_mut().skip(2) {
                    *ch = 0.0;
                }
            }
            frames_done += chunk.max(1);
        }
    }
}

#[inline]
fn frames_to_us(frames: usize, sample_rate: u32) -> Micros {
    frames as Micros * 1_000_000 / sample_rate.max(1) as Micros
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{command_bus, ConstantSource, ControlCommand, ParamKind};

    fn state(sources: Vec<Box<dyn StemSource>>) -> (AudioCallbackState, crate::engine::CommandSender) {
        let config = EngineConfig { num_stems: sources.len(), quantum_frames: 64, ..Default::default() };
        let (tx, rx) = command_bus(config.bus_capacity);
        let engine = AudioEngine::new(config, 48000).unwrap();
        (AudioCallbackState::new(engine, rx, sources, Clock::new()), tx)
    }

    #[test]
    fn test_render_splits_into_quanta() {
        let (mut state, _tx) = state(vec![Box::new(ConstantSource(StereoSample::mono(0.25)))]);
        let mut out = vec![StereoSample::silence(); 200];
        for _ in 0..4 {
            state.render(&mut out);
        }
        assert!((out[199].left - 0.25).abs() < 1e-4);
        let atomics = state.engine_atomics();
        assert!(atomics.callback_load() >= 0.0);
    }

    #[test]
    fn test_commands_reach_engine() {
        let (mut state, mut tx) = state(vec![Box::new(ConstantSource(StereoSample::mono(0.5)))]);
        tx.send(ControlCommand::set(0, ParamKind::Volume, 0.5, 0));
        let mut out = vec![StereoSample::silence(); 256];
        for _ in 0..4 {
            state.render(&mut out);
        }
        assert!((out[255].left - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_interleaved_fills_extra_channels_with_silence() {
        let (mut state, _tx) = state(vec![Box::new(ConstantSource(StereoSample::new(0.1, 0.2)))]);
        let mut scratch = StereoBuffer::silence(32);
        let mut data = vec![9.0_f32; 4 * 100];
        for _ in 0..4 {
            state.render_interleaved(&mut data, 4, &mut scratch);
        }
        let last = &data[396..400];
        assert!((last[0] - 0.1).abs() < 1e-4);
        assert!((last[1] - 0.2).abs() < 1e-4);
        assert_eq!(&last[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_interleaved_stereo_copies_frames() {
        let (mut state, _tx) = state(vec![Box::new(ConstantSource(StereoSample::new(0.1, -0.2)))]);
        let mut scratch = StereoBuffer::silence(48);
        let mut data = vec![9.0_f32; 2 * 100];
        for _ in 0..4 {
            state.render_interleaved(&mut data, 2, &mut scratch);
        }
        assert!((data[198] - 0.1).abs() < 1e-4);
        assert!((data[199] + 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_tap_copies_output() {
        let (state, _tx) = state(vec![Box::new(ConstantSource(StereoSample::mono(0.3)))]);
        let (mut state, mut reader) = state.with_tap(1024);
        let mut out = vec![StereoSample::silence(); 128];
        state.render(&mut out);
        assert_eq!(reader.slots(), 128);
        let first = reader.pop().unwrap();
        assert_eq!(first, out[0]);
    }
}
