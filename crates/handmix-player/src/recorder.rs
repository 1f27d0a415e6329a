//! Offline render of the mixed output
//!
//! The audio thread copies every rendered sample into a tap ring; the main
//! thread drains it into a 32-bit float stereo WAV.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

use handmix_core::audio::TapReader;

/// Seconds of audio the tap ring can hold between drains
pub const TAP_SECONDS: usize = 2;

pub struct WavRecorder {
    path: PathBuf,
    writer: WavWriter<BufWriter<File>>,
    tap: TapReader,
    frames: u64,
}

impl WavRecorder {
    pub fn create(path: &Path, sample_rate: u32, tap: TapReader) -> Result<Self> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let writer = WavWriter::create(path, spec).with_context(|| format!("Failed to create WAV {:?}", path))?;
        log::info!("[SESSION] Recording output to {:?} ({} Hz)", path, sample_rate);
        Ok(Self { path: path.to_path_buf(), writer, tap, frames: 0 })
    }

    /// Write whatever the tap holds; returns the frames written
    pub fn drain(&mut self) -> Result<usize> {
        let mut written = 0;
        while let Ok(sample) = self.tap.pop() {
            self.writer.write_sample(sample.left)?;
            self.writer.write_sample(sample.right)?;
            written += 1;
        }
        self.frames += written as u64;
        Ok(written)
    }

    /// Drain the rest and close the file; returns the total frames
    pub fn finish(mut self) -> Result<u64> {
        self.drain()?;
        self.writer
            .finalize()
            .with_context(|| format!("Failed to finalize WAV {:?}", self.path))?;
        log::info!("[SESSION] Wrote {} frames to {:?}", self.frames, self.path);
        Ok(self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handmix_core::audio::AudioCallbackState;
    use handmix_core::config::EngineConfig;
    use handmix_core::engine::{command_bus, AudioEngine, ConstantSource, StemSource};
    use handmix_core::types::{Clock, StereoSample};

    #[test]
    fn test_tap_drains_into_float_wav() {
        let config = EngineConfig { num_stems: 1, ..Default::default() };
        let engine = AudioEngine::new(config.clone(), config.sample_rate).unwrap();
        let (_tx, rx) = command_bus(16);
        let sources: Vec<Box<dyn StemSource>> = vec![Box::new(ConstantSource(StereoSample::mono(0.25)))];
        let (mut state, tap) = AudioCallbackState::new(engine, rx, sources, Clock::new()).with_tap(4096);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renders").join("out.wav");
        let mut recorder = WavRecorder::create(&path, config.sample_rate, tap).unwrap();

        let mut out = vec![StereoSample::silence(); 256];
        state.render(&mut out);
        assert_eq!(recorder.drain().unwrap(), 256);
        state.render(&mut out);
        assert_eq!(recorder.finish().unwrap(), 512);

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(spec.sample_rate, config.sample_rate);
        assert_eq!(reader.len(), 1024);
    }
}
