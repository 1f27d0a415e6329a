//! CPAL audio backend implementation
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control Thread  │───send()───────────►│    Command Bus      │
//! │   (60 Hz tick)   │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │
//!         │ Relaxed atomics                           │ drain_due()
//!         │                                           ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  EngineAtomics   │◄────────────────────│  CPAL Audio Thread  │
//! │   (lock-free)    │    relaxed stores   │  (owns AudioEngine) │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The callback state is handed to the stream through a slot that the
//! first callback empties; from then on the audio thread is its only owner
//! and renders without locking.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};

use super::callback::AudioCallbackState;
use super::error::{AudioError, AudioResult};
use crate::types::{StereoBuffer, MAX_QUANTUM_FRAMES};

/// CPAL-specific audio handle
///
/// Keeps the audio stream alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    stream: Option<Stream>,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Stop the stream (drops it)
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }
}

/// Default output device and the stream format to open it with
///
/// The format's sample rate is `sample_rate` when the device supports it.
pub fn open_default_device(sample_rate: u32) -> AudioResult<(cpal::Device, cpal::SupportedStreamConfig)> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or(AudioError::NoDefaultDevice)?;
    log::info!(
        "[AUDIO] Output device: {}",
        device.name().unwrap_or_else(|_| "(unnamed)".to_string())
    );
    let format = pick_format(&device, sample_rate)?;
    Ok((device, format))
}

/// Stereo f32 output format, at `wanted_rate` when any range covers it
fn pick_format(device: &cpal::Device, wanted_rate: u32) -> AudioResult<cpal::SupportedStreamConfig> {
    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|r| r.sample_format() == SampleFormat::F32 && r.channels() >= 2)
        .collect();

    let covers = |r: &SupportedStreamConfigRange| (r.min_sample_rate().0..=r.max_sample_rate().0).contains(&wanted_rate);
    if let Some(range) = ranges.iter().find(|r| covers(r)) {
        return Ok(range.clone().with_sample_rate(cpal::SampleRate(wanted_rate)));
    }

    let range = ranges
        .first()
        .ok_or_else(|| AudioError::ConfigError("device has no stereo f32 output".to_string()))?;
    let rate = range.max_sample_rate();
    log::warn!("[AUDIO] {} Hz unsupported by the device, running at {} Hz", wanted_rate, rate.0);
    Ok(range.clone().with_sample_rate(rate))
}

/// Open and start the output stream
///
/// `state` must have been built for `format.sample_rate()`. A fixed buffer
/// of one quantum is requested first; devices that refuse it get their
/// default buffer size.
pub fn start_device(
    device: &cpal::Device,
    format: &cpal::SupportedStreamConfig,
    state: AudioCallbackState,
) -> AudioResult<CpalAudioHandle> {
    let quantum = state.quantum_frames() as u32;
    let channels = format.channels();
    let sample_rate = format.sample_rate().0;
    let fixed = StreamConfig {
        channels,
        sample_rate: format.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(quantum),
    };

    // The state moves into whichever stream gets built
    let state = Arc::new(Mutex::new(Some(state)));
    let stream = match build_stream(device, &fixed, &state) {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!("[AUDIO] Fixed {}-frame buffer refused ({}), using the device default", quantum, e);
            let flexible = StreamConfig { buffer_size: CpalBufferSize::Default, ..fixed };
            build_stream(device, &flexible, &state)?
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    log::info!(
        "[AUDIO] Stream started: {} channels, {} Hz, {} frames per quantum",
        channels,
        sample_rate,
        quantum
    );

    Ok(CpalAudioHandle { stream: Some(stream), sample_rate, buffer_size: quantum })
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: &Arc<Mutex<Option<AudioCallbackState>>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let pending = Arc::clone(state);
    let mut owned: Option<AudioCallbackState> = None;
    let mut scratch = StereoBuffer::silence(MAX_QUANTUM_FRAMES);
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                // Take ownership on the first callback, then never lock again
                if owned.is_none() {
                    owned = pending.try_lock().ok().and_then(|mut slot| slot.take());
                }
                match owned.as_mut() {
                    Some(state) => state.render_interleaved(data, channels, &mut scratch),
                    None => data.fill(0.0),
                }
            },
            |err| log::error!("[AUDIO] Output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
