//! Audio output drivers
//!
//! The audio thread owns the [`AudioEngine`](crate::engine::AudioEngine)
//! exclusively, wrapped in an [`AudioCallbackState`]:
//!
//! - **Headless**: a paced `audio-clock` thread, always available
//! - **Device**: a CPAL output stream (with the `cpal-backend` feature)
//!
//! Control reaches the engine only through the command bus; the engine
//! reports back only through atomics.

mod callback;
#[cfg(feature = "cpal-backend")]
mod cpal_backend;
mod error;
mod headless;

pub use callback::{AudioCallbackState, TapReader};
#[cfg(feature = "cpal-backend")]
pub use cpal_backend::{open_default_device, start_device, CpalAudioHandle};
pub use error::{AudioError, AudioResult};
pub use headless::{start_headless, HeadlessAudioHandle};

use crate::config::AudioBackendChoice;

/// Handle to the active audio output
///
/// Keeps audio running. Drop or `stop` it to end output.
pub enum AudioHandle {
    Headless(HeadlessAudioHandle),
    #[cfg(feature = "cpal-backend")]
    Cpal(CpalAudioHandle),
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        match self {
            AudioHandle::Headless(h) => h.sample_rate(),
            #[cfg(feature = "cpal-backend")]
            AudioHandle::Cpal(h) => h.sample_rate(),
        }
    }

    /// Frames per callback
    pub fn buffer_size(&self) -> u32 {
        match self {
            AudioHandle::Headless(h) => h.buffer_size(),
            #[cfg(feature = "cpal-backend")]
            AudioHandle::Cpal(h) => h.buffer_size(),
        }
    }

    /// Output latency in milliseconds (one buffer)
    pub fn latency_ms(&self) -> f32 {
        self.buffer_size() as f32 / self.sample_rate().max(1) as f32 * 1000.0
    }

    pub fn stop(&mut self) {
        match self {
            AudioHandle::Headless(h) => h.stop(),
            #[cfg(feature = "cpal-backend")]
            AudioHandle::Cpal(h) => h.stop(),
        }
    }
}

/// Start audio output on the chosen backend
///
/// `build` receives the sample rate the output will actually run at (a
/// device may not support the requested one) and returns the callback state
/// to move onto the audio thread.
pub fn start_audio<F>(backend: AudioBackendChoice, requested_rate: u32, build: F) -> AudioResult<AudioHandle>
where
    F: FnOnce(u32) -> AudioResult<AudioCallbackState>,
{
    match backend {
        AudioBackendChoice::Headless => {
            let state = build(requested_rate)?;
            Ok(AudioHandle::Headless(start_headless(state)?))
        }
        AudioBackendChoice::Device => start_device_output(requested_rate, build),
    }
}

#[cfg(feature = "cpal-backend")]
fn start_device_output<F>(requested_rate: u32, build: F) -> AudioResult<AudioHandle>
where
    F: FnOnce(u32) -> AudioResult<AudioCallbackState>,
{
    let (device, supported) = open_default_device(requested_rate)?;
    let state = build(supported.sample_rate().0)?;
    Ok(AudioHandle::Cpal(start_device(&device, &supported, state)?))
}

#[cfg(not(feature = "cpal-backend"))]
fn start_device_output<F>(_requested_rate: u32, _build: F) -> AudioResult<AudioHandle>
where
    F: FnOnce(u32) -> AudioResult<AudioCallbackState>,
{
    Err(AudioError::BackendUnavailable)
}
