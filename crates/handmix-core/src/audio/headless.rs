//! Headless audio clock
//!
//! Renders one quantum per period on a dedicated `audio-clock` thread,
//! pacing itself against an `Instant` deadline. Used when no output device
//! is wanted (tests, offline renders, machines without audio).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::callback::AudioCallbackState;
use super::error::AudioResult;
use crate::types::{StereoBuffer, MAX_QUANTUM_FRAMES};

/// Handle to the headless audio thread
///
/// Dropping it stops and joins the thread.
pub struct HeadlessAudioHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
    buffer_size: u32,
}

impl HeadlessAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Stop rendering and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[AUDIO] Headless audio thread panicked");
            }
        }
    }
}

impl Drop for HeadlessAudioHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the headless audio clock
pub fn start_headless(mut state: AudioCallbackState) -> AudioResult<HeadlessAudioHandle> {
    let sample_rate = state.sample_rate();
    let frames = state.quantum_frames().min(MAX_QUANTUM_FRAMES);
    let period = Duration::from_secs_f64(frames as f64 / sample_rate.max(1) as f64);
    let running = Arc::new(AtomicBool::new(true));

    let thread = {
        let running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("audio-clock".to_string())
            .spawn(move || {
                let mut out = StereoBuffer::silence(frames);
                let mut deadline = Instant::now();
                while running.load(Ordering::Relaxed) {
                    state.render(out.as_mut_slice());

                    deadline += period;
                    let now = Instant::now();
                    if now > deadline + period {
                        // Woke up more than a period late: resync and fade in
                        state.note_overrun();
                        deadline = now;
                    } else if deadline > now {
                        std::thread::sleep(deadline - now);
                    }
                }
            })?
    };

    log::info!(
        "[AUDIO] Headless clock started: {} frames at {}Hz ({:.2}ms period)",
        frames,
        sample_rate,
        period.as_secs_f64() * 1000.0
    );

    Ok(HeadlessAudioHandle {
        running,
        thread: Some(thread),
        sample_rate,
        buffer_size: frames as u32,
    })
}
