//! A running gesture-mixing session
//!
//! Three threads besides the caller's:
//!
//! - `pose-feed`: paces a [`PoseSource`] and pushes frame sets into the pose channel
//! - `control-loop`: one [`ControlLoop`] tick per capture period, newest frame set only
//! - the audio thread (headless `audio-clock` or the device callback), owning the engine
//!
//! [`Session::shutdown`] fades the engine out before anything is torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{tick, Receiver, Sender};

use handmix_core::audio::{start_audio, AudioCallbackState, AudioHandle, TapReader};
use handmix_core::engine::{command_bus, AudioEngine, EngineAtomics, StemSource, ToneSource};
use handmix_core::monitor::{LatencyMonitor, MonitorAtomics, MonitorSnapshot};
use handmix_core::types::Clock;
use handmix_gesture::mapping::{MappingEngine, MappingProfile, ProfileHandle};
use handmix_gesture::{ui_channel, ControlLoop, ControlObserver, HandFrame, UiEvent};

use crate::config::PlayerConfig;
use crate::recorder::TAP_SECONDS;
use crate::replay::PoseSource;

/// Captures the feeder may run ahead of the control loop
const POSE_QUEUE: usize = 32;

/// Longest wait for the engine's fade-out
const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything needed to stop a session in order
pub struct Session {
    audio: AudioHandle,
    engine: Arc<EngineAtomics>,
    monitor: Arc<MonitorAtomics>,
    observer: Arc<ControlObserver>,
    profiles: Arc<ProfileHandle>,
    ui_events: flume::Receiver<UiEvent>,
    tap: Option<TapReader>,
    /// Dropping it ends the control loop
    control_stop: Sender<()>,
    control: JoinHandle<ControlLoop>,
    feeding: Arc<AtomicBool>,
    feed_done: Arc<AtomicBool>,
    feeder: JoinHandle<()>,
}

impl Session {
    /// Start audio, then the control loop, then the pose feed
    ///
    /// With `record` set (headless only) the mixed output is copied to a tap,
    /// see [`Session::take_tap`].
    pub fn start(
        config: &PlayerConfig,
        profile: MappingProfile,
        source: Box<dyn PoseSource>,
        record: bool,
    ) -> Result<Self> {
        let clock = Clock::new();
        let num_stems = config.engine.num_stems;
        let (commands, command_rx) = command_bus(config.engine.bus_capacity);

        let mut engine_atomics = None;
        let mut tap = None;
        let audio = start_audio(config.audio, config.engine.sample_rate, |rate| {
            let engine = AudioEngine::new(config.engine.clone(), rate)?;
            let state = AudioCallbackState::new(engine, command_rx, demo_stems(num_stems, rate), clock);
            engine_atomics = Some(state.engine_atomics());
            if record {
                let (state, reader) = state.with_tap(rate as usize * TAP_SECONDS);
                tap = Some(reader);
                Ok(state)
            } else {
                Ok(state)
            }
        })
        .context("Failed to start audio output")?;
        let engine = engine_atomics.ok_or_else(|| anyhow!("Audio backend started without an engine"))?;
        log::info!(
            "[SESSION] Audio running at {} Hz, {} frames ({:.1} ms)",
            audio.sample_rate(),
            audio.buffer_size(),
            audio.latency_ms()
        );

        let profiles = Arc::new(ProfileHandle::new(profile));
        let mapping = MappingEngine::new(Arc::clone(&profiles), config.mapping.clone(), num_stems);
        let monitor = LatencyMonitor::new(config.monitor.clone(), Arc::clone(&engine), clock);
        let monitor_atomics = monitor.observer();
        let (ui_tx, ui_events) = ui_channel(config.gesture.ui_queue);
        let control = ControlLoop::new(&config.gesture, mapping, commands, monitor, clock, num_stems).with_ui(ui_tx);
        let observer = control.observer();

        let (pose_tx, pose_rx) = flume::bounded(POSE_QUEUE);
        let (control_stop, stop_rx) = crossbeam::channel::bounded(0);
        let period = Duration::from_micros(config.gesture.tick_period_us());
        let control = spawn_control(control, pose_rx, stop_rx, period)?;

        let feeding = Arc::new(AtomicBool::new(true));
        let feed_done = Arc::new(AtomicBool::new(false));
        log::info!("[SESSION] Feeding poses from {}", source.describe());
        let feeder = spawn_feeder(source, pose_tx, clock, Arc::clone(&feeding), Arc::clone(&feed_done))?;

        Ok(Self {
            audio,
            engine,
            monitor: monitor_atomics,
            observer,
            profiles,
            ui_events,
            tap,
            control_stop,
            control,
            feeding,
            feed_done,
            feeder,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    pub fn observer(&self) -> &ControlObserver {
        &self.observer
    }

    pub fn monitor(&self) -> &MonitorAtomics {
        &self.monitor
    }

    pub fn profiles(&self) -> &ProfileHandle {
        &self.profiles
    }

    /// Gesture events and commands, as a UI would receive them
    pub fn ui_events(&self) -> &flume::Receiver<UiEvent> {
        &self.ui_events
    }

    /// The output tap of a recording session
    pub fn take_tap(&mut self) -> Option<TapReader> {
        self.tap.take()
    }

    /// The pose source has run out
    pub fn source_finished(&self) -> bool {
        self.feed_done.load(Ordering::Relaxed)
    }

    /// Fade out, stop audio, then stop the control side
    ///
    /// Returns the monitor's final summary.
    pub fn shutdown(mut self) -> Result<MonitorSnapshot> {
        log::info!("[SESSION] Shutting down");

        self.engine.request_stop();
        let deadline = Instant::now() + STOP_TIMEOUT;
        while !self.engine.is_stopped() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        if self.engine.is_stopped() {
            log::info!("[SESSION] Engine faded out");
        } else {
            log::warn!("[SESSION] Engine did not report stopped within {:?}", STOP_TIMEOUT);
        }

        self.audio.stop();

        self.feeding.store(false, Ordering::Relaxed);
        drop(self.control_stop);
        let mut control = self
            .control
            .join()
            .map_err(|_| anyhow!("Control thread panicked"))?;
        self.feeder.join().map_err(|_| anyhow!("Pose feed thread panicked"))?;

        log::info!("[SESSION] Stopped");
        Ok(control.monitor_mut().snapshot())
    }
}

/// Tone stems standing in for separated tracks: kick, bass, pad, hats
fn demo_stems(num_stems: usize, sample_rate: u32) -> Vec<Box<dyn StemSource>> {
    let rate = sample_rate as f32;
    (0..num_stems)
        .map(|stem| -> Box<dyn StemSource> {
            match stem % 4 {
                0 => Box::new(ToneSource::pulse(55.0, 0.5, 0.5, rate)),
                1 => Box::new(ToneSource::sine(110.0, 0.3, rate)),
                2 => Box::new(ToneSource::sine(330.0, 0.15, rate)),
                _ => Box::new(ToneSource::pulse(4_000.0, 0.1, 0.25, rate)),
            }
        })
        .collect()
}

fn spawn_control(
    mut control: ControlLoop,
    poses: flume::Receiver<Vec<HandFrame>>,
    stop: Receiver<()>,
    period: Duration,
) -> Result<JoinHandle<ControlLoop>> {
    let ticker = tick(period);
    std::thread::Builder::new()
        .name("control-loop".to_string())
        .spawn(move || {
            log::info!("[SESSION] Control loop ticking every {:?}", period);
            loop {
                crossbeam::select! {
                    recv(stop) -> _ => break,
                    recv(ticker) -> _ => {
                        // Only the newest capture counts; older ones are stale
                        let mut latest = None;
                        let mut dropped = 0;
                        for frames in poses.try_iter() {
                            if latest.replace(frames).is_some() {
                                dropped += 1;
                            }
                        }
                        control.tick(latest.as_deref().unwrap_or(&[]), dropped);
                    }
                }
            }
            control
        })
        .context("Failed to spawn control thread")
}

fn spawn_feeder(
    mut source: Box<dyn PoseSource>,
    poses: flume::Sender<Vec<HandFrame>>,
    clock: Clock,
    feeding: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("pose-feed".to_string())
        .spawn(move || {
            let start = Instant::now();
            while feeding.load(Ordering::Relaxed) {
                let Some(capture) = source.next_capture() else {
                    log::info!("[SESSION] Pose source exhausted");
                    break;
                };
                let due = start + Duration::from_secs_f64(capture.offset_ms / 1000.0);
                let now = Instant::now();
                if due > now {
                    std::thread::sleep(due - now);
                }
                if poses.send(capture.into_frames(clock.now_us())).is_err() {
                    break;
                }
            }
            done.store(true, Ordering::Relaxed);
        })
        .context("Failed to spawn pose feed thread")
}
