//! Per-tick control loop
//!
//! ```text
//!   HandFrames ─► LandmarkSmoother ─► GestureClassifier ─► MappingEngine ─► CommandSender ─► (audio thread)
//!                                                                  │
//!                                   LatencyMonitor ◄── stage marks ┘
//! ```
//!
//! [`ControlLoop::tick`] runs one capture tick on the calling thread. The
//! host decides the cadence; the loop only measures whether a tick fit in
//! its period and adapts to the monitor's quality level:
//!
//! | Quality | Smoother | Classifier |
//! |---|---|---|
//! | Full | full covariance updates | every tick |
//! | Reduced | converged filters reuse their gain | every tick |
//! | Minimal | as Reduced | every 2nd tick |

use std::sync::Arc;

use handmix_core::engine::{CommandSender, ControlCommand, SendOutcome};
use handmix_core::monitor::{LatencyMonitor, QualityLevel, Stage};
use handmix_core::types::{Clock, Micros};

use crate::classifier::{GestureClassifier, GestureEvent};
use crate::config::GestureConfig;
use crate::landmark::{HandFrame, NUM_SLOTS};
use crate::mapping::MappingEngine;
use crate::observe::{try_publish, ControlObserver, UiEvent};
use crate::smoother::{LandmarkSmoother, SmootherPrecision};

/// What one tick produced
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub events: Vec<GestureEvent>,
    pub commands: Vec<ControlCommand>,
    /// Commands that could not enter the ring and were staged or merged
    pub deferred: usize,
}

/// Capture → smooth → classify → map → bus, one tick at a time
pub struct ControlLoop {
    smoother: LandmarkSmoother,
    classifier: GestureClassifier,
    mapping: MappingEngine,
    commands: CommandSender,
    monitor: LatencyMonitor,
    observer: Arc<ControlObserver>,
    ui: Option<flume::Sender<UiEvent>>,
    clock: Clock,
    period_us: u64,
    quality: QualityLevel,
}

impl ControlLoop {
    /// Build a loop on the session `clock`
    ///
    /// `num_stems` sizes the observer's per-stem slots.
    pub fn new(
        config: &GestureConfig,
        mapping: MappingEngine,
        commands: CommandSender,
        monitor: LatencyMonitor,
        clock: Clock,
        num_stems: usize,
    ) -> Self {
        Self {
            smoother: LandmarkSmoother::new(config.smoother.clone()),
            classifier: GestureClassifier::new(config.classifier.clone()),
            mapping,
            commands,
            monitor,
            observer: Arc::new(ControlObserver::new(num_stems)),
            ui: None,
            clock,
            period_us: config.tick_period_us(),
            quality: QualityLevel::Full,
        }
    }

    /// Also stream gesture events and commands to a UI
    pub fn with_ui(mut self, ui: flume::Sender<UiEvent>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn observer(&self) -> Arc<ControlObserver> {
        Arc::clone(&self.observer)
    }

    pub fn monitor(&self) -> &LatencyMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut LatencyMonitor {
        &mut self.monitor
    }

    pub fn mapping(&self) -> &MappingEngine {
        &self.mapping
    }

    /// Run one tick now
    ///
    /// `frames` is the newest capture (empty when no hand was detected);
    /// `dropped` counts captures superseded since the previous tick.
    pub fn tick(&mut self, frames: &[HandFrame], dropped: u64) -> TickReport {
        let now = self.clock.now_us();
        self.run(frames, dropped, now, true)
    }

    /// Run one tick at an explicit session time, with stage marks at that time
    pub fn tick_at(&mut self, frames: &[HandFrame], dropped: u64, now_us: Micros) -> TickReport {
        self.run(frames, dropped, now_us, false)
    }

    fn run(&mut self, frames: &[HandFrame], dropped: u64, now_us: Micros, live: bool) -> TickReport {
        self.monitor.poll_engine();
        self.apply_quality(self.monitor.quality());

        if dropped > 0 {
            self.monitor.note_dropped_frames(dropped);
            self.observer.add_dropped_frames(dropped);
        }
        self.monitor.begin_tick(frames.iter().map(|f| f.captured_at_us).max());

        let hands = self.smoother.update(frames);
        // Gestures of a lost hand end now, so restore rules still fire
        let lost: Vec<usize> = self.smoother.lost_slots().collect();
        let mut events = Vec::new();
        for slot in lost {
            events.extend(self.classifier.release_slot(slot));
        }
        events.extend(self.classifier.classify(&hands));
        self.mark(Stage::Classified, now_us, live);

        let commands = self.mapping.map(&events, now_us);
        self.mark(Stage::Mapped, now_us, live);

        let mut deferred = 0;
        if commands.is_empty() {
            // Keep staged commands moving even on quiet ticks
            self.commands.flush();
        }
        for command in &commands {
            match self.commands.send(*command) {
                SendOutcome::Queued => {}
                SendOutcome::Staged | SendOutcome::Coalesced | SendOutcome::Dropped => deferred += 1,
            }
            self.observer.publish_command(command);
        }

        for event in &events {
            log::debug!(
                "[GESTURE] {} {:?} {:?} conf {:.2} param {:.3}",
                event.kind,
                event.hand,
                event.phase,
                event.confidence,
                event.param
            );
        }
        if let Some(ui) = &self.ui {
            for event in &events {
                try_publish(ui, &self.observer, UiEvent::Gesture(*event));
            }
            for command in &commands {
                try_publish(ui, &self.observer, UiEvent::Command(*command));
            }
        }

        for slot in 0..NUM_SLOTS {
            self.observer.publish_slot(
                slot,
                self.smoother.is_tracking(slot),
                self.classifier.active_gesture(slot),
            );
        }

        let overrun = live && self.clock.now_us().saturating_sub(now_us) > self.period_us;
        self.monitor.end_tick(commands.len(), overrun);

        TickReport { events, commands, deferred }
    }

    fn mark(&mut self, stage: Stage, now_us: Micros, live: bool) {
        if live {
            self.monitor.mark(stage);
        } else {
            self.monitor.mark_at(stage, now_us);
        }
    }

    fn apply_quality(&mut self, quality: QualityLevel) {
        if quality == self.quality {
            return;
        }
        let (precision, divisor) = match quality {
            QualityLevel::Full => (SmootherPrecision::Full, 1),
            QualityLevel::Reduced => (SmootherPrecision::Reduced, 1),
            QualityLevel::Minimal => (SmootherPrecision::Reduced, 2),
        };
        self.smoother.set_precision(precision);
        self.classifier.set_tick_divisor(divisor);
        self.quality = quality;
    }
}
