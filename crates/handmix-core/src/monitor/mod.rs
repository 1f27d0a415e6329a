//! Latency and performance monitor
//!
//! Runs on the control thread. Each control tick is timed stage by stage,
//! the engine's atomics are polled for the audio side of the round trip,
//! and sustained budget violations step the [`QualityLevel`] down so the
//! control path sheds work before audio glitches.
//!
//! The monitor is also where audio-thread events get logged: the callback
//! only bumps counters, and `poll_engine` turns new counts into log lines.

mod stats;

pub use stats::{RollingWindow, WindowStats};

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::{AtomicF32, EngineAtomics};
use crate::types::{Clock, Micros};

/// Thresholds and window sizes of the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Round-trip budget, capture to audible change
    pub max_round_trip_ms: f32,
    /// Callback time / quantum duration budget
    pub max_callback_load: f32,
    /// Consecutive ticks over budget before stepping quality down
    pub degrade_after_ticks: u32,
    /// Consecutive healthy ticks before stepping quality up
    pub recover_after_ticks: u32,
    /// Healthy means below this fraction of both budgets
    pub recover_fraction: f32,
    /// Samples kept per rolling window
    pub window: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_round_trip_ms: 50.0,
            max_callback_load: 0.8,
            degrade_after_ticks: 30,
            recover_after_ticks: 120,
            recover_fraction: 0.7,
            window: 120, // 2 s at 60 Hz
        }
    }
}

/// Processing quality the control path should run at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum QualityLevel {
    /// Full smoothing and classification every tick
    Full,
    /// Smoother reuses converged gains
    Reduced,
    /// Reduced smoothing and the classifier runs every 2nd tick
    Minimal,
}

impl QualityLevel {
    fn degrade(self) -> Self {
        match self {
            QualityLevel::Full => QualityLevel::Reduced,
            _ => QualityLevel::Minimal,
        }
    }

    fn recover(self) -> Self {
        match self {
            QualityLevel::Minimal => QualityLevel::Reduced,
            _ => QualityLevel::Full,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            QualityLevel::Full => 0,
            QualityLevel::Reduced => 1,
            QualityLevel::Minimal => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => QualityLevel::Reduced,
            2 => QualityLevel::Minimal,
            _ => QualityLevel::Full,
        }
    }
}

/// Pipeline stage boundaries marked during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Smoothing and classification done
    Classified,
    /// Mapping done, commands about to be sent
    Mapped,
}

/// Metrics published for the UI (lock-free)
#[derive(Debug, Default)]
pub struct MonitorAtomics {
    pub round_trip_p95_ms: AtomicF32,
    pub capture_to_event_p95_ms: AtomicF32,
    pub event_to_command_p95_ms: AtomicF32,
    pub apply_latency_ms: AtomicF32,
    pub callback_load: AtomicF32,
    quality: AtomicU8,
    pub tick_overruns: AtomicU64,
    pub dropped_frames: AtomicU64,
}

impl MonitorAtomics {
    pub fn quality(&self) -> QualityLevel {
        QualityLevel::from_u8(self.quality.load(Ordering::Relaxed))
    }
}

/// Point-in-time view of every metric
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub capture_to_event_ms: WindowStats,
    pub event_to_command_ms: WindowStats,
    pub apply_latency_ms: WindowStats,
    pub callback_load: WindowStats,
    pub round_trip_ms: WindowStats,
    pub quality: QualityLevel,
    pub ticks: u64,
    pub tick_overruns: u64,
    pub dropped_frames: u64,
    pub commands_sent: u64,
    pub rejected_commands: u64,
    pub audio_overruns: u64,
    pub audio_underruns: u64,
    pub clipped_quanta: u64,
}

impl std::fmt::Display for MonitorSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "round trip p95 {:.1}ms (max {:.1}), capture→event p95 {:.1}ms, \
             apply p95 {:.1}ms, load p95 {:.0}%, quality {:?}, {} ticks, \
             {} commands, {} rejected, {} dropped frames, {} tick overruns, \
             {} audio overruns, {} underruns, {} clipped quanta",
            self.round_trip_ms.p95,
            self.round_trip_ms.max,
            self.capture_to_event_ms.p95,
            self.apply_latency_ms.p95,
            self.callback_load.p95 * 100.0,
            self.quality,
            self.ticks,
            self.commands_sent,
            self.rejected_commands,
            self.dropped_frames,
            self.tick_overruns,
            self.audio_overruns,
            self.audio_underruns,
            self.clipped_quanta,
        )
    }
}

/// Engine counters as of the last poll, for diffing
#[derive(Debug, Default, Clone, Copy)]
struct EngineCounters {
    quanta: u64,
    rejected: u64,
    overruns: u64,
    underruns: u64,
    clipped: u64,
}

/// Per-stage latency tracking with adaptive quality
pub struct LatencyMonitor {
    config: MonitorConfig,
    clock: Clock,
    engine: Arc<EngineAtomics>,
    atomics: Arc<MonitorAtomics>,

    capture_to_event: RollingWindow,
    event_to_command: RollingWindow,
    apply_latency: RollingWindow,
    callback_load: RollingWindow,
    round_trip: RollingWindow,

    // Current tick
    captured_at: Option<Micros>,
    classified_at: Option<Micros>,
    mapped_at: Option<Micros>,

    /// Latest apply latency reported by the engine, in ms
    last_apply_ms: f32,
    seen: EngineCounters,

    quality: QualityLevel,
    over_ticks: u32,
    under_ticks: u32,

    ticks: u64,
    tick_overruns: u64,
    dropped_frames: u64,
    commands_sent: u64,
}

impl LatencyMonitor {
    /// Create a monitor timing against `clock`, the session clock
    pub fn new(config: MonitorConfig, engine: Arc<EngineAtomics>, clock: Clock) -> Self {
        let window = config.window;
        Self {
            config,
            clock,
            engine,
            atomics: Arc::new(MonitorAtomics::default()),
            capture_to_event: RollingWindow::new(window),
            event_to_command: RollingWindow::new(window),
            apply_latency: RollingWindow::new(window),
            callback_load: RollingWindow::new(window),
            round_trip: RollingWindow::new(window),
            captured_at: None,
            classified_at: None,
            mapped_at: None,
            last_apply_ms: 0.0,
            seen: EngineCounters::default(),
            quality: QualityLevel::Full,
            over_ticks: 0,
            under_ticks: 0,
            ticks: 0,
            tick_overruns: 0,
            dropped_frames: 0,
            commands_sent: 0,
        }
    }

    /// Metrics handle for the UI
    pub fn observer(&self) -> Arc<MonitorAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn quality(&self) -> QualityLevel {
        self.quality
    }

    /// Start timing a tick whose newest frame was captured at `captured_at_us`
    ///
    /// Pass `None` when the tick had no frame.
    pub fn begin_tick(&mut self, captured_at_us: Option<Micros>) {
        self.captured_at = captured_at_us;
        self.classified_at = None;
        self.mapped_at = None;
    }

    /// Mark the end of a stage at the current time
    pub fn mark(&mut self, stage: Stage) {
        let now = self.clock.now_us();
        self.mark_at(stage, now);
    }

    /// Mark the end of a stage at an explicit time
    pub fn mark_at(&mut self, stage: Stage, now_us: Micros) {
        match stage {
            Stage::Classified => self.classified_at = Some(now_us),
            Stage::Mapped => self.mapped_at = Some(now_us),
        }
    }

    /// Count frames that were superseded before a tick consumed them
    pub fn note_dropped_frames(&mut self, count: u64) {
        if count == 0 {
            return;
        }
        self.dropped_frames += count;
        self.atomics.dropped_frames.store(self.dropped_frames, Ordering::Relaxed);
    }

    /// Finish the tick: record stage latencies and update quality
    ///
    /// `overrun` is true when the tick took longer than the capture period.
    pub fn end_tick(&mut self, commands_sent: usize, overrun: bool) {
        self.ticks += 1;
        self.commands_sent += commands_sent as u64;
        if overrun {
            self.tick_overruns += 1;
            self.atomics.tick_overruns.store(self.tick_overruns, Ordering::Relaxed);
            log::debug!("[MONITOR] Control tick overran its period");
        }

        if let (Some(captured), Some(classified)) = (self.captured_at, self.classified_at) {
            self.capture_to_event.push(us_to_ms(classified.saturating_sub(captured)));
        }
        if let (Some(classified), Some(mapped)) = (self.classified_at, self.mapped_at) {
            self.event_to_command.push(us_to_ms(mapped.saturating_sub(classified)));
        }
        if let (Some(captured), Some(mapped)) = (self.captured_at, self.mapped_at) {
            let control_ms = us_to_ms(mapped.saturating_sub(captured));
            self.round_trip.push(control_ms + self.last_apply_ms);
        }

        self.update_quality();
        self.publish();
    }

    /// Read the engine atomics, log audio-side events and record the load
    pub fn poll_engine(&mut self) {
        let engine = &self.engine;

        let rejected = engine.rejected();
        if rejected > self.seen.rejected {
            let last = engine.last_rejected();
            log::warn!(
                "[MONITOR] Engine rejected {} command(s), last: stem {} {}",
                rejected - self.seen.rejected,
                last.stem,
                last.param.map_or_else(|| "unknown".to_string(), |p| p.to_string())
            );
            self.seen.rejected = rejected;
        }

        let overruns = engine.overruns.load(Ordering::Relaxed);
        if overruns > self.seen.overruns {
            log::warn!(
                "[MONITOR] Audio callback overran its budget {} time(s)",
                overruns - self.seen.overruns
            );
            self.seen.overruns = overruns;
        }

        let underruns = engine.underruns.load(Ordering::Relaxed);
        if underruns > self.seen.underruns {
            log::warn!(
                "[MONITOR] {} stem input underrun(s) concealed",
                underruns - self.seen.underruns
            );
            self.seen.underruns = underruns;
        }

        let clipped = engine.clipped_quanta.load(Ordering::Relaxed);
        if clipped > self.seen.clipped {
            log::debug!("[MONITOR] Master soft clipper saturated in {} quanta", clipped - self.seen.clipped);
            self.seen.clipped = clipped;
        }

        // Apply latency is republished once per report interval
        let quanta = engine.quanta.load(Ordering::Relaxed);
        if quanta != self.seen.quanta {
            self.seen.quanta = quanta;
            self.last_apply_ms = us_to_ms(engine.max_apply_latency_us());
            self.apply_latency.push(self.last_apply_ms);
        }

        self.callback_load.push(engine.callback_load());
    }

    pub fn snapshot(&mut self) -> MonitorSnapshot {
        MonitorSnapshot {
            capture_to_event_ms: self.capture_to_event.stats(),
            event_to_command_ms: self.event_to_command.stats(),
            apply_latency_ms: self.apply_latency.stats(),
            callback_load: self.callback_load.stats(),
            round_trip_ms: self.round_trip.stats(),
            quality: self.quality,
            ticks: self.ticks,
            tick_overruns: self.tick_overruns,
            dropped_frames: self.dropped_frames,
            commands_sent: self.commands_sent,
            rejected_commands: self.engine.rejected(),
            audio_overruns: self.engine.overruns.load(Ordering::Relaxed),
            audio_underruns: self.engine.underruns.load(Ordering::Relaxed),
            clipped_quanta: self.engine.clipped_quanta.load(Ordering::Relaxed),
        }
    }

    fn update_quality(&mut self) {
        let round_trip = self.round_trip.p95();
        let load = self.callback_load.last().unwrap_or(0.0);
        let cfg = &self.config;

        let over = round_trip > cfg.max_round_trip_ms || load > cfg.max_callback_load;
        let healthy = round_trip < cfg.max_round_trip_ms * cfg.recover_fraction
            && load < cfg.max_callback_load * cfg.recover_fraction;

        if over {
            self.over_ticks += 1;
            self.under_ticks = 0;
        } else if healthy {
            self.under_ticks += 1;
            self.over_ticks = 0;
        } else {
            self.over_ticks = 0;
            self.under_ticks = 0;
        }

        if self.over_ticks >= cfg.degrade_after_ticks && self.quality != QualityLevel::Minimal {
            let next = self.quality.degrade();
            log::warn!(
                "[MONITOR] Over budget (round trip p95 {:.1}ms, load {:.0}%), quality {:?} -> {:?}",
                round_trip,
                load * 100.0,
                self.quality,
                next
            );
            self.quality = next;
            self.over_ticks = 0;
        } else if self.under_ticks >= cfg.recover_after_ticks && self.quality != QualityLevel::Full {
            let next = self.quality.recover();
            log::info!("[MONITOR] Back within budget, quality {:?} -> {:?}", self.quality, next);
            self.quality = next;
            self.under_ticks = 0;
        }
    }

    fn publish(&mut self) {
        let atomics = &self.atomics;
        atomics.round_trip_p95_ms.store(self.round_trip.p95());
        atomics.capture_to_event_p95_ms.store(self.capture_to_event.p95());
        atomics.event_to_command_p95_ms.store(self.event_to_command.p95());
        atomics.apply_latency_ms.store(self.last_apply_ms);
        atomics.callback_load.store(self.callback_load.last().unwrap_or(0.0));
        atomics.quality.store(self.quality.to_u8(), Ordering::Relaxed);
    }
}

#[inline]
fn us_to_ms(us: Micros) -> f32 {
    us as f32 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ParamKind;

    fn monitor(config: MonitorConfig) -> (LatencyMonitor, Arc<EngineAtomics>) {
        let engine = Arc::new(EngineAtomics::new());
        (LatencyMonitor::new(config, Arc::clone(&engine), Clock::new()), engine)
    }

    /// Run one tick with the given control-side latency in ms
    fn tick(monitor: &mut LatencyMonitor, start_us: Micros, control_ms: u64) {
        monitor.begin_tick(Some(start_us));
        monitor.mark_at(Stage::Classified, start_us + control_ms * 500);
        monitor.mark_at(Stage::Mapped, start_us + control_ms * 1000);
        monitor.poll_engine();
        monitor.end_tick(1, false);
    }

    #[test]
    fn test_stage_latencies_are_recorded() {
        let (mut monitor, _) = monitor(MonitorConfig::default());
        tick(&mut monitor, 10_000, 8);
        let snap = monitor.snapshot();
        assert_eq!(snap.capture_to_event_ms.max, 4.0);
        assert_eq!(snap.event_to_command_ms.max, 4.0);
        assert_eq!(snap.round_trip_ms.max, 8.0);
        assert_eq!(snap.commands_sent, 1);
    }

    #[test]
    fn test_apply_latency_joins_round_trip() {
        let (mut monitor, engine) = monitor(MonitorConfig::default());
        engine.max_apply_latency_us.store(6_000, Ordering::Relaxed);
        engine.quanta.store(32, Ordering::Relaxed);
        tick(&mut monitor, 0, 4);
        assert_eq!(monitor.snapshot().round_trip_ms.max, 10.0);
    }

    #[test]
    fn test_sustained_overload_degrades_then_recovers() {
        let config = MonitorConfig {
            degrade_after_ticks: 5,
            recover_after_ticks: 10,
            window: 8,
            ..Default::default()
        };
        let (mut monitor, _) = monitor(config);
        let observer = monitor.observer();

        for i in 0..4 {
            tick(&mut monitor, i * 16_000, 80);
        }
        assert_eq!(monitor.quality(), QualityLevel::Full, "not yet sustained");

        for i in 4..9 {
            tick(&mut monitor, i * 16_000, 80);
        }
        assert_eq!(monitor.quality(), QualityLevel::Reduced);
        for i in 9..12 {
            tick(&mut monitor, i * 16_000, 80);
        }
        assert_eq!(monitor.quality(), QualityLevel::Minimal);
        assert_eq!(observer.quality(), QualityLevel::Minimal);

        // 8 healthy ticks flush the window, 10 more recover one level
        for i in 12..29 {
            tick(&mut monitor, i * 16_000, 5);
        }
        assert_eq!(monitor.quality(), QualityLevel::Reduced);
        for i in 29..39 {
            tick(&mut monitor, i * 16_000, 5);
        }
        assert_eq!(monitor.quality(), QualityLevel::Full);
    }

    #[test]
    fn test_callback_load_alone_degrades() {
        let config = MonitorConfig { degrade_after_ticks: 3, ..Default::default() };
        let (mut monitor, engine) = monitor(config);
        engine.callback_load.store(0.95);
        for i in 0..3 {
            tick(&mut monitor, i * 16_000, 1);
        }
        assert_eq!(monitor.quality(), QualityLevel::Reduced);
    }

    #[test]
    fn test_engine_events_are_counted_once() {
        let (mut monitor, engine) = monitor(MonitorConfig::default());
        engine.record_rejection(9, ParamKind::Volume);
        engine.underruns.fetch_add(2, Ordering::Relaxed);
        monitor.poll_engine();
        monitor.poll_engine();
        let snap = monitor.snapshot();
        assert_eq!(snap.rejected_commands, 1);
        assert_eq!(snap.audio_underruns, 2);
        assert_eq!(monitor.seen.rejected, 1);

        engine.clipped_quanta.store(5, Ordering::Relaxed);
        monitor.poll_engine();
        assert_eq!(monitor.seen.clipped, 5);
        assert_eq!(monitor.snapshot().clipped_quanta, 5);
    }

    #[test]
    fn test_tick_overruns_and_drops() {
        let (mut monitor, _) = monitor(MonitorConfig::default());
        monitor.begin_tick(None);
        monitor.note_dropped_frames(3);
        monitor.end_tick(0, true);
        let observer = monitor.observer();
        assert_eq!(observer.tick_overruns.load(Ordering::Relaxed), 1);
        assert_eq!(observer.dropped_frames.load(Ordering::Relaxed), 3);
        assert_eq!(monitor.snapshot().round_trip_ms.count, 0);
    }
}
