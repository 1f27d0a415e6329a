//! Observable control-path state for a host UI
//!
//! The control loop writes, the UI reads. Nothing here is ever read back
//! into the control or audio path:
//!
//! - [`ControlObserver`]: relaxed atomics the UI can poll at any rate
//! - [`UiEvent`] stream: a bounded flume channel fed with `try_send`, so a
//!   lagging UI loses events instead of stalling the control loop

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use handmix_core::engine::{AtomicF32, ControlCommand, ParamKind};

use crate::classifier::{GestureEvent, GestureKind};
use crate::landmark::NUM_SLOTS;

/// Lock-free snapshot of the control path
///
/// Shared as `Arc<ControlObserver>` between the control loop and the UI.
#[derive(Debug)]
pub struct ControlObserver {
    hand_present: [AtomicBool; NUM_SLOTS],
    /// [`GestureKind::code`] per slot, 0 for none
    active_gesture: [AtomicU32; NUM_SLOTS],
    dropped_frames: AtomicU64,
    commands_sent: AtomicU64,
    ui_events_dropped: AtomicU64,
    /// Per stem: [`ParamKind::code`] of the last command, 0 for none
    last_param: Vec<AtomicU32>,
    /// Per stem: value of the last command
    last_value: Vec<AtomicF32>,
}

impl ControlObserver {
    pub fn new(num_stems: usize) -> Self {
        Self {
            hand_present: [AtomicBool::new(false), AtomicBool::new(false)],
            active_gesture: [AtomicU32::new(0), AtomicU32::new(0)],
            dropped_frames: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            ui_events_dropped: AtomicU64::new(0),
            last_param: (0..num_stems).map(|_| AtomicU32::new(0)).collect(),
            last_value: (0..num_stems).map(|_| AtomicF32::new(0.0)).collect(),
        }
    }

    /// Whether the slot is currently tracked
    pub fn hand_present(&self, slot: usize) -> bool {
        self.hand_present
            .get(slot)
            .is_some_and(|present| present.load(Ordering::Relaxed))
    }

    /// Gesture engaged on the slot
    pub fn active_gesture(&self, slot: usize) -> Option<GestureKind> {
        self.active_gesture
            .get(slot)
            .and_then(|code| GestureKind::from_code(code.load(Ordering::Relaxed)))
    }

    /// Frames superseded before the control loop consumed them
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent.load(Ordering::Relaxed)
    }

    pub fn ui_events_dropped(&self) -> u64 {
        self.ui_events_dropped.load(Ordering::Relaxed)
    }

    /// Parameter and value of the last command sent to a stem
    pub fn last_command(&self, stem: usize) -> Option<(ParamKind, f32)> {
        let code = self.last_param.get(stem)?.load(Ordering::Relaxed);
        let param = ParamKind::from_code(code)?;
        Some((param, self.last_value[stem].load()))
    }

    pub(crate) fn publish_slot(&self, slot: usize, present: bool, gesture: Option<GestureKind>) {
        if slot >= NUM_SLOTS {
            return;
        }
        self.hand_present[slot].store(present, Ordering::Relaxed);
        self.active_gesture[slot].store(gesture.map_or(0, GestureKind::code), Ordering::Relaxed);
    }

    pub(crate) fn publish_command(&self, command: &ControlCommand) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
        if let (Some(param), Some(value)) = (self.last_param.get(command.stem), self.last_value.get(command.stem)) {
            value.store(command.value);
            param.store(command.param.code(), Ordering::Relaxed);
        }
    }

    pub(crate) fn add_dropped_frames(&self, count: u64) {
        self.dropped_frames.fetch_add(count, Ordering::Relaxed);
    }
}

/// What the control loop tells a UI
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiEvent {
    Gesture(GestureEvent),
    Command(ControlCommand),
}

/// Create a bounded UI event channel
pub fn ui_channel(capacity: usize) -> (flume::Sender<UiEvent>, flume::Receiver<UiEvent>) {
    flume::bounded(capacity.max(1))
}

/// Send without blocking; returns false when the event was dropped
pub(crate) fn try_publish(tx: &flume::Sender<UiEvent>, observer: &ControlObserver, event: UiEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(flume::TrySendError::Full(_)) => {
            observer.ui_events_dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
        // Nobody listening
        Err(flume::TrySendError::Disconnected(_)) => false,
    }
}
