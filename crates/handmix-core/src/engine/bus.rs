//! Command bus between the control thread and the audio thread
//!
//! This is the only synchronization point between the two timing domains.
//! The control thread owns a [`CommandSender`], the audio thread owns a
//! [`CommandReceiver`], and the transport between them is an `rtrb`
//! single-producer single-consumer ring buffer:
//!
//! - **No allocations on the audio side**: the ring is allocated at startup
//! - **Wait-free**: push and pop are O(1) and never block
//! - **Ordered**: the sender stamps commands in non-decreasing time order
//!
//! # Overflow
//!
//! When the ring is full the sender never blocks and never grows without
//! bound. Commands move to a small producer-side stage keyed by
//! `(stem, parameter)`. A second command for a key that is already staged
//! replaces it (deltas are folded in), so the newest value always wins and
//! the stage can never hold more entries than there are distinct targets.
//! Staged commands are moved into the ring, oldest first, as soon as the
//! audio thread frees slots.
//!
//! # Usage
//!
//! ```ignore
//! let (mut tx, mut rx) = command_bus(DEFAULT_BUS_CAPACITY);
//!
//! // Control thread
//! tx.send(ControlCommand::set(0, ParamKind::Volume, 0.5, clock.now_us()));
//!
//! // Audio thread, once per quantum
//! rx.drain_due(quantum_start_us, |cmd| engine.apply_command(cmd));
//! ```

use super::command::{CommandMode, ControlCommand, ParamKind};
use crate::types::{Micros, MAX_STEMS};

/// Default ring capacity in commands
///
/// A control tick produces a handful of commands at 60Hz, so 1024 covers
/// several seconds of a stalled audio thread before staging kicks in.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Number of distinct (stem, parameter) targets, which bounds the stage
///
/// 15 per-stem parameters plus one entry per unordered crossfade pair.
pub const STAGE_CAPACITY: usize = MAX_STEMS * 15 + MAX_STEMS * (MAX_STEMS - 1) / 2;

/// What happened to a command handed to [`CommandSender::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Pushed straight into the ring
    Queued,
    /// Ring full, parked in the overflow stage
    Staged,
    /// Ring full, merged into an already staged command for the same target
    Coalesced,
    /// Stage full, the oldest staged command was dropped to make room
    Dropped,
}

/// Sender statistics (control thread only)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub sent: u64,
    pub coalesced: u64,
    pub dropped: u64,
    pub clamped_timestamps: u64,
}

/// Create a new command bus (sender/receiver pair)
///
/// `capacity` is the ring size in commands and is raised to at least 1.
pub fn command_bus(capacity: usize) -> (CommandSender, CommandReceiver) {
    let capacity = capacity.max(1);
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    (
        CommandSender {
            producer,
            staged: Vec::with_capacity(STAGE_CAPACITY),
            last_timestamp: 0,
            stats: BusStats::default(),
        },
        CommandReceiver { consumer, capacity },
    )
}

/// Control-side half of the bus
pub struct CommandSender {
    producer: rtrb::Producer<ControlCommand>,
    /// Overflow stage, at most one entry per target
    staged: Vec<ControlCommand>,
    last_timestamp: Micros,
    stats: BusStats,
}

impl CommandSender {
    /// Send a command to the audio engine (never blocks)
    ///
    /// Timestamps earlier than the previously sent one are raised to it, so
    /// the receiver always sees non-decreasing timestamps.
    pub fn send(&mut self, mut cmd: ControlCommand) -> SendOutcome {
        if cmd.timestamp_us < self.last_timestamp {
            cmd.timestamp_us = self.last_timestamp;
            self.stats.clamped_timestamps += 1;
        }
        self.last_timestamp = cmd.timestamp_us;
        self.stats.sent += 1;

        // Staged commands are older than anything new, they go first
        self.flush();

        if self.staged.is_empty() {
            match self.producer.push(cmd) {
                Ok(()) => return SendOutcome::Queued,
                Err(rtrb::PushError::Full(returned)) => cmd = returned,
            }
        }

        self.stage(cmd)
    }

    /// Move staged commands into the ring, oldest first
    ///
    /// Returns the number of commands still staged.
    pub fn flush(&mut self) -> usize {
        while !self.staged.is_empty() && self.producer.slots() > 0 {
            let oldest = self.oldest_staged();
            let cmd = self.staged.remove(oldest);
            if let Err(rtrb::PushError::Full(cmd)) = self.producer.push(cmd) {
                self.staged.insert(oldest, cmd);
                break;
            }
        }
        self.staged.len()
    }

    /// Number of commands waiting in the overflow stage
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Check if the ring has space for more commands
    pub fn has_space(&self) -> bool {
        self.producer.slots() > 0
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    fn stage(&mut self, cmd: ControlCommand) -> SendOutcome {
        let key = cmd.key();
        if let Some(existing) = self.staged.iter_mut().find(|c| c.key() == key) {
            *existing = coalesce(*existing, cmd);
            self.stats.coalesced += 1;
            log::debug!(
                "[BUS] Ring full, coalesced {} on stem {} (value {:.3})",
                existing.param,
                existing.stem,
                existing.value
            );
            return SendOutcome::Coalesced;
        }

        let mut outcome = SendOutcome::Staged;
        if self.staged.len() >= STAGE_CAPACITY {
            let oldest = self.oldest_staged();
            let lost = self.staged.remove(oldest);
            self.stats.dropped += 1;
            outcome = SendOutcome::Dropped;
            log::warn!(
                "[BUS] Overflow stage full, dropped {} on stem {}",
                lost.param,
                lost.stem
            );
        }
        self.staged.push(cmd);
        outcome
    }

    fn oldest_staged(&self) -> usize {
        self.staged
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.timestamp_us)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// Merge a newer command into an older staged one for the same target
fn coalesce(older: ControlCommand, newer: ControlCommand) -> ControlCommand {
    match (older.mode, newer.mode) {
        (_, CommandMode::Set) => newer,
        (CommandMode::Set, CommandMode::Delta) => {
            let value = if newer.param == ParamKind::Mute {
                let muted = older.value >= 0.5;
                let toggled = newer.value != 0.0;
                if muted != toggled { 1.0 } else { 0.0 }
            } else {
                older.value + newer.value
            };
            ControlCommand { value, mode: CommandMode::Set, ..newer }
        }
        (CommandMode::Delta, CommandMode::Delta) => {
            let value = if newer.param == ParamKind::Mute {
                // Two toggles cancel out
                if (older.value != 0.0) != (newer.value != 0.0) { 1.0 } else { 0.0 }
            } else {
                older.value + newer.value
            };
            ControlCommand { value, ..newer }
        }
    }
}

/// Audio-side half of the bus
pub struct CommandReceiver {
    consumer: rtrb::Consumer<ControlCommand>,
    capacity: usize,
}

impl CommandReceiver {
    /// Apply every command due at `quantum_start_us`, in order
    ///
    /// Stops at the first command stamped later than the quantum start and
    /// leaves it queued. At most one ring's worth of commands is drained per
    /// call so the time spent here stays bounded. Real-time safe.
    #[inline]
    pub fn drain_due<F>(&mut self, quantum_start_us: Micros, mut apply: F) -> usize
    where
        F: FnMut(ControlCommand),
    {
        let mut applied = 0;
        while applied < self.capacity {
            let cmd = match self.consumer.peek() {
                Ok(cmd) if cmd.timestamp_us <= quantum_start_us => *cmd,
                _ => break,
            };
            let _ = self.consumer.pop();
            apply(cmd);
            applied += 1;
        }
        applied
    }

    /// Number of commands currently queued in the ring
    pub fn queued(&self) -> usize {
        self.consumer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::EqBand;

    fn vol(stem: usize, value: f32, ts: Micros) -> ControlCommand {
        ControlCommand::set(stem, ParamKind::Volume, value, ts)
    }

    fn drain_all(rx: &mut CommandReceiver, at: Micros) -> Vec<ControlCommand> {
        let mut out = Vec::new();
        rx.drain_due(at, |cmd| out.push(cmd));
        out
    }

    #[test]
    fn test_delivers_in_order() {
        let (mut tx, mut rx) = command_bus(16);
        for i in 0..5 {
            assert_eq!(tx.send(vol(0, i as f32 * 0.1, 100 + i)), SendOutcome::Queued);
        }
        let got = drain_all(&mut rx, 1_000);
        let stamps: Vec<_> = got.iter().map(|c| c.timestamp_us).collect();
        assert_eq!(stamps, vec![100, 101, 102, 103, 104]);
    }

    #[test]
    fn test_future_commands_are_held() {
        let (mut tx, mut rx) = command_bus(16);
        tx.send(vol(0, 0.1, 100));
        tx.send(vol(0, 0.2, 5_000));

        let first = drain_all(&mut rx, 1_000);
        assert_eq!(first.len(), 1);
        assert_eq!(rx.queued(), 1);

        let second = drain_all(&mut rx, 5_000);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].value, 0.2);
    }

    #[test]
    fn test_earlier_timestamp_is_raised() {
        let (mut tx, mut rx) = command_bus(16);
        tx.send(vol(0, 0.1, 500));
        tx.send(vol(1, 0.2, 200));
        assert_eq!(tx.stats().clamped_timestamps, 1);

        let got = drain_all(&mut rx, 1_000);
        assert_eq!(got[1].timestamp_us, 500);
    }

    #[test]
    fn test_overflow_coalesces_same_target() {
        let (mut tx, mut rx) = command_bus(2);
        assert_eq!(tx.send(vol(0, 0.1, 1)), SendOutcome::Queued);
        assert_eq!(tx.send(vol(1, 0.1, 2)), SendOutcome::Queued);

        // Ring full: stage, then coalesce the same target
        assert_eq!(tx.send(vol(0, 0.3, 3)), SendOutcome::Staged);
        assert_eq!(tx.send(vol(0, 0.4, 4)), SendOutcome::Coalesced);
        assert_eq!(tx.send(vol(0, 0.5, 5)), SendOutcome::Coalesced);
        assert_eq!(tx.pending(), 1);

        let first = drain_all(&mut rx, 100);
        assert_eq!(first.len(), 2);

        assert_eq!(tx.flush(), 0);
        let second = drain_all(&mut rx, 100);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].value, 0.5);
        assert_eq!(second[0].timestamp_us, 5);
        assert_eq!(tx.stats().coalesced, 2);
    }

    #[test]
    fn test_staged_deltas_fold() {
        let (mut tx, mut rx) = command_bus(1);
        tx.send(vol(2, 0.0, 1));
        let pan = ParamKind::Pan;
        tx.send(ControlCommand::set(0, pan, 0.2, 2));
        tx.send(ControlCommand::delta(0, pan, 0.1, 3));
        tx.send(ControlCommand::delta(0, pan, 0.1, 4));

        drain_all(&mut rx, 100);
        tx.flush();
        let got = drain_all(&mut rx, 100);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].mode, CommandMode::Set);
        assert!((got[0].value - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_stage_keeps_timestamp_order_across_targets() {
        let (mut tx, mut rx) = command_bus(1);
        tx.send(vol(0, 0.0, 1));
        tx.send(vol(1, 0.1, 2));
        tx.send(ControlCommand::set(2, ParamKind::Eq(EqBand::Low), -3.0, 3));
        tx.send(vol(1, 0.2, 4));

        let mut seen = Vec::new();
        for _ in 0..4 {
            tx.flush();
            rx.drain_due(100, |cmd| seen.push(cmd.timestamp_us));
        }
        assert_eq!(seen, vec![1, 3, 4]);
    }

    #[test]
    fn test_stage_is_bounded() {
        let (mut tx, _rx) = command_bus(1);
        tx.send(vol(0, 0.0, 0));
        // Every command below targets a distinct (stem, param) pair
        let mut dropped = 0;
        for i in 0..(STAGE_CAPACITY + 10) {
            let cmd = ControlCommand::set(100 + i, ParamKind::Volume, 0.5, 10 + i as u64);
            if tx.send(cmd) == SendOutcome::Dropped {
                dropped += 1;
            }
        }
        assert_eq!(tx.pending(), STAGE_CAPACITY);
        assert_eq!(dropped, 10);
    }
}
