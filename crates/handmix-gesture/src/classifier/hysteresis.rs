//! Two-threshold hysteresis for gesture activation
//!
//! ```text
//!            conf >= activate                 ticks == activate_ticks
//!   Idle ─────────────────────► Activating ─────────────────────────► Active
//!    ▲                              │                                 │   ▲
//!    │        conf < activate       │               conf < release    │   │ conf >= release
//!    └──────────────────────────────┘                                 ▼   │
//!    ◄──────────────────────────────────────────────────────────── Releasing
//!                     ticks == release_ticks
//! ```
//!
//! Activation is two-phase: [`GestureTracker::update`] reports when a
//! tracker is ready, and the classifier decides whether it may
//! [`begin`](GestureTracker::begin). A ready tracker that is refused stays
//! in `Activating` and asks again next tick.

/// Thresholds shared by every tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresis {
    pub activate_threshold: f32,
    pub release_threshold: f32,
    pub activate_ticks: u32,
    pub release_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    #[default]
    Idle,
    Activating { ticks: u32 },
    Active { since_tick: u64 },
    Releasing { ticks: u32, since_tick: u64 },
}

/// Outcome of one tracker update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing to report
    Quiet,
    /// Qualified for long enough, waiting for [`GestureTracker::begin`]
    Ready,
    /// Active or releasing this tick
    Held,
    /// Returned to idle this tick
    Released,
}

/// Hysteresis state of one (slot, gesture) pair
#[derive(Debug, Clone, Copy, Default)]
pub struct GestureTracker {
    state: TrackerState,
}

impl GestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Active or releasing
    pub fn is_engaged(&self) -> bool {
        matches!(self.state, TrackerState::Active { .. } | TrackerState::Releasing { .. })
    }

    /// Tick the gesture became active
    pub fn since_tick(&self) -> Option<u64> {
        match self.state {
            TrackerState::Active { since_tick } | TrackerState::Releasing { since_tick, .. } => Some(since_tick),
            _ => None,
        }
    }

    /// Advance one tick with this tick's raw confidence
    pub fn update(&mut self, confidence: f32, h: &Hysteresis) -> Step {
        match self.state {
            TrackerState::Idle => {
                if confidence >= h.activate_threshold {
                    self.state = TrackerState::Activating { ticks: 1 };
                    if h.activate_ticks <= 1 {
                        return Step::Ready;
                    }
                }
                Step::Quiet
            }
            TrackerState::Activating { ticks } => {
                if confidence < h.activate_threshold {
                    self.state = TrackerState::Idle;
                    return Step::Quiet;
                }
                let ticks = (ticks + 1).min(h.activate_ticks.max(1));
                self.state = TrackerState::Activating { ticks };
                if ticks >= h.activate_ticks {
                    Step::Ready
                } else {
                    Step::Quiet
                }
            }
            TrackerState::Active { since_tick } => {
                if confidence < h.release_threshold {
                    if h.release_ticks <= 1 {
                        self.state = TrackerState::Idle;
                        return Step::Released;
                    }
                    self.state = TrackerState::Releasing { ticks: 1, since_tick };
                }
                Step::Held
            }
            TrackerState::Releasing { ticks, since_tick } => {
                if confidence >= h.release_threshold {
                    self.state = TrackerState::Active { since_tick };
                    return Step::Held;
                }
                let ticks = ticks + 1;
                if ticks >= h.release_ticks {
                    self.state = TrackerState::Idle;
                    Step::Released
                } else {
                    self.state = TrackerState::Releasing { ticks, since_tick };
                    Step::Held
                }
            }
        }
    }

    /// Complete activation of a ready tracker
    ///
    /// Returns false if the tracker was not ready.
    pub fn begin(&mut self, tick: u64, h: &Hysteresis) -> bool {
        match self.state {
            TrackerState::Activating { ticks } if ticks >= h.activate_ticks => {
                self.state = TrackerState::Active { since_tick: tick };
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Hysteresis = Hysteresis {
        activate_threshold: 0.7,
        release_threshold: 0.4,
        activate_ticks: 3,
        release_ticks: 4,
    };

    /// Feed a confidence sequence, beginning whenever ready; returns (began, released) ticks
    fn drive(confidences: &[f32]) -> (Vec<usize>, Vec<usize>) {
        let mut tracker = GestureTracker::new();
        let mut began = Vec::new();
        let mut released = Vec::new();
        for (tick, &c) in confidences.iter().enumerate() {
            match tracker.update(c, &H) {
                Step::Ready => {
                    assert!(tracker.begin(tick as u64, &H));
                    began.push(tick);
                }
                Step::Released => released.push(tick),
                _ => {}
            }
        }
        (began, released)
    }

    #[test]
    fn test_activation_needs_consecutive_ticks() {
        let (began, _) = drive(&[0.8, 0.8, 0.8, 0.8]);
        assert_eq!(began, vec![2]);

        let (began, _) = drive(&[0.8, 0.8, 0.6, 0.8, 0.8]);
        assert!(began.is_empty());
    }

    #[test]
    fn test_oscillation_around_activation_never_activates() {
        let signal: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 0.72 } else { 0.68 }).collect();
        let (began, released) = drive(&signal);
        assert!(began.is_empty());
        assert!(released.is_empty());
    }

    #[test]
    fn test_oscillation_around_release_holds() {
        let mut signal = vec![0.9; 5];
        // Dips below release for up to 3 ticks at a time
        for i in 0..200 {
            signal.push(if i % 4 == 3 { 0.45 } else { 0.35 });
        }
        let (began, released) = drive(&signal);
        assert_eq!(began.len(), 1);
        assert!(released.is_empty());
    }

    #[test]
    fn test_noisy_signal_toggles_at_most_once_per_window() {
        // Noisy confidence hovering around both thresholds
        let mut seed = 0x2545_F491_4F6C_DD1Du64;
        let signal: Vec<f32> = (0..2000)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                0.3 + 0.5 * ((seed >> 40) as f32 / (1u64 << 24) as f32)
            })
            .collect();
        let (began, released) = drive(&signal);

        let window = (H.activate_ticks + H.release_ticks) as usize;
        let mut toggles: Vec<usize> = began.iter().chain(released.iter()).copied().collect();
        toggles.sort_unstable();
        for pair in toggles.windows(2) {
            assert!(pair[1] - pair[0] >= H.activate_ticks.min(H.release_ticks) as usize);
        }
        assert!(toggles.len() <= signal.len() / window * 2 + 2);
    }

    #[test]
    fn test_release_after_consecutive_low_ticks() {
        let (began, released) = drive(&[0.9, 0.9, 0.9, 0.1, 0.1, 0.1, 0.1, 0.1]);
        assert_eq!(began, vec![2]);
        assert_eq!(released, vec![6]);
    }

    #[test]
    fn test_refused_tracker_stays_ready() {
        let mut tracker = GestureTracker::new();
        for _ in 0..2 {
            tracker.update(0.9, &H);
        }
        assert_eq!(tracker.update(0.9, &H), Step::Ready);
        // Not begun: still ready on the next qualifying tick
        assert_eq!(tracker.update(0.9, &H), Step::Ready);
        assert!(tracker.begin(7, &H));
        assert_eq!(tracker.since_tick(), Some(7));
        assert!(tracker.is_engaged());
    }
}
