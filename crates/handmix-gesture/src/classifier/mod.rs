//! Gesture classifier
//!
//! Turns smoothed hands into gesture events once per capture tick:
//!
//! - [`geometry`]: raw confidence and parameter of every gesture test
//! - [`hysteresis`]: per-gesture activation state machine
//!
//! At most one gesture is active per hand slot. The two-hand pinch outranks
//! every per-hand gesture: when it activates, whatever either hand was
//! doing is released, and per-hand gestures stay blocked until it ends.

pub mod geometry;
pub mod hysteresis;

use serde::{Deserialize, Serialize};

use crate::landmark::{SmoothedHand, NUM_SLOTS};
use geometry::{Score, NUM_PER_HAND, PER_HAND_KINDS};
use hysteresis::{GestureTracker, Hysteresis, Step};

/// Tracker index of the per-hand pinch
const PINCH: usize = 0;

/// Gestures the classifier recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Pinch,
    Fist,
    PalmOpen,
    PeaceSign,
    SwipeHorizontal,
    SwipeVertical,
    Spread,
    TwoHandPinch,
    /// Number of extended fingers (1-4)
    FingerCount(u8),
}

impl GestureKind {
    /// Swipes carry a signed velocity in [-1, 1]; everything else is in [0, 1]
    pub fn has_signed_param(self) -> bool {
        matches!(self, GestureKind::SwipeHorizontal | GestureKind::SwipeVertical)
    }

    /// Compact code for atomics (0 is reserved for "none")
    pub fn code(self) -> u32 {
        match self {
            GestureKind::Pinch => 1,
            GestureKind::Fist => 2,
            GestureKind::PalmOpen => 3,
            GestureKind::PeaceSign => 4,
            GestureKind::SwipeHorizontal => 5,
            GestureKind::SwipeVertical => 6,
            GestureKind::Spread => 7,
            GestureKind::TwoHandPinch => 8,
            GestureKind::FingerCount(n) => 20 + n as u32,
        }
    }

    /// Inverse of [`GestureKind::code`]
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => GestureKind::Pinch,
            2 => GestureKind::Fist,
            3 => GestureKind::PalmOpen,
            4 => GestureKind::PeaceSign,
            5 => GestureKind::SwipeHorizontal,
            6 => GestureKind::SwipeVertical,
            7 => GestureKind::Spread,
            8 => GestureKind::TwoHandPinch,
            21..=24 => GestureKind::FingerCount((code - 20) as u8),
            _ => return None,
        })
    }
}

impl std::fmt::Display for GestureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GestureKind::Pinch => write!(f, "pinch"),
            GestureKind::Fist => write!(f, "fist"),
            GestureKind::PalmOpen => write!(f, "palm_open"),
            GestureKind::PeaceSign => write!(f, "peace_sign"),
            GestureKind::SwipeHorizontal => write!(f, "swipe_horizontal"),
            GestureKind::SwipeVertical => write!(f, "swipe_vertical"),
            GestureKind::Spread => write!(f, "spread"),
            GestureKind::TwoHandPinch => write!(f, "two_hand_pinch"),
            GestureKind::FingerCount(n) => write!(f, "finger_count_{}", n),
        }
    }
}

/// Hand(s) an event came from, or a rule listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandSelector {
    Left,
    Right,
    /// Rules only: any hand
    Either,
    Both,
}

impl HandSelector {
    /// Event hand of a tracking slot
    pub fn from_slot(slot: usize) -> Self {
        if slot == 0 {
            HandSelector::Left
        } else {
            HandSelector::Right
        }
    }

    /// Whether a rule listening on `self` accepts an event from `event_hand`
    pub fn accepts(self, event_hand: HandSelector) -> bool {
        match self {
            HandSelector::Either => true,
            selector => selector == event_hand,
        }
    }
}

/// Lifecycle position of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Began,
    Held,
    Released,
}

/// One classified gesture occurrence
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub hand: HandSelector,
    /// Raw confidence this tick, in [0, 1]
    pub confidence: f32,
    /// Continuous parameter, [0, 1] (swipes: [-1, 1])
    pub param: f32,
    pub phase: Phase,
    /// Tick the gesture began on
    pub activated_tick: u64,
}

/// Classifier thresholds
///
/// Distances are in hand sizes, swipe speeds in normalized units per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub activate_threshold: f32,
    pub release_threshold: f32,
    pub activate_ticks: u32,
    pub release_ticks: u32,
    /// Began/Held events below this confidence are not forwarded
    pub min_confidence: f32,

    /// Thumb-index distance at full pinch confidence
    pub pinch_full: f32,
    /// Thumb-index distance at zero pinch confidence
    pub pinch_zero: f32,
    /// Thumb-index distance mapped to pinch param 1.0
    pub pinch_param_span: f32,

    /// Mean adjacent fingertip distance range for the spread score
    pub spread_lo: f32,
    pub spread_hi: f32,

    /// Index-middle tip separation range for a peace sign
    pub peace_sep_lo: f32,
    pub peace_sep_hi: f32,
    pub peace_param_span: f32,

    pub swipe_min_speed: f32,
    /// Palm speed mapped to swipe param ±1.0
    pub swipe_full_speed: f32,

    /// Pinch midpoint distance (normalized image units) mapped to param 1.0
    pub two_hand_span: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            activate_threshold: 0.7,
            release_threshold: 0.4,
            activate_ticks: 3,
            release_ticks: 4,
            min_confidence: 0.5,
            pinch_full: 0.2,
            pinch_zero: 1.0,
            pinch_param_span: 0.6,
            spread_lo: 0.32,
            spread_hi: 0.46,
            peace_sep_lo: 0.3,
            peace_sep_hi: 0.45,
            peace_param_span: 0.8,
            swipe_min_speed: 1.0,
            swipe_full_speed: 3.0,
            two_hand_span: 0.6,
        }
    }
}

impl ClassifierConfig {
    fn hysteresis(&self) -> Hysteresis {
        Hysteresis {
            activate_threshold: self.activate_threshold,
            release_threshold: self.release_threshold,
            activate_ticks: self.activate_ticks,
            release_ticks: self.release_ticks,
        }
    }
}

/// Per-tick gesture classification with hysteresis and arbitration
pub struct GestureClassifier {
    config: ClassifierConfig,
    hysteresis: Hysteresis,
    tick: u64,
    divisor: u32,
    trackers: [[GestureTracker; NUM_PER_HAND]; NUM_SLOTS],
    /// Index into [`PER_HAND_KINDS`] of the engaged gesture per slot
    active: [Option<usize>; NUM_SLOTS],
    /// Last scores seen per slot, so a vanished hand releases with its last param
    last_scores: [[Score; NUM_PER_HAND]; NUM_SLOTS],
    two_hand: GestureTracker,
    two_hand_last: Score,
}

impl GestureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            hysteresis: config.hysteresis(),
            config,
            tick: 0,
            divisor: 1,
            trackers: [[GestureTracker::new(); NUM_PER_HAND]; NUM_SLOTS],
            active: [None; NUM_SLOTS],
            last_scores: [[Score::default(); NUM_PER_HAND]; NUM_SLOTS],
            two_hand: GestureTracker::new(),
            two_hand_last: Score::default(),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Evaluate only every `divisor`-th tick (1 = every tick)
    pub fn set_tick_divisor(&mut self, divisor: u32) {
        let divisor = divisor.max(1);
        if divisor != self.divisor {
            log::info!("[GESTURE] Classifier evaluating every {} tick(s)", divisor);
        }
        self.divisor = divisor;
    }

    /// Ticks seen so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Gesture currently engaged on a slot (the two-hand pinch counts for both)
    pub fn active_gesture(&self, slot: usize) -> Option<GestureKind> {
        if slot >= NUM_SLOTS {
            return None;
        }
        if self.two_hand.is_engaged() {
            return Some(GestureKind::TwoHandPinch);
        }
        self.active[slot].map(|i| PER_HAND_KINDS[i])
    }

    /// Forget all gesture state of a slot, without events
    ///
    /// Also drops an engaged two-hand pinch, which needs both slots.
    pub fn reset_slot(&mut self, slot: usize) {
        if slot >= NUM_SLOTS {
            return;
        }
        for tracker in self.trackers[slot].iter_mut() {
            tracker.reset();
        }
        self.active[slot] = None;
        self.two_hand.reset();
    }

    /// Release whatever a lost slot had engaged, then forget its state
    ///
    /// Emits Released (zero confidence, last param) for the slot's active
    /// gesture and for an engaged two-hand pinch, so restore rules still see
    /// the end of the gesture.
    pub fn release_slot(&mut self, slot: usize) -> Vec<GestureEvent> {
        if slot >= NUM_SLOTS {
            return Vec::new();
        }
        let mut events = Vec::new();
        if self.two_hand.is_engaged() {
            let since = self.two_hand.since_tick().unwrap_or(self.tick);
            log::debug!("[GESTURE] Two-hand pinch released, slot {} lost", slot);
            events.push(GestureEvent {
                kind: GestureKind::TwoHandPinch,
                hand: HandSelector::Both,
                confidence: 0.0,
                param: self.two_hand_last.param,
                phase: Phase::Released,
                activated_tick: since,
            });
        }
        if let Some(index) = self.active[slot] {
            let since = self.trackers[slot][index].since_tick().unwrap_or(self.tick);
            let mut scores = self.last_scores[slot];
            scores[index].confidence = 0.0;
            log::debug!("[GESTURE] {} released, slot {} lost", PER_HAND_KINDS[index], slot);
            events.push(self.per_hand_event(slot, index, &scores, Phase::Released, since));
        }
        self.reset_slot(slot);
        events
    }

    /// Classify one tick of smoothed hands
    pub fn classify(&mut self, hands: &[SmoothedHand]) -> Vec<GestureEvent> {
        self.tick += 1;
        if self.tick % self.divisor as u64 != 0 {
            return Vec::new();
        }

        let mut present: [Option<&SmoothedHand>; NUM_SLOTS] = [None, None];
        for hand in hands {
            if hand.slot < NUM_SLOTS {
                present[hand.slot] = Some(hand);
            }
        }

        let mut scores = [[Score::default(); NUM_PER_HAND]; NUM_SLOTS];
        for slot in 0..NUM_SLOTS {
            match present[slot] {
                Some(hand) => {
                    scores[slot] = geometry::score_hand(hand, &self.config);
                    self.last_scores[slot] = scores[slot];
                }
                // A missing hand counts as zero confidence with its last params
                None => {
                    for (score, last) in scores[slot].iter_mut().zip(self.last_scores[slot].iter()) {
                        *score = Score { confidence: 0.0, param: last.param };
                    }
                }
            }
        }

        let mut events = Vec::new();
        self.step_two_hand(&present, &scores, &mut events);

        let blocked = self.two_hand.is_engaged();
        for slot in 0..NUM_SLOTS {
            self.step_slot(slot, &scores[slot], blocked, &mut events);
        }

        let min_confidence = self.config.min_confidence;
        events.retain(|e| e.phase == Phase::Released || e.confidence >= min_confidence);
        events
    }

    fn step_two_hand(
        &mut self,
        present: &[Option<&SmoothedHand>; NUM_SLOTS],
        scores: &[[Score; NUM_PER_HAND]; NUM_SLOTS],
        events: &mut Vec<GestureEvent>,
    ) {
        let score = match (present[0], present[1]) {
            (Some(left), Some(right)) => {
                let s = geometry::two_hand_pinch(left, scores[0][PINCH], right, scores[1][PINCH], &self.config);
                self.two_hand_last = s;
                s
            }
            _ => Score { confidence: 0.0, param: self.two_hand_last.param },
        };

        let event = |phase, activated_tick| GestureEvent {
            kind: GestureKind::TwoHandPinch,
            hand: HandSelector::Both,
            confidence: score.confidence,
            param: score.param,
            phase,
            activated_tick,
        };

        let since = self.two_hand.since_tick();
        match self.two_hand.update(score.confidence, &self.hysteresis) {
            Step::Ready => {
                if self.two_hand.begin(self.tick, &self.hysteresis) {
                    // Preempt whatever either hand was doing
                    for slot in 0..NUM_SLOTS {
                        if let Some(index) = self.active[slot].take() {
                            let since = self.trackers[slot][index].since_tick().unwrap_or(self.tick);
                            events.push(self.per_hand_event(slot, index, &scores[slot], Phase::Released, since));
                        }
                        for tracker in self.trackers[slot].iter_mut() {
                            tracker.reset();
                        }
                    }
                    log::debug!("[GESTURE] Two-hand pinch began at tick {}", self.tick);
                    events.push(event(Phase::Began, self.tick));
                }
            }
            Step::Held => events.push(event(Phase::Held, since.unwrap_or(self.tick))),
            Step::Released => {
                log::debug!("[GESTURE] Two-hand pinch released at tick {}", self.tick);
                events.push(event(Phase::Released, since.unwrap_or(self.tick)));
            }
            Step::Quiet => {}
        }
    }

    fn step_slot(
        &mut self,
        slot: usize,
        scores: &[Score; NUM_PER_HAND],
        blocked: bool,
        events: &mut Vec<GestureEvent>,
    ) {
        if blocked {
            for tracker in self.trackers[slot].iter_mut() {
                tracker.reset();
            }
            return;
        }

        // Best ready candidate this tick: (index, confidence)
        let mut ready: Option<(usize, f32)> = None;
        for index in 0..NUM_PER_HAND {
            let tracker = &mut self.trackers[slot][index];
            let since = tracker.since_tick();
            match tracker.update(scores[index].confidence, &self.hysteresis) {
                Step::Ready => {
                    let confidence = scores[index].confidence;
                    if ready.map_or(true, |(_, best)| confidence > best) {
                        ready = Some((index, confidence));
                    }
                }
                Step::Held => {
                    let since = since.unwrap_or(self.tick);
                    events.push(self.per_hand_event(slot, index, scores, Phase::Held, since));
                }
                Step::Released => {
                    if self.active[slot] == Some(index) {
                        self.active[slot] = None;
                    }
                    let since = since.unwrap_or(self.tick);
                    events.push(self.per_hand_event(slot, index, scores, Phase::Released, since));
                }
                Step::Quiet => {}
            }
        }

        if self.active[slot].is_none() {
            if let Some((index, _)) = ready {
                if self.trackers[slot][index].begin(self.tick, &self.hysteresis) {
                    self.active[slot] = Some(index);
                    events.push(self.per_hand_event(slot, index, scores, Phase::Began, self.tick));
                }
            }
        }
    }

    fn per_hand_event(
        &self,
        slot: usize,
        index: usize,
        scores: &[Score; NUM_PER_HAND],
        phase: Phase,
        activated_tick: u64,
    ) -> GestureEvent {
        GestureEvent {
            kind: PER_HAND_KINDS[index],
            hand: HandSelector::from_slot(slot),
            confidence: scores[index].confidence,
            param: scores[index].param,
            phase,
            activated_tick,
        }
    }
}
