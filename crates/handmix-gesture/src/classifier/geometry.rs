//! Geometric gesture tests
//!
//! Every test maps landmark distances (in hand-size units) through
//! smoothsteps into a raw confidence in [0, 1], plus the continuous
//! parameter the gesture carries.

use super::{ClassifierConfig, GestureKind};
use crate::landmark::*;

/// Per-hand gestures, in tracker order
pub const PER_HAND_KINDS: [GestureKind; 11] = [
    GestureKind::Pinch,
    GestureKind::Fist,
    GestureKind::PalmOpen,
    GestureKind::Spread,
    GestureKind::PeaceSign,
    GestureKind::SwipeHorizontal,
    GestureKind::SwipeVertical,
    GestureKind::FingerCount(1),
    GestureKind::FingerCount(2),
    GestureKind::FingerCount(3),
    GestureKind::FingerCount(4),
];

pub const NUM_PER_HAND: usize = PER_HAND_KINDS.len();

/// Raw confidence and parameter of one gesture test
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Score {
    pub confidence: f32,
    pub param: f32,
}

impl Score {
    fn new(confidence: f32, param: f32) -> Self {
        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        let param = if param.is_finite() { param } else { 0.0 };
        Self { confidence, param }
    }
}

/// Hermite smoothstep of `x` over `[edge0, edge1]`
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    if t.is_nan() {
        return 0.0;
    }
    t * t * (3.0 - 2.0 * t)
}

/// Extension of thumb, index, middle, ring and pinky, each in [0, 1]
pub fn finger_extension(hand: &SmoothedHand) -> [f32; 5] {
    let wrist = &hand.landmarks[WRIST];
    let finger = |pip: usize, tip: usize| {
        let tip_d = hand.landmarks[tip].distance(wrist);
        let pip_d = hand.landmarks[pip].distance(wrist).max(MIN_HAND_SIZE);
        smoothstep(1.0, 1.3, tip_d / pip_d)
    };
    [
        smoothstep(0.35, 0.6, hand.normalized_distance(THUMB_TIP, INDEX_MCP)),
        finger(INDEX_PIP, INDEX_TIP),
        finger(MIDDLE_PIP, MIDDLE_TIP),
        finger(RING_PIP, RING_TIP),
        finger(PINKY_PIP, PINKY_TIP),
    ]
}

fn geometric_mean(values: &[f32]) -> f32 {
    let product: f32 = values.iter().map(|v| v.max(0.0)).product();
    product.powf(1.0 / values.len() as f32)
}

/// Pinch confidence and normalized thumb-index distance
pub fn pinch(hand: &SmoothedHand, ext: &[f32; 5], cfg: &ClassifierConfig) -> Score {
    let d = hand.normalized_distance(THUMB_TIP, INDEX_TIP);
    let closeness = 1.0 - smoothstep(cfg.pinch_full, cfg.pinch_zero, d);
    // Curled middle, ring and pinky make it a fist, not a pinch
    let others_curled = 1.0 - ext[2].max(ext[3]).max(ext[4]);
    let gate = 1.0 - smoothstep(0.5, 0.9, others_curled);
    Score::new(closeness * gate, (d / cfg.pinch_param_span).clamp(0.0, 1.0))
}

/// Score every per-hand gesture, in [`PER_HAND_KINDS`] order
pub fn score_hand(hand: &SmoothedHand, cfg: &ClassifierConfig) -> [Score; NUM_PER_HAND] {
    let ext = finger_extension(hand);
    let curl = ext.map(|e| 1.0 - e);
    let size = hand.hand_size();

    let pinch = pinch(hand, &ext, cfg);

    let fist = Score::new(geometric_mean(&curl), curl.iter().sum::<f32>() / 5.0);

    let ext_all = geometric_mean(&ext);
    let tips = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];
    let adjacent = tips
        .windows(2)
        .map(|w| hand.landmarks[w[0]].distance(&hand.landmarks[w[1]]))
        .sum::<f32>()
        / 3.0
        / size;
    let spread_score = smoothstep(cfg.spread_lo, cfg.spread_hi, adjacent);
    let palm_open = Score::new(ext_all * (1.0 - spread_score), ext.iter().sum::<f32>() / 5.0);
    let spread = Score::new(ext_all * spread_score, spread_score);

    let separation = hand.normalized_distance(INDEX_TIP, MIDDLE_TIP);
    let peace = Score::new(
        ext[1] * ext[2] * curl[3] * curl[4] * smoothstep(cfg.peace_sep_lo, cfg.peace_sep_hi, separation),
        (separation / cfg.peace_param_span).clamp(0.0, 1.0),
    );

    let [vx, vy, _] = hand.palm_velocity();
    let swipe = |along: f32, across: f32| {
        if along.abs() > 2.0 * across.abs() {
            Score::new(
                smoothstep(cfg.swipe_min_speed, 2.0 * cfg.swipe_min_speed, along.abs()),
                (along / cfg.swipe_full_speed).clamp(-1.0, 1.0),
            )
        } else {
            Score::new(0.0, (along / cfg.swipe_full_speed).clamp(-1.0, 1.0))
        }
    };
    let swipe_h = swipe(vx, vy);
    let swipe_v = swipe(vy, vx);

    // Finger count: how many are extended, and how decisively
    let count = ext.iter().filter(|&&e| e >= 0.5).count();
    let margin = ext.iter().map(|e| (2.0 * e - 1.0).abs()).fold(1.0_f32, f32::min);
    let count_score = |n: usize| {
        let param = n as f32 / 5.0;
        if count != n {
            return Score::new(0.0, param);
        }
        // Touching thumb and index tips read as a pinch, a clean V as peace
        let mut confidence = margin * (1.0 - pinch.confidence);
        if n == 2 {
            confidence *= 1.0 - peace.confidence;
        }
        Score::new(confidence, param)
    };

    [
        pinch,
        fist,
        palm_open,
        spread,
        peace,
        swipe_h,
        swipe_v,
        count_score(1),
        count_score(2),
        count_score(3),
        count_score(4),
    ]
}

/// Two-hand pinch from both hands and their per-hand pinch scores
pub fn two_hand_pinch(
    left: &SmoothedHand,
    left_pinch: Score,
    right: &SmoothedHand,
    right_pinch: Score,
    cfg: &ClassifierConfig,
) -> Score {
    let midpoint = |hand: &SmoothedHand| {
        let a = hand.landmarks[THUMB_TIP].position();
        let b = hand.landmarks[INDEX_TIP].position();
        [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0, (a[2] + b[2]) / 2.0]
    };
    let d = distance(midpoint(left), midpoint(right));
    Score::new(
        left_pinch.confidence.min(right_pinch.confidence),
        (d / cfg.two_hand_span).clamp(0.0, 1.0),
    )
}
