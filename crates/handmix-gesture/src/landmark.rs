//! Hand landmark types
//!
//! The upstream pose model reports 21 joints per hand in normalized image
//! coordinates (x right, y down, z toward the camera), each with its own
//! detector confidence.

use handmix_core::types::Micros;
use serde::{Deserialize, Serialize};

/// Joints per hand
pub const NUM_LANDMARKS: usize = 21;

/// Hand slots tracked at once
pub const NUM_SLOTS: usize = 2;

// Joint indices
pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

/// Joints averaged into the palm center
pub const PALM_JOINTS: [usize; 5] = [WRIST, INDEX_MCP, MIDDLE_MCP, RING_MCP, PINKY_MCP];

/// Smallest hand size used for normalization, so a degenerate frame never divides by zero
pub const MIN_HAND_SIZE: f32 = 1e-3;

/// One tracked joint
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
}

impl LandmarkPoint {
    /// Create a point, clamping confidence to [0, 1] (NaN becomes 0)
    pub fn new(x: f32, y: f32, z: f32, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self { x, y, z, confidence }
    }

    #[inline]
    pub fn position(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Euclidean distance in normalized units
    #[inline]
    pub fn distance(&self, other: &LandmarkPoint) -> f32 {
        distance(self.position(), other.position())
    }

    /// Whether every coordinate is a finite number
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[inline]
pub fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Wrist to middle-finger MCP, the unit every gesture distance is measured in
pub fn hand_size(landmarks: &[LandmarkPoint; NUM_LANDMARKS]) -> f32 {
    landmarks[WRIST].distance(&landmarks[MIDDLE_MCP]).max(MIN_HAND_SIZE)
}

/// Which hand a frame belongs to, as reported by the detector
///
/// Detectors that can't tell handedness report `First`/`Second` in
/// detection order instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandId {
    Left,
    Right,
    First,
    Second,
}

impl HandId {
    /// Tracking slot of this hand (0 or 1)
    #[inline]
    pub fn slot(self) -> usize {
        match self {
            HandId::Left | HandId::First => 0,
            HandId::Right | HandId::Second => 1,
        }
    }
}

/// One detected hand in one captured frame
#[derive(Debug, Clone, PartialEq)]
pub struct HandFrame {
    pub hand: HandId,
    pub landmarks: [LandmarkPoint; NUM_LANDMARKS],
    /// Session-clock capture time
    pub captured_at_us: Micros,
}

impl HandFrame {
    pub fn new(hand: HandId, landmarks: [LandmarkPoint; NUM_LANDMARKS], captured_at_us: Micros) -> Self {
        Self { hand, landmarks, captured_at_us }
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.hand.slot()
    }

    pub fn hand_size(&self) -> f32 {
        hand_size(&self.landmarks)
    }

    /// Mean joint confidence
    pub fn confidence(&self) -> f32 {
        self.landmarks.iter().map(|p| p.confidence).sum::<f32>() / NUM_LANDMARKS as f32
    }
}

/// Smoother output for one hand slot
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedHand {
    pub slot: usize,
    pub landmarks: [LandmarkPoint; NUM_LANDMARKS],
    /// Per-joint velocity in normalized units per second
    pub velocities: [[f32; 3]; NUM_LANDMARKS],
    pub captured_at_us: Micros,
}

impl SmoothedHand {
    /// Wrap a raw frame with zero velocity
    pub fn from_frame(frame: &HandFrame) -> Self {
        Self {
            slot: frame.slot(),
            landmarks: frame.landmarks,
            velocities: [[0.0; 3]; NUM_LANDMARKS],
            captured_at_us: frame.captured_at_us,
        }
    }

    pub fn hand_size(&self) -> f32 {
        hand_size(&self.landmarks)
    }

    /// Distance between two joints divided by hand size
    #[inline]
    pub fn normalized_distance(&self, a: usize, b: usize) -> f32 {
        self.landmarks[a].distance(&self.landmarks[b]) / self.hand_size()
    }

    /// Mean of the wrist and the four finger MCPs
    pub fn palm_center(&self) -> [f32; 3] {
        mean_of(PALM_JOINTS.iter().map(|&i| self.landmarks[i].position()))
    }

    /// Velocity of the palm center in units per second
    pub fn palm_velocity(&self) -> [f32; 3] {
        mean_of(PALM_JOINTS.iter().map(|&i| self.velocities[i]))
    }
}

fn mean_of(points: impl Iterator<Item = [f32; 3]>) -> [f32; 3] {
    let mut sum = [0.0_f32; 3];
    let mut count = 0.0_f32;
    for p in points {
        sum[0] += p[0];
        sum[1] += p[1];
        sum[2] += p[2];
        count += 1.0;
    }
    if count == 0.0 {
        return sum;
    }
    [sum[0] / count, sum[1] / count, sum[2] / count]
}
