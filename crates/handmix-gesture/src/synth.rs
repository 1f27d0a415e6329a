//! Synthetic hand poses
//!
//! Builds plausible 21-joint hands for scripted demos and tests. Offsets
//! are in hand-size units relative to the wrist, with fingers pointing up
//! the image (negative y).

use crate::landmark::*;

/// Pose of a synthetic hand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandShape {
    /// All fingers extended and together
    Open,
    /// All fingers extended and fanned out
    Spread,
    /// All fingers curled
    Fist,
    /// Every finger partly bent, matching no static gesture
    Relaxed,
    /// Thumb and index tips `distance` hand sizes apart, other fingers extended
    Pinch { distance: f32 },
    /// Index and middle extended and apart
    Peace,
    /// First `n` fingers extended, counting from the index (thumb is the 5th)
    Count(u8),
}

/// Finger geometry: MCP offset, segment lengths (MCP-PIP, PIP-DIP, DIP-TIP) and fan angle when spread
struct Finger {
    mcp: [f32; 2],
    segments: [f32; 3],
    spread_deg: f32,
    joints: [usize; 4],
}

const FINGERS: [Finger; 4] = [
    Finger {
        mcp: [-0.22, -0.97],
        segments: [0.42, 0.25, 0.22],
        spread_deg: -25.0,
        joints: [INDEX_MCP, INDEX_PIP, INDEX_DIP, INDEX_TIP],
    },
    Finger {
        mcp: [0.0, -1.0],
        segments: [0.47, 0.28, 0.24],
        spread_deg: -8.0,
        joints: [MIDDLE_MCP, MIDDLE_PIP, MIDDLE_DIP, MIDDLE_TIP],
    },
    Finger {
        mcp: [0.2, -0.95],
        segments: [0.44, 0.26, 0.22],
        spread_deg: 10.0,
        joints: [RING_MCP, RING_PIP, RING_DIP, RING_TIP],
    },
    Finger {
        mcp: [0.38, -0.85],
        segments: [0.34, 0.2, 0.18],
        spread_deg: 28.0,
        joints: [PINKY_MCP, PINKY_PIP, PINKY_DIP, PINKY_TIP],
    },
];

const THUMB_BASE: [[f32; 2]; 2] = [[-0.2, -0.15], [-0.35, -0.35]];
const THUMB_EXTENDED: [[f32; 2]; 2] = [[-0.5, -0.5], [-0.75, -0.6]];
const THUMB_CURLED: [[f32; 2]; 2] = [[-0.3, -0.6], [-0.15, -0.75]];

/// Build a hand with its wrist at `(x, y)` and the given hand size
pub fn synthetic_hand(shape: HandShape, x: f32, y: f32, size: f32) -> [LandmarkPoint; NUM_LANDMARKS] {
    let mut offsets = [[0.0_f32; 2]; NUM_LANDMARKS];

    // Curl per finger (index to pinky), then the thumb's
    let (curls, thumb_curl): ([f32; 4], f32) = match shape {
        HandShape::Open | HandShape::Spread => ([0.0; 4], 0.0),
        HandShape::Fist => ([1.0; 4], 1.0),
        HandShape::Relaxed => ([0.35; 4], 0.35),
        HandShape::Pinch { .. } => ([0.0; 4], 1.0),
        HandShape::Peace => ([0.0, 0.0, 1.0, 1.0], 1.0),
        HandShape::Count(n) => {
            let mut curls = [1.0; 4];
            for curl in curls.iter_mut().take(n.min(4) as usize) {
                *curl = 0.0;
            }
            (curls, if n >= 5 { 0.0 } else { 1.0 })
        }
    };

    for (finger, &curl) in FINGERS.iter().zip(curls.iter()) {
        let angle = match shape {
            HandShape::Spread => finger.spread_deg,
            // Index and middle fan apart for the V
            HandShape::Peace if finger.joints[0] == INDEX_MCP => -10.0,
            HandShape::Peace if finger.joints[0] == MIDDLE_MCP => 10.0,
            _ => 0.0,
        };
        place_finger(&mut offsets, finger, angle, curl);
    }

    offsets[THUMB_CMC] = THUMB_BASE[0];
    offsets[THUMB_MCP] = THUMB_BASE[1];
    offsets[THUMB_IP] = lerp2(THUMB_EXTENDED[0], THUMB_CURLED[0], thumb_curl);
    offsets[THUMB_TIP] = lerp2(THUMB_EXTENDED[1], THUMB_CURLED[1], thumb_curl);

    if let HandShape::Pinch { distance } = shape {
        let thumb_tip = [-0.42, -0.95];
        offsets[THUMB_IP] = [-0.45, -0.7];
        offsets[THUMB_TIP] = thumb_tip;
        let tip = [thumb_tip[0], thumb_tip[1] - distance.max(0.0)];
        let mcp = offsets[INDEX_MCP];
        offsets[INDEX_PIP] = [mcp[0] - 0.05, mcp[1] - 0.35];
        offsets[INDEX_DIP] = lerp2(offsets[INDEX_PIP], tip, 0.5);
        offsets[INDEX_TIP] = tip;
    }

    let mut landmarks = [LandmarkPoint::default(); NUM_LANDMARKS];
    for (point, offset) in landmarks.iter_mut().zip(offsets.iter()) {
        *point = LandmarkPoint::new(x + offset[0] * size, y + offset[1] * size, 0.0, 1.0);
    }
    landmarks
}

fn place_finger(offsets: &mut [[f32; 2]; NUM_LANDMARKS], finger: &Finger, angle_deg: f32, curl: f32) {
    let [mcp_i, pip_i, dip_i, tip_i] = finger.joints;
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let dir = [sin, -cos];
    let mcp = finger.mcp;
    let [l1, l2, l3] = finger.segments;

    let pip_ext = [mcp[0] + dir[0] * l1, mcp[1] + dir[1] * l1];
    let dip_ext = [pip_ext[0] + dir[0] * l2, pip_ext[1] + dir[1] * l2];
    let tip_ext = [dip_ext[0] + dir[0] * l3, dip_ext[1] + dir[1] * l3];

    // Curled: the finger folds over the palm and the tip comes back below the knuckle
    let pip_curl = [mcp[0], mcp[1] - 0.25];
    let dip_curl = [mcp[0], mcp[1] - 0.1];
    let tip_curl = [mcp[0], mcp[1] + 0.1];

    offsets[mcp_i] = mcp;
    offsets[pip_i] = lerp2(pip_ext, pip_curl, curl);
    offsets[dip_i] = lerp2(dip_ext, dip_curl, curl);
    offsets[tip_i] = lerp2(tip_ext, tip_curl, curl);
}

#[inline]
fn lerp2(a: [f32; 2], b: [f32; 2], t: f32) -> [f32; 2] {
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
}
