//! Hand-pose sources
//!
//! A [`PoseSource`] yields captures with their offset from the start of the
//! run. The session's feeder thread paces them, stamps each hand with the
//! session clock and pushes the frame set into the pose channel. An empty
//! capture means no hand was detected.
//!
//! - [`ReplaySource`]: a JSON-lines recording
//! - [`ScriptedSource`]: synthetic hands for demos and tests

use std::f32::consts::TAU;
use std::io::BufRead;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use handmix_core::types::Micros;
use handmix_gesture::landmark::NUM_LANDMARKS;
use handmix_gesture::synth::{synthetic_hand, HandShape};
use handmix_gesture::{HandFrame, HandId, LandmarkPoint};

/// Landmarks of every hand seen in one capture
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCapture {
    /// Milliseconds since the start of the run
    pub offset_ms: f64,
    pub hands: Vec<(HandId, [LandmarkPoint; NUM_LANDMARKS])>,
}

impl PoseCapture {
    /// Turn into frames captured at `captured_at_us`
    pub fn into_frames(self, captured_at_us: Micros) -> Vec<HandFrame> {
        self.hands
            .into_iter()
            .map(|(hand, landmarks)| HandFrame::new(hand, landmarks, captured_at_us))
            .collect()
    }
}

/// Something that produces hand poses over time
pub trait PoseSource: Send {
    /// Next capture, or `None` when the source is exhausted
    fn next_capture(&mut self) -> Option<PoseCapture>;

    /// Short description for logs
    fn describe(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    t_ms: f64,
    #[serde(default)]
    hands: Vec<ReplayHand>,
}

#[derive(Debug, Deserialize)]
struct ReplayHand {
    hand: HandId,
    landmarks: Vec<[f32; 4]>,
}

/// Recorded poses, one JSON object per line
///
/// ```text
/// {"t_ms": 16.7, "hands": [{"hand": "left", "landmarks": [[x, y, z, c], ...]}]}
/// ```
#[derive(Debug)]
pub struct ReplaySource {
    name: String,
    captures: std::vec::IntoIter<PoseCapture>,
}

impl ReplaySource {
    /// Read and validate a whole recording
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).with_context(|| format!("Failed to open replay {:?}", path))?;
        let name = path.display().to_string();
        Self::from_reader(std::io::BufReader::new(file), name)
    }

    pub fn from_reader(reader: impl BufRead, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut captures = Vec::new();
        let mut last_ms = f64::NEG_INFINITY;
        for (index, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {} line {}", name, index + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(&line)
                .with_context(|| format!("Invalid pose record at {} line {}", name, index + 1))?;
            let capture = parse_capture(parsed).with_context(|| format!("{} line {}", name, index + 1))?;
            if capture.offset_ms < last_ms {
                bail!("{} line {}: t_ms goes backwards", name, index + 1);
            }
            last_ms = capture.offset_ms;
            captures.push(capture);
        }

        log::info!("[SESSION] Replay {} has {} captures", name, captures.len());
        Ok(Self { name, captures: captures.into_iter() })
    }
}

fn parse_capture(line: ReplayLine) -> Result<PoseCapture> {
    if !line.t_ms.is_finite() || line.t_ms < 0.0 {
        bail!("t_ms must be a non-negative number, got {}", line.t_ms);
    }
    let mut hands = Vec::with_capacity(line.hands.len());
    for hand in line.hands {
        let points: Vec<LandmarkPoint> = hand
            .landmarks
            .iter()
            .map(|&[x, y, z, c]| LandmarkPoint::new(x, y, z, c))
            .collect();
        let landmarks: [LandmarkPoint; NUM_LANDMARKS] = points
            .try_into()
            .map_err(|points: Vec<LandmarkPoint>| {
                anyhow::anyhow!("{:?} hand has {} landmarks, expected {}", hand.hand, points.len(), NUM_LANDMARKS)
            })?;
        hands.push((hand.hand, landmarks));
    }
    Ok(PoseCapture { offset_ms: line.t_ms, hands })
}

impl PoseSource for ReplaySource {
    fn next_capture(&mut self) -> Option<PoseCapture> {
        self.captures.next()
    }

    fn describe(&self) -> String {
        format!("replay {}", self.name)
    }
}

/// Built-in hand motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Right hand sweeps its pinch open and closed, then leaves the frame
    PinchSweep,
    /// Both hands pinch and move apart and together, then open
    TwoHandCrossfade,
    /// Alternates the two above every cycle
    Demo,
}

/// Length of one script cycle in seconds
const CYCLE_SECS: f32 = 8.0;
const HAND_SIZE: f32 = 0.2;
const HAND_Y: f32 = 0.6;

impl std::str::FromStr for Script {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pinch" | "pinch-sweep" => Ok(Script::PinchSweep),
            "two-hand" | "crossfade" => Ok(Script::TwoHandCrossfade),
            "demo" => Ok(Script::Demo),
            other => bail!("Unknown script {:?} (pinch, two-hand, demo)", other),
        }
    }
}

impl Script {
    /// Hands at `t` seconds into the run
    pub fn hands_at(self, t: f32) -> Vec<(HandId, [LandmarkPoint; NUM_LANDMARKS])> {
        let cycle = (t / CYCLE_SECS) as u64;
        let local = t - cycle as f32 * CYCLE_SECS;
        match self {
            Script::PinchSweep => pinch_sweep(local),
            Script::TwoHandCrossfade => two_hand(local),
            Script::Demo if cycle % 2 == 0 => pinch_sweep(local),
            Script::Demo => two_hand(local),
        }
    }
}

fn hand(id: HandId, shape: HandShape, x: f32) -> (HandId, [LandmarkPoint; NUM_LANDMARKS]) {
    (id, synthetic_hand(shape, x, HAND_Y, HAND_SIZE))
}

fn pinch_sweep(t: f32) -> Vec<(HandId, [LandmarkPoint; NUM_LANDMARKS])> {
    match t {
        t if t < 6.0 => {
            // Thumb-index gap between 0.06 and 0.54 hand sizes, 3 s period
            let distance = 0.3 - 0.24 * (TAU * t / 3.0).cos();
            vec![hand(HandId::Right, HandShape::Pinch { distance }, 0.6)]
        }
        t if t < 7.0 => Vec::new(),
        _ => vec![hand(HandId::Right, HandShape::Open, 0.6)],
    }
}

fn two_hand(t: f32) -> Vec<(HandId, [LandmarkPoint; NUM_LANDMARKS])> {
    if t < 5.0 {
        let pinch = HandShape::Pinch { distance: 0.1 };
        // Midpoints 0.2 to 0.4 apart around the neutral 0.3
        let right_x = 0.5 + 0.1 * (TAU * t / 5.0).sin();
        vec![hand(HandId::Left, pinch, 0.2), hand(HandId::Right, pinch, right_x)]
    } else {
        vec![hand(HandId::Left, HandShape::Open, 0.2), hand(HandId::Right, HandShape::Open, 0.5)]
    }
}

/// Synthetic captures at a fixed rate
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    script: Script,
    period_ms: f64,
    total: u64,
    index: u64,
}

impl ScriptedSource {
    pub fn new(script: Script, capture_hz: f32, seconds: f64) -> Self {
        let hz = if capture_hz.is_finite() && capture_hz > 0.0 { capture_hz as f64 } else { 60.0 };
        Self {
            script,
            period_ms: 1000.0 / hz,
            total: (seconds.max(0.0) * hz).round() as u64,
            index: 0,
        }
    }
}

impl PoseSource for ScriptedSource {
    fn next_capture(&mut self) -> Option<PoseCapture> {
        if self.index >= self.total {
            return None;
        }
        let offset_ms = self.index as f64 * self.period_ms;
        self.index += 1;
        Some(PoseCapture {
            offset_ms,
            hands: self.script.hands_at((offset_ms / 1000.0) as f32),
        })
    }

    fn describe(&self) -> String {
        format!("script {:?} ({} captures)", self.script, self.total)
    }
}
