//! Landmark smoother
//!
//! One constant-velocity Kalman filter per axis, per joint, per hand slot.
//! Each filter predicts from its previous velocity and corrects against the
//! new measurement, trusting it less when the detector is unsure or when
//! the joint jumped implausibly far since the last frame.
//!
//! A slot that receives no frame for `loss_timeout_ticks` ticks has its
//! filters dropped, so a hand that comes back is never predicted from
//! stale state.

use serde::{Deserialize, Serialize};

use crate::landmark::{HandFrame, LandmarkPoint, SmoothedHand, NUM_LANDMARKS, NUM_SLOTS};
use handmix_core::types::Micros;

/// Prediction step bounds in seconds
const MIN_DT: f32 = 0.001;
const MAX_DT: f32 = 0.1;

/// Initial velocity variance of a fresh filter ((units/s)^2)
const INITIAL_VELOCITY_VARIANCE: f32 = 1.0;

/// Kalman tuning and tracking timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// White-acceleration spectral density (units^2/s^3)
    pub process_noise: f32,
    /// Measurement variance of a joint reported with confidence 1 (units^2)
    pub measurement_noise: f32,
    /// Confidence below this is treated as this when scaling measurement noise
    pub min_confidence_floor: f32,
    /// A joint further than this many hand sizes from its prediction is an outlier
    pub outlier_hand_fraction: f32,
    /// Measurement noise multiplier for outliers
    pub outlier_noise_scale: f32,
    /// Ticks without a frame before a slot's filters are dropped
    pub loss_timeout_ticks: u32,
    /// Updates after which a filter counts as converged for reduced precision
    pub convergence_ticks: u32,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            process_noise: 2.0,
            measurement_noise: 2.5e-5, // ~0.005 normalized units std
            min_confidence_floor: 0.2,
            outlier_hand_fraction: 0.5,
            outlier_noise_scale: 10.0,
            loss_timeout_ticks: 10,
            convergence_ticks: 15,
        }
    }
}

/// How much work the smoother does per update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmootherPrecision {
    /// Full predict/correct of the covariance every update
    #[default]
    Full,
    /// Converged filters skip the covariance update and reuse their last gain
    Reduced,
}

/// Position/velocity filter for one axis
#[derive(Debug, Clone, Copy)]
struct AxisState {
    pos: f32,
    vel: f32,
    // Symmetric covariance [[p00, p01], [p01, p11]]
    p00: f32,
    p01: f32,
    p11: f32,
    // Predicted covariance from the last full update, reused when reduced
    pred00: f32,
    pred01: f32,
}

impl AxisState {
    fn new(pos: f32, measurement_noise: f32) -> Self {
        Self {
            pos,
            vel: 0.0,
            p00: measurement_noise,
            p01: 0.0,
            p11: INITIAL_VELOCITY_VARIANCE,
            pred00: measurement_noise,
            pred01: 0.0,
        }
    }

    #[inline]
    fn predicted(&self, dt: f32) -> f32 {
        self.pos + self.vel * dt
    }

    fn update(&mut self, z: f32, r: f32, dt: f32, q: f32, reuse_gain: bool) {
        self.pos += self.vel * dt;

        if !reuse_gain {
            let dt2 = dt * dt;
            self.pred00 = self.p00 + 2.0 * dt * self.p01 + dt2 * self.p11 + q * dt2 * dt / 3.0;
            self.pred01 = self.p01 + dt * self.p11 + q * dt2 / 2.0;
            self.p11 += q * dt;
        }

        let s = self.pred00 + r;
        let k0 = self.pred00 / s;
        let k1 = self.pred01 / s;
        let innovation = z - self.pos;
        self.pos += k0 * innovation;
        self.vel += k1 * innovation;

        if !reuse_gain {
            self.p00 = (1.0 - k0) * self.pred00;
            self.p11 -= k1 * self.pred01;
            self.p01 = (1.0 - k0) * self.pred01;
        }
    }

    /// Covariance is finite, positive on the diagonal and positive semi-definite
    fn is_well_defined(&self) -> bool {
        let values = [self.pos, self.vel, self.p00, self.p01, self.p11];
        values.iter().all(|v| v.is_finite())
            && self.p00 > 0.0
            && self.p11 > 0.0
            && self.p00 * self.p11 - self.p01 * self.p01 >= -1e-12
    }
}

/// Filter state of one joint (three independent axes)
#[derive(Debug, Clone, Copy)]
pub struct PointFilter {
    axes: [AxisState; 3],
}

impl PointFilter {
    fn new(point: &LandmarkPoint, measurement_noise: f32) -> Self {
        let p = point.position();
        Self { axes: p.map(|v| AxisState::new(v, measurement_noise)) }
    }

    pub fn position(&self) -> [f32; 3] {
        self.axes.map(|a| a.pos)
    }

    pub fn velocity(&self) -> [f32; 3] {
        self.axes.map(|a| a.vel)
    }

    fn predicted(&self, dt: f32) -> [f32; 3] {
        self.axes.map(|a| a.predicted(dt))
    }

    /// Position variance per axis
    pub fn variance(&self) -> [f32; 3] {
        self.axes.map(|a| a.p00)
    }
}

/// Filters for every joint of one hand slot
#[derive(Debug, Clone)]
pub struct HandFilter {
    points: [PointFilter; NUM_LANDMARKS],
    last_us: Micros,
    /// Consecutive ticks without a frame
    missed: u32,
    /// Corrections since (re)acquisition
    updates: u32,
}

impl HandFilter {
    fn new(frame: &HandFrame, measurement_noise: f32) -> Self {
        Self {
            points: frame.landmarks.map(|p| PointFilter::new(&p, measurement_noise)),
            last_us: frame.captured_at_us,
            missed: 0,
            updates: 0,
        }
    }

    pub fn point(&self, index: usize) -> Option<&PointFilter> {
        self.points.get(index)
    }
}

/// Per-slot Kalman smoothing of hand landmarks
pub struct LandmarkSmoother {
    config: SmootherConfig,
    precision: SmootherPrecision,
    slots: [Option<HandFilter>; NUM_SLOTS],
    /// Guard trips since start
    covariance_resets: u64,
    /// Slots whose filter state was dropped on the latest update
    lost: [bool; NUM_SLOTS],
}

impl LandmarkSmoother {
    pub fn new(config: SmootherConfig) -> Self {
        Self {
            config,
            precision: SmootherPrecision::Full,
            slots: [None, None],
            covariance_resets: 0,
            lost: [false; NUM_SLOTS],
        }
    }

    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    pub fn set_precision(&mut self, precision: SmootherPrecision) {
        if self.precision != precision {
            log::info!("[GESTURE] Smoother precision: {:?}", precision);
        }
        self.precision = precision;
    }

    pub fn precision(&self) -> SmootherPrecision {
        self.precision
    }

    /// Whether the slot currently holds live filter state
    pub fn is_tracking(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| s.is_some())
    }

    /// Filter state of a slot
    pub fn filter(&self, slot: usize) -> Option<&HandFilter> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    /// Times a filter's covariance guard tripped and was reset
    pub fn covariance_resets(&self) -> u64 {
        self.covariance_resets
    }

    /// Drop every slot's state
    pub fn reset(&mut self) {
        self.slots = [None, None];
        self.lost = [false; NUM_SLOTS];
    }

    /// Slots lost to the loss timeout on the latest [`update`](Self::update)
    pub fn lost_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.lost.iter().enumerate().filter(|(_, lost)| **lost).map(|(slot, _)| slot)
    }

    /// Smooth one tick's frames
    ///
    /// Returns one hand per slot that had a frame this tick, ordered by
    /// slot. Slots without a frame produce nothing and count toward the
    /// loss timeout. If a slot got several frames, the newest one is used.
    pub fn update(&mut self, frames: &[HandFrame]) -> Vec<SmoothedHand> {
        self.lost = [false; NUM_SLOTS];
        let mut latest: [Option<&HandFrame>; NUM_SLOTS] = [None, None];
        for frame in frames {
            let slot = frame.slot();
            match latest[slot] {
                Some(prev) if prev.captured_at_us > frame.captured_at_us => {}
                _ => latest[slot] = Some(frame),
            }
        }

        let mut out = Vec::with_capacity(NUM_SLOTS);
        for (slot, frame) in latest.iter().enumerate() {
            match frame {
                Some(frame) => out.push(self.update_slot(slot, frame)),
                None => self.miss_slot(slot),
            }
        }
        out
    }

    fn miss_slot(&mut self, slot: usize) {
        let timeout = self.config.loss_timeout_ticks;
        if let Some(filter) = self.slots[slot].as_mut() {
            filter.missed += 1;
            if filter.missed >= timeout {
                self.slots[slot] = None;
                self.lost[slot] = true;
                log::debug!("[GESTURE] Hand slot {} lost, filter state dropped", slot);
            }
        }
    }

    fn update_slot(&mut self, slot: usize, frame: &HandFrame) -> SmoothedHand {
        let cfg = &self.config;
        let Some(filter) = self.slots[slot].as_mut() else {
            // (Re)acquisition: start at the measurement, pass it through unchanged
            self.slots[slot] = Some(HandFilter::new(frame, cfg.measurement_noise));
            log::debug!("[GESTURE] Hand slot {} acquired", slot);
            return SmoothedHand::from_frame(frame);
        };

        let elapsed_us = frame.captured_at_us.saturating_sub(filter.last_us);
        let dt = (elapsed_us as f32 / 1_000_000.0).clamp(MIN_DT, MAX_DT);
        filter.last_us = frame.captured_at_us;
        filter.missed = 0;

        let reuse_gain = self.precision == SmootherPrecision::Reduced
            && filter.updates >= cfg.convergence_ticks;
        let outlier_distance = cfg.outlier_hand_fraction * frame.hand_size();

        let mut smoothed = SmoothedHand::from_frame(frame);
        for (index, (point, measured)) in filter.points.iter_mut().zip(frame.landmarks.iter()).enumerate() {
            if !measured.is_finite() {
                // Nothing to correct with: coast on the prediction
                for axis in point.axes.iter_mut() {
                    axis.pos = axis.predicted(dt);
                }
            } else {
                let predicted = point.predicted(dt);
                let confidence = measured.confidence.max(cfg.min_confidence_floor);
                let mut r = cfg.measurement_noise / (confidence * confidence);
                if crate::landmark::distance(predicted, measured.position()) > outlier_distance {
                    r *= cfg.outlier_noise_scale;
                }
                let z = measured.position();
                for (axis, &value) in point.axes.iter_mut().zip(z.iter()) {
                    axis.update(value, r, dt, cfg.process_noise, reuse_gain);
                }
            }

            if !point.axes.iter().all(AxisState::is_well_defined) {
                *point = PointFilter::new(measured, cfg.measurement_noise);
                if !measured.is_finite() {
                    point.axes = [AxisState::new(0.0, cfg.measurement_noise); 3];
                }
                self.covariance_resets += 1;
            }

            let [x, y, z] = point.position();
            smoothed.landmarks[index] = LandmarkPoint { x, y, z, confidence: measured.confidence };
            smoothed.velocities[index] = point.velocity();
        }
        filter.updates = filter.updates.saturating_add(1);
        smoothed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{HandId, INDEX_TIP, WRIST};
    use crate::synth::{synthetic_hand, HandShape};

    const TICK_US: Micros = 16_667;

    /// Small seeded xorshift generator with a Box-Muller normal sampler
    struct XorShift(u64);

    impl XorShift {
        fn next_f32(&mut self) -> f32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            ((self.0 >> 40) as f32 + 0.5) / (1u64 << 24) as f32
        }

        fn gaussian(&mut self, std: f32) -> f32 {
            let u1 = self.next_f32();
            let u2 = self.next_f32();
            (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos() * std
        }
    }

    fn frame_at(hand: HandId, x: f32, y: f32, tick: u64) -> HandFrame {
        HandFrame::new(hand, synthetic_hand(HandShape::Open, x, y, 0.2), tick * TICK_US)
    }

    fn diff_variance(values: &[f32]) -> f32 {
        let diffs: Vec<f32> = values.windows(2).map(|w| w[1] - w[0]).collect();
        let mean = diffs.iter().sum::<f32>() / diffs.len() as f32;
        diffs.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / diffs.len() as f32
    }

    #[test]
    fn test_smoothing_reduces_jitter() {
        let mut smoother = LandmarkSmoother::new(SmootherConfig::default());
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
        let mut raw = Vec::new();
        let mut smooth = Vec::new();

        for tick in 0..400u64 {
            // Slow drift plus detector noise
            let x = 0.3 + 0.1 * tick as f32 / 60.0;
            let mut frame = frame_at(HandId::Left, x, 0.8, tick);
            for p in frame.landmarks.iter_mut() {
                p.x += rng.gaussian(0.005);
                p.y += rng.gaussian(0.005);
            }
            let out = smoother.update(std::slice::from_ref(&frame));
            if tick >= 50 {
                raw.push(frame.landmarks[INDEX_TIP].x);
                smooth.push(out[0].landmarks[INDEX_TIP].x);
            }
        }

        let ratio = diff_variance(&smooth) / diff_variance(&raw);
        assert!(ratio < 0.5, "smoothed/raw jitter ratio {}", ratio);
    }

    #[test]
    fn test_constant_velocity_lag_is_bounded() {
        let mut smoother = LandmarkSmoother::new(SmootherConfig::default());
        let velocity = 0.3; // units per second
        let mut max_lag = 0.0_f32;
        for tick in 0..120u64 {
            let x = 0.2 + velocity * tick as f32 * TICK_US as f32 / 1e6;
            let frame = frame_at(HandId::Right, x, 0.8, tick);
            let out = smoother.update(std::slice::from_ref(&frame));
            if tick >= 30 {
                let lag = (out[0].landmarks[WRIST].x - frame.landmarks[WRIST].x).abs();
                max_lag = max_lag.max(lag);
                assert!((out[0].velocities[WRIST][0] - velocity).abs() < 0.05);
            }
        }
        assert!(max_lag < 0.002, "lag {}", max_lag);
    }

    #[test]
    fn test_detection_loss_drops_state() {
        let config = SmootherConfig::default();
        let timeout = config.loss_timeout_ticks as u64;
        let mut smoother = LandmarkSmoother::new(config);

        for tick in 0..20 {
            smoother.update(&[frame_at(HandId::Left, 0.3, 0.8, tick)]);
        }
        assert!(smoother.is_tracking(0));
        assert!(!smoother.is_tracking(1));

        for tick in 20..20 + timeout - 1 {
            assert!(smoother.update(&[]).is_empty(), "no frozen output at tick {}", tick);
            assert_eq!(smoother.lost_slots().count(), 0);
        }
        assert!(smoother.is_tracking(0));
        smoother.update(&[]);
        assert!(!smoother.is_tracking(0));
        assert_eq!(smoother.lost_slots().collect::<Vec<_>>(), vec![0]);

        // Reported once, on the tick the state was dropped
        smoother.update(&[]);
        assert_eq!(smoother.lost_slots().count(), 0);

        // Reacquired far away: the first frame passes through untouched
        let frame = frame_at(HandId::Left, 0.7, 0.5, 40);
        let out = smoother.update(std::slice::from_ref(&frame));
        assert_eq!(out[0].landmarks, frame.landmarks);
        assert_eq!(out[0].velocities, [[0.0; 3]; NUM_LANDMARKS]);
    }

    #[test]
    fn test_outlier_is_partially_trusted() {
        let mut smoother = LandmarkSmoother::new(SmootherConfig::default());
        for tick in 0..30 {
            smoother.update(&[frame_at(HandId::Left, 0.3, 0.8, tick)]);
        }
        // One frame with the index tip teleported a full hand size away
        let mut frame = frame_at(HandId::Left, 0.3, 0.8, 30);
        let before = frame.landmarks[INDEX_TIP].x;
        frame.landmarks[INDEX_TIP].x += 0.2;
        let out = smoother.update(std::slice::from_ref(&frame));
        let moved = out[0].landmarks[INDEX_TIP].x - before;
        assert!(moved > 0.0 && moved < 0.1, "moved {}", moved);
    }

    #[test]
    fn test_low_confidence_trusts_prediction() {
        let run = |confidence: f32| {
            let mut smoother = LandmarkSmoother::new(SmootherConfig::default());
            for tick in 0..30 {
                smoother.update(&[frame_at(HandId::Left, 0.3, 0.8, tick)]);
            }
            let mut frame = frame_at(HandId::Left, 0.31, 0.8, 30);
            for p in frame.landmarks.iter_mut() {
                p.confidence = confidence;
            }
            smoother.update(&[frame])[0].landmarks[WRIST].x - 0.3
        };
        assert!(run(0.2) < run(1.0) * 0.5);
    }

    #[test]
    fn test_reduced_precision_still_tracks() {
        let mut smoother = LandmarkSmoother::new(SmootherConfig::default());
        smoother.set_precision(SmootherPrecision::Reduced);
        let mut last = None;
        for tick in 0..90u64 {
            let x = if tick < 40 { 0.3 } else { 0.35 };
            last = smoother.update(&[frame_at(HandId::Left, x, 0.8, tick)]).pop();
        }
        let wrist = last.map(|h| h.landmarks[WRIST].x).unwrap_or_default();
        assert!((wrist - 0.35).abs() < 1e-3);
    }

    #[test]
    fn test_non_finite_measurement_keeps_covariance_valid() {
        let mut smoother = LandmarkSmoother::new(SmootherConfig::default());
        for tick in 0..10 {
            smoother.update(&[frame_at(HandId::Left, 0.3, 0.8, tick)]);
        }
        let mut frame = frame_at(HandId::Left, 0.3, 0.8, 10);
        frame.landmarks[WRIST].x = f32::NAN;
        let out = smoother.update(&[frame]);
        assert!(out[0].landmarks[WRIST].x.is_finite());

        let filter = smoother.filter(0).unwrap();
        for index in 0..NUM_LANDMARKS {
            let variance = filter.point(index).unwrap().variance();
            assert!(variance.iter().all(|v| v.is_finite() && *v > 0.0));
        }
    }

    #[test]
    fn test_newest_frame_wins_per_slot() {
        let mut smoother = LandmarkSmoother::new(SmootherConfig::default());
        let old = frame_at(HandId::Left, 0.2, 0.8, 1);
        let new = frame_at(HandId::First, 0.4, 0.8, 2);
        let out = smoother.update(&[new.clone(), old]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].landmarks, new.landmarks);
    }
}
