//! Mapping profiles
//!
//! A profile is a named list of rules binding gestures to stem parameters.
//! Profiles are validated before activation and immutable afterwards; the
//! active one lives behind a [`ProfileHandle`] and is swapped as a whole.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use handmix_core::engine::{Axis, EqBand, ParamKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{GestureKind, HandSelector};

/// Slack allowed when comparing a rule range against the declared range
const RANGE_EPSILON: f32 = 1e-6;

/// Profile loading and validation errors
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Profile name is empty")]
    EmptyName,

    #[error("Rule {rule}: range [{min}, {max}] is reversed or not finite")]
    InvalidRange { rule: usize, min: f32, max: f32 },

    #[error("Rule {rule}: range [{min}, {max}] exceeds {param} limits [{limit_min}, {limit_max}]")]
    RangeOutOfBounds {
        rule: usize,
        param: String,
        min: f32,
        max: f32,
        limit_min: f32,
        limit_max: f32,
    },

    #[error("Rule {rule}: deadzone {deadzone} must be in [0, 0.5)")]
    InvalidDeadzone { rule: usize, deadzone: f32 },

    #[error("Rule {rule}: sensitivity {sensitivity} must be positive")]
    InvalidSensitivity { rule: usize, sensitivity: f32 },

    #[error("Rule {rule}: crossfade needs a partner stem (`with`)")]
    MissingCrossfadePartner { rule: usize },

    #[error("Rule {rule}: crossfade pair uses stem {stem} twice")]
    SelfCrossfade { rule: usize, stem: usize },

    #[error("No profile named '{0}'")]
    NotFound(String),

    #[error("Failed to access profile file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid profile YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Stem parameter a rule drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetParam {
    Volume,
    Mute,
    Pan,
    EqLow,
    EqMid,
    EqHigh,
    /// Requires `with` on the target
    Crossfade,
    SpatialX,
    SpatialY,
    SpatialZ,
    CompThreshold,
    CompRatio,
    CompAttack,
    CompRelease,
    SidechainSource,
    SidechainDepth,
}

/// Where a rule's commands go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlTarget {
    pub stem: usize,
    pub param: TargetParam,
    /// Partner stem of a crossfade pair
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<usize>,
}

impl ControlTarget {
    pub fn new(stem: usize, param: TargetParam) -> Self {
        Self { stem, param, with: None }
    }

    pub fn crossfade(stem: usize, other: usize) -> Self {
        Self { stem, param: TargetParam::Crossfade, with: Some(other) }
    }

    /// Engine parameter, or `None` for a crossfade without a partner
    pub fn param_kind(&self) -> Option<ParamKind> {
        Some(match self.param {
            TargetParam::Volume => ParamKind::Volume,
            TargetParam::Mute => ParamKind::Mute,
            TargetParam::Pan => ParamKind::Pan,
            TargetParam::EqLow => ParamKind::Eq(EqBand::Low),
            TargetParam::EqMid => ParamKind::Eq(EqBand::Mid),
            TargetParam::EqHigh => ParamKind::Eq(EqBand::High),
            TargetParam::Crossfade => ParamKind::Crossfade { other: self.with? },
            TargetParam::SpatialX => ParamKind::Spatial(Axis::X),
            TargetParam::SpatialY => ParamKind::Spatial(Axis::Y),
            TargetParam::SpatialZ => ParamKind::Spatial(Axis::Z),
            TargetParam::CompThreshold => ParamKind::CompThreshold,
            TargetParam::CompRatio => ParamKind::CompRatio,
            TargetParam::CompAttack => ParamKind::CompAttack,
            TargetParam::CompRelease => ParamKind::CompRelease,
            TargetParam::SidechainSource => ParamKind::SidechainSource,
            TargetParam::SidechainDepth => ParamKind::SidechainDepth,
        })
    }
}

/// How a gesture parameter becomes a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// Parameter position maps onto the range
    #[default]
    Absolute,
    /// Parameter movement nudges the current value
    Relative,
    /// Gesture start sets the range maximum
    Trigger,
    /// Gesture start flips between range minimum and maximum
    Toggle,
}

/// Output range of a rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    #[inline]
    pub fn lerp(&self, t: f32) -> f32 {
        self.min + (self.max - self.min) * t
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

fn default_hand() -> HandSelector {
    HandSelector::Either
}

fn default_sensitivity() -> f32 {
    1.0
}

/// One gesture → parameter binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    pub gesture: GestureKind,
    #[serde(default = "default_hand")]
    pub hand: HandSelector,
    pub target: ControlTarget,
    #[serde(default)]
    pub mode: MappingMode,
    /// Relative mode gain
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    /// Dead band on the gesture parameter, in [0, 0.5)
    #[serde(default)]
    pub deadzone: f32,
    /// Output range (defaults to the parameter's declared range)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ValueRange>,
    /// Higher wins when rules hit the same target in one tick
    #[serde(default)]
    pub priority: i32,
    /// Map the parameter as `1 - p` (defaults to true for pinch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invert: Option<bool>,
    /// Put the value back to what it was when the gesture began
    #[serde(default)]
    pub restore_on_release: bool,
}

impl MappingRule {
    pub fn new(gesture: GestureKind, hand: HandSelector, target: ControlTarget, mode: MappingMode) -> Self {
        Self {
            gesture,
            hand,
            target,
            mode,
            sensitivity: 1.0,
            deadzone: 0.0,
            range: None,
            priority: 0,
            invert: None,
            restore_on_release: false,
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.range = Some(ValueRange::new(min, max));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadzone(mut self, deadzone: f32) -> Self {
        self.deadzone = deadzone;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = Some(invert);
        self
    }

    pub fn restoring(mut self) -> Self {
        self.restore_on_release = true;
        self
    }

    /// Whether the parameter is inverted (closer pinch = larger value by default)
    pub fn inverts(&self) -> bool {
        self.invert.unwrap_or(self.gesture == GestureKind::Pinch)
    }

    /// Range in effect: the rule's own, else the full declared range
    pub fn effective_range(&self, param: &ParamKind) -> ValueRange {
        self.range.unwrap_or_else(|| {
            let (min, max) = param.range();
            ValueRange::new(min, max)
        })
    }

    fn validate(&self, rule: usize) -> Result<(), ProfileError> {
        let param = self.target.param_kind().ok_or(ProfileError::MissingCrossfadePartner { rule })?;
        if let ParamKind::Crossfade { other } = param {
            if other == self.target.stem {
                return Err(ProfileError::SelfCrossfade { rule, stem: other });
            }
        }

        if let Some(range) = self.range {
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(ProfileError::InvalidRange { rule, min: range.min, max: range.max });
            }
            let (limit_min, limit_max) = param.range();
            if range.min < limit_min - RANGE_EPSILON || range.max > limit_max + RANGE_EPSILON {
                return Err(ProfileError::RangeOutOfBounds {
                    rule,
                    param: param.to_string(),
                    min: range.min,
                    max: range.max,
                    limit_min,
                    limit_max,
                });
            }
        }

        if !(0.0..0.5).contains(&self.deadzone) {
            return Err(ProfileError::InvalidDeadzone { rule, deadzone: self.deadzone });
        }
        if !(self.sensitivity > 0.0 && self.sensitivity.is_finite()) {
            return Err(ProfileError::InvalidSensitivity { rule, sensitivity: self.sensitivity });
        }
        Ok(())
    }
}

/// Named set of rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingProfile {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<MappingRule>,
}

impl MappingProfile {
    pub fn new(name: impl Into<String>, rules: Vec<MappingRule>) -> Self {
        Self { name: name.into(), rules }
    }

    /// Check every rule; stem indices are left to the engine
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        for (index, rule) in self.rules.iter().enumerate() {
            rule.validate(index)?;
        }
        Ok(())
    }

    /// Built-in profile for a four-stem mix
    ///
    /// | Gesture | Hand | Target |
    /// |---|---|---|
    /// | pinch | right | stem 0 volume |
    /// | pinch | left | stem 1 volume |
    /// | two-hand pinch | both | crossfade 0 ↔ 1 (restored on release) |
    /// | horizontal swipe | either | stem 2 pan |
    /// | peace sign | either | stem 2 high EQ, -12..+6 dB |
    /// | fist | either | stem 3 mute toggle |
    /// | spread | right | stem 3 sidechain depth, relative |
    pub fn default_two_hand() -> Self {
        use GestureKind as G;
        use HandSelector as H;
        Self::new(
            "two_hand",
            vec![
                MappingRule::new(G::Pinch, H::Right, ControlTarget::new(0, TargetParam::Volume), MappingMode::Absolute)
                    .with_deadzone(0.01),
                MappingRule::new(G::Pinch, H::Left, ControlTarget::new(1, TargetParam::Volume), MappingMode::Absolute)
                    .with_deadzone(0.01),
                MappingRule::new(G::TwoHandPinch, H::Both, ControlTarget::crossfade(0, 1), MappingMode::Absolute)
                    .with_priority(10)
                    .restoring(),
                MappingRule::new(G::SwipeHorizontal, H::Either, ControlTarget::new(2, TargetParam::Pan), MappingMode::Absolute),
                MappingRule::new(G::PeaceSign, H::Either, ControlTarget::new(2, TargetParam::EqHigh), MappingMode::Absolute)
                    .with_range(-12.0, 6.0),
                MappingRule::new(G::Fist, H::Either, ControlTarget::new(3, TargetParam::Mute), MappingMode::Toggle),
                MappingRule::new(G::Spread, H::Right, ControlTarget::new(3, TargetParam::SidechainDepth), MappingMode::Relative)
                    .with_sensitivity(0.5)
                    .with_deadzone(0.02),
            ],
        )
    }
}

/// Shared, atomically swappable active profile
///
/// Readers take one `Arc` per tick; a swap only replaces the pointer and
/// bumps the generation, so a reader never sees a half-updated profile.
#[derive(Debug)]
pub struct ProfileHandle {
    current: RwLock<Arc<MappingProfile>>,
    generation: AtomicU64,
}

impl ProfileHandle {
    /// Wrap an initial profile (validate it first with [`MappingProfile::validate`])
    pub fn new(profile: MappingProfile) -> Self {
        Self {
            current: RwLock::new(Arc::new(profile)),
            generation: AtomicU64::new(0),
        }
    }

    /// Validate and swap in a new profile
    pub fn activate(&self, profile: MappingProfile) -> Result<(), ProfileError> {
        profile.validate()?;
        let name = profile.name.clone();
        let rules = profile.rules.len();
        {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            *current = Arc::new(profile);
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        log::info!("[MAPPING] Activated profile '{}' ({} rules)", name, rules);
        Ok(())
    }

    pub fn current(&self) -> Arc<MappingProfile> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Current profile with the generation it was activated as
    pub fn snapshot(&self) -> (Arc<MappingProfile>, u64) {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        (Arc::clone(&current), self.generation.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
