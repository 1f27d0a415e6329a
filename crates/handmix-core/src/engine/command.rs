//! Control commands for the real-time mixing engine
//!
//! A [`ControlCommand`] is one parameter change produced on the control thread
//! and applied by the audio thread at a quantum boundary. Commands are small
//! `Copy` values so they can travel through the lock-free ring buffer in
//! [`super::bus`] and be coalesced in place on overflow.
//!
//! Each [`ParamKind`] knows its declared range and default. The engine clamps
//! every applied value to that range and the mapping layer uses the same
//! table for its own value estimates, so both sides agree on limits.

use serde::{Deserialize, Serialize};

use crate::types::{Micros, MAX_STEMS};

/// EQ band of the 3-band channel EQ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub const ALL: [EqBand; 3] = [EqBand::Low, EqBand::Mid, EqBand::High];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            EqBand::Low => 0,
            EqBand::Mid => 1,
            EqBand::High => 2,
        }
    }
}

/// Axis of a stem's 3-D spatial position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Parameter of a stem targeted by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Channel volume (0.0 - 1.0)
    Volume,
    /// Mute flag (value >= 0.5 = muted)
    Mute,
    /// Stereo pan (-1.0 = left, 0.0 = center, 1.0 = right)
    Pan,
    /// EQ band gain in dB
    Eq(EqBand),
    /// Crossfade position between this stem and `other`
    /// (0.0 = all of the lower index, 0.5 = both at unity, 1.0 = all of the higher)
    Crossfade { other: usize },
    /// Spatial position on one axis (-1.0 - 1.0)
    Spatial(Axis),
    /// Compressor threshold in dBFS
    CompThreshold,
    /// Compressor ratio (1:1 - 20:1)
    CompRatio,
    /// Compressor attack time in milliseconds
    CompAttack,
    /// Compressor release time in milliseconds
    CompRelease,
    /// Stem whose envelope ducks this stem (-1 = none)
    SidechainSource,
    /// Sidechain ducking depth (0.0 - 1.0)
    SidechainDepth,
}

/// Parameter family, used for per-family tunables like the minimum-change throttle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamClass {
    Volume,
    Mute,
    Pan,
    Eq,
    Crossfade,
    Spatial,
    Compressor,
    Sidechain,
}

impl ParamKind {
    /// Declared `(min, max)` range. Applied values are clamped to this.
    pub fn range(&self) -> (f32, f32) {
        match self {
            ParamKind::Volume => (0.0, 1.0),
            ParamKind::Mute => (0.0, 1.0),
            ParamKind::Pan => (-1.0, 1.0),
            ParamKind::Eq(_) => (-24.0, 12.0),
            ParamKind::Crossfade { .. } => (0.0, 1.0),
            ParamKind::Spatial(_) => (-1.0, 1.0),
            ParamKind::CompThreshold => (-60.0, 0.0),
            ParamKind::CompRatio => (1.0, 20.0),
            ParamKind::CompAttack => (0.1, 200.0),
            ParamKind::CompRelease => (5.0, 2000.0),
            ParamKind::SidechainSource => (-1.0, (MAX_STEMS - 1) as f32),
            ParamKind::SidechainDepth => (0.0, 1.0),
        }
    }

    /// Value a freshly reset stem channel holds for this parameter
    pub fn default_value(&self) -> f32 {
        match self {
            ParamKind::Volume => 1.0,
            ParamKind::Mute => 0.0,
            ParamKind::Pan => 0.0,
            ParamKind::Eq(_) => 0.0,
            ParamKind::Crossfade { .. } => 0.5,
            ParamKind::Spatial(_) => 0.0,
            ParamKind::CompThreshold => 0.0,
            ParamKind::CompRatio => 1.0,
            ParamKind::CompAttack => 10.0,
            ParamKind::CompRelease => 100.0,
            ParamKind::SidechainSource => -1.0,
            ParamKind::SidechainDepth => 0.0,
        }
    }

    /// Clamp a value into the declared range (NaN maps to the default)
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.default_value();
        }
        let (min, max) = self.range();
        value.clamp(min, max)
    }

    /// Width of the declared range
    #[inline]
    pub fn span(&self) -> f32 {
        let (min, max) = self.range();
        max - min
    }

    pub fn class(&self) -> ParamClass {
        match self {
            ParamKind::Volume => ParamClass::Volume,
            ParamKind::Mute => ParamClass::Mute,
            ParamKind::Pan => ParamClass::Pan,
            ParamKind::Eq(_) => ParamClass::Eq,
            ParamKind::Crossfade { .. } => ParamClass::Crossfade,
            ParamKind::Spatial(_) => ParamClass::Spatial,
            ParamKind::CompThreshold
            | ParamKind::CompRatio
            | ParamKind::CompAttack
            | ParamKind::CompRelease => ParamClass::Compressor,
            ParamKind::SidechainSource | ParamKind::SidechainDepth => ParamClass::Sidechain,
        }
    }

    /// Compact numeric code for publishing through atomics
    ///
    /// Crossfade codes embed the partner stem: `100 + other`.
    pub fn code(&self) -> u32 {
        match self {
            ParamKind::Volume => 1,
            ParamKind::Mute => 2,
            ParamKind::Pan => 3,
            ParamKind::Eq(band) => 10 + band.index() as u32,
            ParamKind::Spatial(axis) => 20 + axis.index() as u32,
            ParamKind::CompThreshold => 30,
            ParamKind::CompRatio => 31,
            ParamKind::CompAttack => 32,
            ParamKind::CompRelease => 33,
            ParamKind::SidechainSource => 40,
            ParamKind::SidechainDepth => 41,
            ParamKind::Crossfade { other } => 100 + *other as u32,
        }
    }

    /// Inverse of [`ParamKind::code`]
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => ParamKind::Volume,
            2 => ParamKind::Mute,
            3 => ParamKind::Pan,
            10 => ParamKind::Eq(EqBand::Low),
            11 => ParamKind::Eq(EqBand::Mid),
            12 => ParamKind::Eq(EqBand::High),
            20 => ParamKind::Spatial(Axis::X),
            21 => ParamKind::Spatial(Axis::Y),
            22 => ParamKind::Spatial(Axis::Z),
            30 => ParamKind::CompThreshold,
            31 => ParamKind::CompRatio,
            32 => ParamKind::CompAttack,
            33 => ParamKind::CompRelease,
            40 => ParamKind::SidechainSource,
            41 => ParamKind::SidechainDepth,
            c if c >= 100 => ParamKind::Crossfade { other: (c - 100) as usize },
            _ => return None,
        })
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Volume => write!(f, "volume"),
            ParamKind::Mute => write!(f, "mute"),
            ParamKind::Pan => write!(f, "pan"),
            ParamKind::Eq(EqBand::Low) => write!(f, "eq_low"),
            ParamKind::Eq(EqBand::Mid) => write!(f, "eq_mid"),
            ParamKind::Eq(EqBand::High) => write!(f, "eq_high"),
            ParamKind::Crossfade { other } => write!(f, "crossfade<->{}", other),
            ParamKind::Spatial(Axis::X) => write!(f, "spatial_x"),
            ParamKind::Spatial(Axis::Y) => write!(f, "spatial_y"),
            ParamKind::Spatial(Axis::Z) => write!(f, "spatial_z"),
            ParamKind::CompThreshold => write!(f, "comp_threshold"),
            ParamKind::CompRatio => write!(f, "comp_ratio"),
            ParamKind::CompAttack => write!(f, "comp_attack"),
            ParamKind::CompRelease => write!(f, "comp_release"),
            ParamKind::SidechainSource => write!(f, "sidechain_source"),
            ParamKind::SidechainDepth => write!(f, "sidechain_depth"),
        }
    }
}

/// How a command's value is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// Replace the current value
    Set,
    /// Add to the current value (mute: any non-zero delta toggles)
    Delta,
}

/// (stem, parameter) pair a command targets
///
/// Crossfade pairs are normalized so (0,1) and (1,0) are the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub stem: usize,
    pub param: ParamKind,
}

impl TargetKey {
    pub fn new(stem: usize, param: ParamKind) -> Self {
        match param {
            ParamKind::Crossfade { other } if other < stem => Self {
                stem: other,
                param: ParamKind::Crossfade { other: stem },
            },
            _ => Self { stem, param },
        }
    }
}

/// One parameter change destined for the audio engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlCommand {
    /// Target stem index
    pub stem: usize,
    /// Target parameter
    pub param: ParamKind,
    /// New value (Set) or change (Delta)
    pub value: f32,
    /// Session-clock time at or after which the command applies
    pub timestamp_us: Micros,
    pub mode: CommandMode,
}

impl ControlCommand {
    /// Absolute set
    pub fn set(stem: usize, param: ParamKind, value: f32, timestamp_us: Micros) -> Self {
        Self { stem, param, value, timestamp_us, mode: CommandMode::Set }
    }

    /// Relative change
    pub fn delta(stem: usize, param: ParamKind, value: f32, timestamp_us: Micros) -> Self {
        Self { stem, param, value, timestamp_us, mode: CommandMode::Delta }
    }

    /// Coalescing key of this command
    #[inline]
    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.stem, self.param)
    }
}
