//! Engine setup errors

use thiserror::Error;

/// Errors raised while building the audio engine
///
/// Only setup fails; once running, the engine rejects bad commands through
/// its counters instead of returning errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid stem count {requested} (must be 1..={max})")]
    InvalidStemCount { requested: usize, max: usize },

    #[error("Invalid quantum of {frames} frames (must be 1..={max})")]
    InvalidQuantum { frames: usize, max: usize },

    #[error("Unsupported sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    #[error("Invalid engine setting: {0}")]
    InvalidSetting(String),
}

/// Result type for engine setup
pub type EngineResult<T> = Result<T, EngineError>;
