//! Handmix Core - real-time stem mixing for gesture control
//!
//! - [`engine`]: command bus, per-stem DSP and the mixing engine
//! - [`audio`]: headless and device output drivers
//! - [`monitor`]: end-to-end latency tracking and quality degradation
//! - [`config`]: YAML configuration shared by every handmix crate

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use types::*;
