//! Stem mixing engine
//!
//! - Command bus: SPSC transport from the control thread
//! - StemChannel: per-stem pan, EQ, compressor, spatial and gain
//! - Mixer: crossfade matrix, sidechain ducking, master chain
//! - AudioEngine: applies commands at quantum boundaries and mixes
//! - Atomics: lock-free state for the monitor and UI

mod atomics;
mod bus;
mod channel;
mod command;
mod dsp;
mod engine;
mod master_clipper;
mod master_limiter;
mod mixer;
mod source;

pub use atomics::*;
pub use bus::*;
pub use channel::{StemChannel, StemParams};
pub use command::*;
pub use engine::*;
pub use master_clipper::*;
pub use master_limiter::*;
pub use mixer::*;
pub use source::*;
