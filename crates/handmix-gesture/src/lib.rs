//! Handmix Gesture - from hand landmarks to stem commands
//!
//! - [`smoother`]: per-landmark constant-velocity Kalman filters
//! - [`classifier`]: gesture scoring with hysteresis, one gesture per hand
//! - [`mapping`]: profiles that turn gesture events into control commands
//! - [`pipeline`]: the per-tick control loop tying them to the command bus
//! - [`observe`]: lock-free state and an event stream for a UI

pub mod classifier;
pub mod config;
pub mod landmark;
pub mod mapping;
pub mod observe;
pub mod pipeline;
pub mod smoother;
pub mod synth;

pub use classifier::{GestureClassifier, GestureEvent, GestureKind, HandSelector, Phase};
pub use config::GestureConfig;
pub use landmark::{HandFrame, HandId, LandmarkPoint, SmoothedHand, NUM_LANDMARKS};
pub use mapping::{MappingEngine, MappingProfile, ProfileHandle};
pub use observe::{ui_channel, ControlObserver, UiEvent};
pub use pipeline::{ControlLoop, TickReport};
pub use smoother::LandmarkSmoother;
