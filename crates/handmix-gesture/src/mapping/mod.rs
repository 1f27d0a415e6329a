//! Gesture-to-parameter mapping
//!
//! - [`profile`]: rules, validation and the swappable active profile
//! - [`engine`]: per-tick event → command resolution
//! - [`store`]: `profiles.yaml` loading and saving

pub mod engine;
pub mod profile;
pub mod store;

pub use engine::{MappingConfig, MappingEngine};
pub use profile::{
    ControlTarget, MappingMode, MappingProfile, MappingRule, ProfileError, ProfileHandle, TargetParam, ValueRange,
};
pub use store::{find_profile, load_profiles, save_profiles};
