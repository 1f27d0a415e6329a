//! Settings files shared by the handmix crates
//!
//! Every crate keeps its own settings struct and reads it through
//! [`load_config`]; the engine's settings live here because both the
//! gesture and player crates embed them.

mod engine;
mod io;
mod paths;

pub use engine::{AudioBackendChoice, EngineConfig};
pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path};
