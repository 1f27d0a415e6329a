//! Why audio output could not start

use thiserror::Error;

use crate::error::EngineError;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No default audio output device")]
    NoDefaultDevice,

    /// The device offers no stereo f32 output, or its config query failed
    #[error("Output device config: {0}")]
    ConfigError(String),

    #[error("Cannot build output stream: {0}")]
    StreamBuildError(String),

    #[error("Cannot start output stream: {0}")]
    StreamPlayError(String),

    /// Device output asked of a build without `cpal-backend`
    #[error("Device output needs the cpal-backend feature")]
    BackendUnavailable,

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The headless clock thread could not be spawned
    #[error("Cannot spawn audio thread: {0}")]
    Thread(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
