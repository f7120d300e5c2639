//! Error taxonomy shared by the engine and its collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{Command, ExperimentState};

/// A session configuration that cannot produce a valid run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("session has no subjects")]
    NoSubjects,

    #[error("session has no shapes")]
    NoShapes,

    #[error("duplicate subject: {0}")]
    DuplicateSubject(String),

    #[error("duplicate shape: {0}")]
    DuplicateShape(String),

    #[error("{field} must be a positive number of seconds, got {value}")]
    NonPositiveDuration { field: &'static str, value: f64 },

    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("{field} must be at least 1")]
    ZeroCount { field: &'static str },

    #[error("progress snapshot does not match this session: {0}")]
    ProgressMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Display,
    Audio,
    Recorder,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Display => "display",
            Self::Audio => "audio",
            Self::Recorder => "recorder",
        })
    }
}

/// A stimulus or capture device failed. Fatal to the running turn.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{device} failure: {message}")]
pub struct HardwareError {
    pub device: Device,
    pub message: String,
}

impl HardwareError {
    pub fn new(device: Device, message: impl Into<String>) -> Self {
        Self {
            device,
            message: message.into(),
        }
    }

    pub fn display(message: impl Into<String>) -> Self {
        Self::new(Device::Display, message)
    }

    pub fn audio(message: impl Into<String>) -> Self {
        Self::new(Device::Audio, message)
    }

    pub fn recorder(message: impl Into<String>) -> Self {
        Self::new(Device::Recorder, message)
    }
}

/// A command the current state does not allow. Nothing was changed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {command} while {state}")]
pub struct InvalidTransition {
    pub command: Command,
    pub state: ExperimentState,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("engine thread is no longer running")]
    EngineGone,
}

pub type Result<T> = std::result::Result<T, Error>;
