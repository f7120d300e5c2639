use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidTransition;

/// Session-level state. `Completed` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ExperimentState {
    #[default]
    Idle = 0,
    Running = 1,
    Paused = 2,
    AwaitingConfirmNext = 3,
    Completed = 4,
    Stopped = 5,
}

/// Operator commands posted from the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Pause,
    Resume,
    ConfirmNext,
    Stop,
}

impl ExperimentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }

    pub fn accepts(&self, command: Command) -> bool {
        match command {
            Command::Start => *self == Self::Idle,
            Command::Pause => *self == Self::Running,
            Command::Resume => *self == Self::Paused,
            Command::ConfirmNext => *self == Self::AwaitingConfirmNext,
            Command::Stop => !self.is_terminal(),
        }
    }

    pub fn check(&self, command: Command) -> Result<(), InvalidTransition> {
        if self.accepts(command) {
            Ok(())
        } else {
            Err(InvalidTransition {
                command,
                state: *self,
            })
        }
    }

    /// Inverse of `as u8`, for states published through an atomic.
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::AwaitingConfirmNext,
            4 => Self::Completed,
            5 => Self::Stopped,
            _ => return None,
        })
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::AwaitingConfirmNext => "awaiting confirmation",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::ConfirmNext => "confirm next",
            Self::Stop => "stop",
        })
    }
}
