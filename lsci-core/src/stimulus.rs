use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque stimulus identifier. How it is drawn is up to the display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(String);

impl Shape {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Shape {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pre-generated tones; both play at the configured beep frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneKind {
    Training,
    Measurement,
}

/// Recorded spoken instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    CloseYourEyes,
    Starting,
    OpenYourEyes,
    NextParticipant,
    ExperimentCompleted,
}

impl Instruction {
    /// Clip name as shipped in the instruction recordings directory.
    pub fn clip_id(&self) -> &'static str {
        match self {
            Self::CloseYourEyes => "close_your_eyes",
            Self::Starting => "starting",
            Self::OpenYourEyes => "open_your_eyes",
            Self::NextParticipant => "next_participant_please",
            Self::ExperimentCompleted => "experiment_completed",
        }
    }

    /// Cue played once a shape's measurement is over.
    pub fn after_measurement(is_last_shape: bool, is_last_turn: bool) -> Self {
        match (is_last_shape, is_last_turn) {
            (false, _) => Self::OpenYourEyes,
            (true, false) => Self::NextParticipant,
            (true, true) => Self::ExperimentCompleted,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.clip_id())
    }
}

/// What the participant currently sees or hears, mirrored to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum StimulusState {
    Idle,
    Blank,
    Shape(Shape),
    Recording,
    Instruction(Instruction),
}

impl fmt::Display for StimulusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Blank => f.write_str("blank"),
            Self::Shape(shape) => write!(f, "shape:{shape}"),
            Self::Recording => f.write_str("recording"),
            Self::Instruction(clip) => write!(f, "instruction:{clip}"),
        }
    }
}
