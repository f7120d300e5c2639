use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::phase::TrialPhase;
use crate::stimulus::Shape;

/// One scheduled shape trial for one subject. Repetition numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Turn {
    pub subject: String,
    pub shape: Shape,
    pub session_rep: u32,
    pub shape_rep: u32,
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | Rep {} | {} #{}",
            self.subject, self.session_rep, self.shape, self.shape_rep
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    Interrupted,
}

/// A finished recording as reported by the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoHandle {
    pub path: PathBuf,
    pub frames: u64,
}

/// Onset of a phase, on the display's flip clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseMark {
    pub phase: TrialPhase,
    pub onset_ns: u64,
}

/// Flip timestamps bounding a measurement recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSpan {
    /// Onset of the first measurement beep.
    pub start_ns: u64,
    /// Offset of the last measurement beep.
    pub last_beep_offset_ns: u64,
    /// End of the silence that follows the last beep.
    pub stop_ns: u64,
}

/// Outcome of one turn, handed to the logging collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub turn: Turn,
    pub status: TrialStatus,
    pub video: Option<VideoHandle>,
    pub recording: Option<RecordingSpan>,
    pub phases: Vec<PhaseMark>,
}

impl TrialResult {
    pub fn completed(
        turn: Turn,
        video: VideoHandle,
        recording: RecordingSpan,
        phases: Vec<PhaseMark>,
    ) -> Self {
        Self {
            turn,
            status: TrialStatus::Completed,
            video: Some(video),
            recording: Some(recording),
            phases,
        }
    }

    /// Interrupted trials never carry a video; partial files are discarded.
    pub fn interrupted(turn: Turn, phases: Vec<PhaseMark>) -> Self {
        Self {
            turn,
            status: TrialStatus::Interrupted,
            video: None,
            recording: None,
            phases,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TrialStatus::Completed
    }

    pub fn onset_of(&self, phase: TrialPhase) -> Option<u64> {
        self.phases
            .iter()
            .find(|mark| mark.phase == phase)
            .map(|mark| mark.onset_ns)
    }
}
