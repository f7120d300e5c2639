pub mod error;
pub mod phase;
pub mod state;
pub mod stimulus;
pub mod trial;

pub use error::{ConfigurationError, Device, Error, HardwareError, InvalidTransition, Result};
pub use phase::{Phase, TrialPhase};
pub use state::{Command, ExperimentState};
pub use stimulus::{Instruction, Shape, StimulusState, ToneKind};
pub use trial::{PhaseMark, RecordingSpan, TrialResult, TrialStatus, Turn, VideoHandle};
