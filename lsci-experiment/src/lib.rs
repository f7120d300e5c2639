pub mod bridge;
pub mod config;
pub mod engine;
pub mod hardware;
pub mod protocol;
pub mod queue;

pub use bridge::{ControlHandle, StatusEvent, StatusPublisher};
pub use config::{SessionConfig, TimingSettings, ToneSettings};
pub use engine::{EngineHandle, EngineReport, ExperimentEngine};
pub use hardware::{Audio, AudioCompletion, Display, FrameSpan, Hardware, Recorder, TrialSink, WaitOutcome};
pub use protocol::{FrameTiming, TrialAborted, TrialContext, TrialProtocol};
pub use queue::{QueueProgress, SessionQueue};
