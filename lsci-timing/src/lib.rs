pub mod frames;
pub mod interrupt;
pub mod timer;

pub use frames::{duration_to_frames, frames_to_duration, tone_buffer_len, FrameRate, ToneBuffer};
pub use interrupt::{Interrupt, InterruptKind};
pub use timer::{CalibrationStats, HighPrecisionTimer, Timer};
