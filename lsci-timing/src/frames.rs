//! Frame-locked duration arithmetic.
//!
//! Every duration that drives the display is converted to a whole number of
//! refresh intervals with one rule: round to the nearest frame, never fewer
//! than one. Audio buffers that accompany a visual interval are sized from the
//! same frame count, so sound and picture cover identical spans.

use std::fmt;
use std::time::Duration;

/// Display refresh rate in Hz. Always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FrameRate(f64);

impl FrameRate {
    /// Assumed when a display cannot be measured.
    pub const FALLBACK: FrameRate = FrameRate(60.0);

    pub fn new(hz: f64) -> Option<Self> {
        (hz.is_finite() && hz > 0.0).then_some(Self(hz))
    }

    pub fn hz(self) -> f64 {
        self.0
    }

    pub fn frame_duration(self) -> Duration {
        Duration::from_secs_f64(1.0 / self.0)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} Hz", self.0)
    }
}

/// Number of refreshes that best covers `duration` (nearest, minimum 1).
pub fn duration_to_frames(duration: Duration, rate: FrameRate) -> u32 {
    let frames = (duration.as_secs_f64() * rate.hz()).round();
    frames.clamp(1.0, f64::from(u32::MAX)) as u32
}

pub fn frames_to_duration(frames: u32, rate: FrameRate) -> Duration {
    Duration::from_secs_f64(f64::from(frames) / rate.hz())
}

/// Samples in a buffer lasting exactly `frames` refreshes.
pub fn tone_buffer_len(frames: u32, rate: FrameRate, sample_rate: u32) -> usize {
    let samples = (f64::from(frames) / rate.hz() * f64::from(sample_rate)).round();
    samples.max(1.0) as usize
}

/// A sine tone whose length is an exact multiple of the frame interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneBuffer {
    pub frequency_hz: f64,
    pub volume: f32,
    pub sample_rate: u32,
    pub frames: u32,
    pub duration: Duration,
    pub samples: usize,
}

impl ToneBuffer {
    pub fn frame_locked(
        frequency_hz: f64,
        volume: f32,
        frames: u32,
        rate: FrameRate,
        sample_rate: u32,
    ) -> Self {
        Self {
            frequency_hz,
            volume,
            sample_rate,
            frames,
            duration: frames_to_duration(frames, rate),
            samples: tone_buffer_len(frames, rate, sample_rate),
        }
    }
}
