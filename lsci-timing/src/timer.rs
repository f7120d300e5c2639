use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::frames::FrameRate;

/// Slowest refresh rate a calibration run is trusted to report.
pub const MIN_PLAUSIBLE_HZ: f64 = 30.0;
/// Fastest refresh rate a calibration run is trusted to report.
pub const MAX_PLAUSIBLE_HZ: f64 = 240.0;

/// Monotonic session clock with frame-time bookkeeping.
///
/// Clones share the same epoch, so timestamps taken by the display, the
/// recorder thread and the engine are directly comparable.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn calibration_stats(&self) -> CalibrationStats;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationStats {
    pub samples: usize,
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

impl CalibrationStats {
    /// Refresh rate implied by the recorded frame times.
    ///
    /// Measurements outside the plausible display range (or no measurement
    /// at all) fall back to [`FrameRate::FALLBACK`].
    pub fn refresh_rate(&self) -> FrameRate {
        if (MIN_PLAUSIBLE_HZ..=MAX_PLAUSIBLE_HZ).contains(&self.effective_fps) {
            if let Some(rate) = FrameRate::new(self.effective_fps) {
                return rate;
            }
        }
        tracing::warn!(
            measured_hz = self.effective_fps,
            fallback_hz = FrameRate::FALLBACK.hz(),
            "measured refresh rate out of range"
        );
        FrameRate::FALLBACK
    }
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
    frame_times: VecDeque<Duration>,
    max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }

    fn record_frame(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(d);
    }

    fn calibration_stats(&self) -> CalibrationStats {
        if self.frame_times.is_empty() {
            return CalibrationStats::default();
        }
        let times: Vec<f64> = self
            .frame_times
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            samples: times.len(),
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            start: Instant::now(),
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    /// Forget recorded frame times, keeping the epoch.
    pub fn reset_frames(&mut self) {
        self.frame_times.clear();
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_gettime, clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR, TIMER_ABSTIME};

        let mut deadline = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            clock_gettime(CLOCK_MONOTONIC, &mut deadline);
        }
        let nanos = deadline.tv_nsec as u64 + u64::from(duration.subsec_nanos());
        deadline.tv_sec += (duration.as_secs() + nanos / 1_000_000_000) as libc::time_t;
        deadline.tv_nsec = (nanos % 1_000_000_000) as libc::c_long;

        // Absolute deadline: a signal restart must not stretch the sleep.
        while unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, TIMER_ABSTIME, &deadline, std::ptr::null_mut())
        } == EINTR
        {}
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}
