//! Simulated devices for running the engine without stimulus hardware.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, RecvTimeoutError};
use lsci_core::{HardwareError, Instruction, Shape, ToneKind, VideoHandle};
use lsci_experiment::{Audio, AudioCompletion, Display, FrameSpan, Hardware, Recorder};
use lsci_timing::{FrameRate, HighPrecisionTimer, Timer, ToneBuffer};
use rand::rngs::ThreadRng;
use rand::Rng;
use tracing::{debug, info, trace, warn};

use crate::config::{AppConfig, AudioSettings, CameraBackend, CameraSettings, DisplaySettings};

const CALIBRATION_WARMUP: u32 = 10;
const CALIBRATION_FRAMES: u32 = 100;

/// Builds the full device set. Runs on the engine thread.
pub fn open(config: &AppConfig) -> Result<Hardware, HardwareError> {
    let timer = HighPrecisionTimer::new();
    let mut display = SimulatedDisplay::new(timer.clone(), &config.display)?;
    if config.display.calibrate {
        display.calibrate(CALIBRATION_WARMUP, CALIBRATION_FRAMES)?;
    }
    Ok(Hardware {
        display: Box::new(display),
        audio: Box::new(SimulatedAudio::new(&config.audio)),
        recorder: open_recorder(&config.camera, timer),
    })
}

pub fn open_recorder(settings: &CameraSettings, timer: HighPrecisionTimer) -> Box<dyn Recorder> {
    match settings.backend {
        CameraBackend::Simulated => Box::new(SimulatedRecorder::new(timer, settings.target_frame_rate)),
        CameraBackend::Null => Box::new(NullRecorder::default()),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Blank,
    Shape(Shape),
}

/// Vsync-paced display with random flip latency.
pub struct SimulatedDisplay {
    timer: HighPrecisionTimer,
    rate: FrameRate,
    period_ns: u64,
    next_vsync_ns: u64,
    jitter_ns: u64,
    rng: ThreadRng,
    back: Frame,
    visible: Frame,
}

impl SimulatedDisplay {
    pub fn new(timer: HighPrecisionTimer, settings: &DisplaySettings) -> Result<Self, HardwareError> {
        let rate = FrameRate::new(settings.refresh_rate_hz).ok_or_else(|| {
            HardwareError::display(format!("invalid refresh rate {}", settings.refresh_rate_hz))
        })?;
        let period_ns = rate.frame_duration().as_nanos() as u64;
        let next_vsync_ns = timer.now() + period_ns;
        Ok(Self {
            timer,
            rate,
            period_ns,
            next_vsync_ns,
            jitter_ns: settings.jitter_us * 1_000,
            rng: rand::rng(),
            back: Frame::Blank,
            visible: Frame::Blank,
        })
    }

    /// Times a run of blank flips and adopts the measured refresh rate.
    pub fn calibrate(&mut self, warmup: u32, frames: u32) -> Result<FrameRate, HardwareError> {
        self.back = Frame::Blank;
        for _ in 0..warmup {
            self.wait_vsync();
        }
        self.timer.reset_frames();
        let mut last = self.wait_vsync();
        for _ in 0..frames {
            let flip = self.wait_vsync();
            self.timer.record_frame(Duration::from_nanos(flip - last));
            last = flip;
        }
        let stats = self.timer.calibration_stats();
        let rate = stats.refresh_rate();
        info!(
            nominal_hz = self.rate.hz(),
            measured_hz = stats.effective_fps,
            jitter_us = stats.jitter_ns / 1_000.0,
            min_ms = stats.min_frame_time_ns / 1e6,
            max_ms = stats.max_frame_time_ns / 1e6,
            "display calibrated"
        );
        self.rate = rate;
        Ok(rate)
    }

    /// Sleeps until the next vsync plus latency and returns the flip time.
    fn wait_vsync(&mut self) -> u64 {
        let now = self.timer.now();
        if self.next_vsync_ns <= now {
            let missed = (now - self.next_vsync_ns) / self.period_ns + 1;
            debug!(missed, "vsync missed");
            self.next_vsync_ns += missed * self.period_ns;
        }
        let latency = if self.jitter_ns > 0 {
            self.rng.random_range(0..=self.jitter_ns)
        } else {
            0
        };
        let target = self.next_vsync_ns + latency;
        self.timer
            .high_precision_sleep(Duration::from_nanos(target.saturating_sub(self.timer.now())));
        self.next_vsync_ns += self.period_ns;
        self.timer.now()
    }
}

impl Display for SimulatedDisplay {
    fn refresh_rate(&self) -> FrameRate {
        self.rate
    }

    fn show(&mut self, shape: &Shape) -> Result<(), HardwareError> {
        self.back = Frame::Shape(shape.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), HardwareError> {
        self.back = Frame::Blank;
        Ok(())
    }

    fn present_frames(
        &mut self,
        frames: u32,
        on_first_flip: &mut dyn FnMut(u64) -> Result<(), HardwareError>,
    ) -> Result<FrameSpan, HardwareError> {
        if self.visible != self.back {
            trace!(frame = ?self.back, "flip");
            self.visible = self.back.clone();
        }
        let first_ns = self.wait_vsync();
        on_first_flip(first_ns)?;
        let mut last_ns = first_ns;
        for _ in 1..frames {
            last_ns = self.wait_vsync();
        }
        Ok(FrameSpan {
            first_ns,
            last_ns,
            end_ns: self.next_vsync_ns,
        })
    }
}

/// Logs tones and plays instruction clips as timed silence.
pub struct SimulatedAudio {
    training: Option<ToneBuffer>,
    measurement: Option<ToneBuffer>,
    instruction_duration: Duration,
    playing: Option<Arc<AtomicBool>>,
}

impl SimulatedAudio {
    pub fn new(settings: &AudioSettings) -> Self {
        Self {
            training: None,
            measurement: None,
            instruction_duration: settings.instruction_duration(),
            playing: None,
        }
    }

    fn slot(&mut self, kind: ToneKind) -> &mut Option<ToneBuffer> {
        match kind {
            ToneKind::Training => &mut self.training,
            ToneKind::Measurement => &mut self.measurement,
        }
    }
}

impl Audio for SimulatedAudio {
    fn prepare_tone(&mut self, kind: ToneKind, buffer: ToneBuffer) -> Result<(), HardwareError> {
        debug!(
            ?kind,
            samples = buffer.samples,
            duration_ms = buffer.duration.as_secs_f64() * 1e3,
            "tone prepared"
        );
        *self.slot(kind) = Some(buffer);
        Ok(())
    }

    fn play_tone(&mut self, kind: ToneKind) -> Result<(), HardwareError> {
        let buffer = self
            .slot(kind)
            .as_ref()
            .ok_or_else(|| HardwareError::audio(format!("{kind:?} tone was never prepared")))?;
        trace!(?kind, hz = buffer.frequency_hz, frames = buffer.frames, "tone");
        Ok(())
    }

    fn play_instruction(&mut self, clip: Instruction) -> Result<AudioCompletion, HardwareError> {
        self.stop()?;
        let (done, completion) = AudioCompletion::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let duration = self.instruction_duration;
        let flag = Arc::clone(&cancelled);
        thread::Builder::new()
            .name(format!("lsci-clip-{}", clip.clip_id()))
            .spawn(move || {
                let deadline = Instant::now() + duration;
                while Instant::now() < deadline && !flag.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(5));
                }
                let _ = done.send(());
            })
            .map_err(|err| HardwareError::audio(format!("cannot start clip {clip}: {err}")))?;
        debug!(%clip, "instruction playing");
        self.playing = Some(cancelled);
        Ok(completion)
    }

    fn stop(&mut self) -> Result<(), HardwareError> {
        if let Some(playing) = self.playing.take() {
            playing.store(true, Ordering::Release);
        }
        Ok(())
    }
}

struct Capture {
    path: PathBuf,
    stop: Sender<()>,
    thread: JoinHandle<io::Result<u64>>,
}

/// Writes one `index<TAB>timestamp_ns` line per simulated camera frame.
pub struct SimulatedRecorder {
    timer: HighPrecisionTimer,
    frame_period: Duration,
    active: Option<Capture>,
}

impl SimulatedRecorder {
    pub fn new(timer: HighPrecisionTimer, frame_rate: f64) -> Self {
        let frame_period = if frame_rate.is_finite() && frame_rate > 0.0 {
            Duration::from_secs_f64(1.0 / frame_rate)
        } else {
            warn!(frame_rate, "invalid camera frame rate, using 500 Hz");
            Duration::from_millis(2)
        };
        Self {
            timer,
            frame_period,
            active: None,
        }
    }

    fn finish(capture: Capture) -> Result<VideoHandle, HardwareError> {
        let _ = capture.stop.send(());
        let frames = capture
            .thread
            .join()
            .map_err(|_| HardwareError::recorder("capture thread panicked"))?
            .map_err(|err| {
                HardwareError::recorder(format!("writing {}: {err}", capture.path.display()))
            })?;
        Ok(VideoHandle {
            path: capture.path,
            frames,
        })
    }
}

fn capture_loop(
    mut out: BufWriter<File>,
    stop: crossbeam_channel::Receiver<()>,
    timer: HighPrecisionTimer,
    period: Duration,
) -> io::Result<u64> {
    let mut frames = 0u64;
    let mut next = Instant::now();
    loop {
        writeln!(out, "{frames}\t{}", timer.now())?;
        frames += 1;
        next += period;
        match stop.recv_deadline(next) {
            Err(RecvTimeoutError::Timeout) => continue,
            _ => break,
        }
    }
    out.flush()?;
    Ok(frames)
}

impl Recorder for SimulatedRecorder {
    fn start_recording(&mut self, destination: &Path) -> Result<(), HardwareError> {
        if self.active.is_some() {
            return Err(HardwareError::recorder("already recording"));
        }
        let io_err = |err: io::Error| {
            HardwareError::recorder(format!("opening {}: {err}", destination.display()))
        };
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let out = BufWriter::new(File::create(destination).map_err(io_err)?);

        let (stop, stop_rx) = crossbeam_channel::bounded(1);
        let timer = self.timer.clone();
        let period = self.frame_period;
        let thread = thread::Builder::new()
            .name("lsci-capture".into())
            .spawn(move || capture_loop(out, stop_rx, timer, period))
            .map_err(|err| HardwareError::recorder(format!("cannot start capture: {err}")))?;
        info!(path = %destination.display(), "recording started");
        self.active = Some(Capture {
            path: destination.to_path_buf(),
            stop,
            thread,
        });
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<VideoHandle, HardwareError> {
        let capture = self
            .active
            .take()
            .ok_or_else(|| HardwareError::recorder("not recording"))?;
        Self::finish(capture)
    }

    fn is_recording(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for SimulatedRecorder {
    fn drop(&mut self) {
        if let Some(capture) = self.active.take() {
            if let Err(err) = Self::finish(capture) {
                warn!(error = %err, "capture left running at shutdown");
            }
        }
    }
}

/// Recorder that captures nothing.
#[derive(Debug, Default)]
pub struct NullRecorder {
    current: Option<PathBuf>,
}

impl Recorder for NullRecorder {
    fn start_recording(&mut self, destination: &Path) -> Result<(), HardwareError> {
        self.current = Some(destination.to_path_buf());
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<VideoHandle, HardwareError> {
        let path = self
            .current
            .take()
            .ok_or_else(|| HardwareError::recorder("not recording"))?;
        Ok(VideoHandle { path, frames: 0 })
    }

    fn is_recording(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsci_timing::InterruptKind;

    #[test]
    fn test_display_paces_frames() {
        let settings = DisplaySettings {
            refresh_rate_hz: 200.0,
            jitter_us: 0,
            calibrate: false,
        };
        let mut display = SimulatedDisplay::new(HighPrecisionTimer::new(), &settings).unwrap();
        let mut flips = Vec::new();
        let span = display
            .present_frames(4, &mut |ns| {
                flips.push(ns);
                Ok(())
            })
            .unwrap();
        assert_eq!(flips, vec![span.first_ns]);
        // three 5 ms periods between first and last flip, minus scheduler slack
        assert!(span.last_ns - span.first_ns >= 14_000_000);
        assert!(span.end_ns > span.last_ns);
    }

    #[test]
    fn test_hook_error_aborts_presentation() {
        let mut display =
            SimulatedDisplay::new(HighPrecisionTimer::new(), &DisplaySettings::default()).unwrap();
        let err = display
            .present_frames(100, &mut |_| Err(HardwareError::audio("device lost")))
            .unwrap_err();
        assert_eq!(err.device, lsci_core::Device::Audio);
    }

    #[test]
    fn test_unprepared_tone_is_an_error() {
        let mut audio = SimulatedAudio::new(&AudioSettings::default());
        assert!(audio.play_tone(ToneKind::Measurement).is_err());
    }

    #[test]
    fn test_instruction_completes() {
        let mut audio = SimulatedAudio::new(&AudioSettings {
            instruction_duration_ms: 20,
        });
        let completion = audio.play_instruction(Instruction::Starting).unwrap();
        let interrupt = lsci_timing::Interrupt::new();
        assert_eq!(
            completion.wait(&interrupt).unwrap(),
            lsci_experiment::WaitOutcome::Finished
        );

        let completion = audio.play_instruction(Instruction::Starting).unwrap();
        interrupt.raise(InterruptKind::Pause);
        assert_eq!(
            completion.wait(&interrupt).unwrap(),
            lsci_experiment::WaitOutcome::Interrupted(InterruptKind::Pause)
        );
        audio.stop().unwrap();
    }

    #[test]
    fn test_recorder_writes_and_discards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("P01/rep1/circle_1.lsci");
        let mut recorder = SimulatedRecorder::new(HighPrecisionTimer::new(), 500.0);

        recorder.start_recording(&path).unwrap();
        assert!(recorder.is_recording());
        assert!(recorder.start_recording(&path).is_err());
        thread::sleep(Duration::from_millis(20));
        let video = recorder.stop_recording().unwrap();

        assert!(!recorder.is_recording());
        assert!(video.frames >= 1);
        let lines = fs::read_to_string(&path).unwrap().lines().count() as u64;
        assert_eq!(lines, video.frames);

        recorder.discard(video).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_null_recorder() {
        let mut recorder = NullRecorder::default();
        assert!(recorder.stop_recording().is_err());
        recorder.start_recording(Path::new("nowhere.lsci")).unwrap();
        let video = recorder.stop_recording().unwrap();
        assert_eq!(video.frames, 0);
        recorder.discard(video).unwrap();
    }
}
