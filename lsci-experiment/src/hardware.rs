//! Contracts for the stimulus, audio and capture devices the engine drives.
//!
//! Display and audio are created on the engine thread and never leave it, so
//! neither trait requires `Send`. Implementations report device faults as
//! [`HardwareError`]; the engine never retries them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use lsci_core::{HardwareError, Instruction, Shape, ToneKind, TrialResult, Turn, VideoHandle};
use lsci_timing::{FrameRate, Interrupt, InterruptKind, ToneBuffer};

/// How often a pending audio wait re-checks the interrupt flag.
const COMPLETION_POLL: Duration = Duration::from_millis(2);

/// Flip timestamps of a presented run of frames, in nanoseconds on the
/// display clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpan {
    /// First frame became visible.
    pub first_ns: u64,
    /// Last frame became visible.
    pub last_ns: u64,
    /// Refresh that ended the last frame.
    pub end_ns: u64,
}

pub trait Display {
    fn refresh_rate(&self) -> FrameRate;

    /// Draws `shape` into the back buffer. Nothing is visible until the next
    /// presentation.
    fn show(&mut self, shape: &Shape) -> Result<(), HardwareError>;

    /// Replaces the back buffer with a blank screen.
    fn clear(&mut self) -> Result<(), HardwareError>;

    /// Presents the back buffer for exactly `frames` refreshes and blocks
    /// until they have elapsed.
    ///
    /// `on_first_flip` runs immediately after the first frame becomes visible
    /// and receives its timestamp; an error from it aborts the presentation
    /// and is returned unchanged.
    fn present_frames(
        &mut self,
        frames: u32,
        on_first_flip: &mut dyn FnMut(u64) -> Result<(), HardwareError>,
    ) -> Result<FrameSpan, HardwareError>;
}

pub trait Audio {
    /// Installs a pre-generated tone. Called once per session per kind.
    fn prepare_tone(&mut self, kind: ToneKind, buffer: ToneBuffer) -> Result<(), HardwareError>;

    /// Starts a prepared tone; it ends on its own after its buffer length.
    fn play_tone(&mut self, kind: ToneKind) -> Result<(), HardwareError>;

    fn play_instruction(&mut self, clip: Instruction) -> Result<AudioCompletion, HardwareError>;

    /// Silences everything, including an instruction in progress.
    fn stop(&mut self) -> Result<(), HardwareError>;
}

pub trait Recorder {
    fn start_recording(&mut self, destination: &Path) -> Result<(), HardwareError>;

    fn stop_recording(&mut self) -> Result<VideoHandle, HardwareError>;

    fn is_recording(&self) -> bool;

    /// Deletes a recording that must not be kept. A missing file is not an
    /// error.
    fn discard(&mut self, video: VideoHandle) -> Result<(), HardwareError> {
        match std::fs::remove_file(&video.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(HardwareError::recorder(format!(
                "could not delete {}: {err}",
                video.path.display()
            ))),
        }
    }
}

/// Logging collaborator: names recording files and receives finished trials.
pub trait TrialSink: Send {
    fn destination(&mut self, turn: &Turn) -> PathBuf;

    fn record(&mut self, result: &TrialResult);
}

/// The devices one session runs against.
pub struct Hardware {
    pub display: Box<dyn Display>,
    pub audio: Box<dyn Audio>,
    pub recorder: Box<dyn Recorder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Finished,
    Interrupted(InterruptKind),
}

/// Signal that an instruction clip has played to its end.
#[derive(Debug)]
pub struct AudioCompletion(Receiver<()>);

impl AudioCompletion {
    /// The audio side keeps the sender and sends once when playback ends.
    pub fn channel() -> (Sender<()>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (tx, Self(rx))
    }

    pub fn finished() -> Self {
        let (tx, completion) = Self::channel();
        let _ = tx.send(());
        completion
    }

    /// Blocks until playback finishes or an interrupt is raised.
    ///
    /// There is no timeout: a device that never finishes blocks the caller
    /// until someone pauses or stops.
    pub fn wait(&self, interrupt: &Interrupt) -> Result<WaitOutcome, HardwareError> {
        loop {
            if let Some(kind) = interrupt.current() {
                return Ok(WaitOutcome::Interrupted(kind));
            }
            match self.0.recv_timeout(COMPLETION_POLL) {
                Ok(()) => return Ok(WaitOutcome::Finished),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(HardwareError::audio(
                        "instruction playback ended without completing",
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    struct NullRecorder;

    impl Recorder for NullRecorder {
        fn start_recording(&mut self, _: &Path) -> Result<(), HardwareError> {
            Ok(())
        }
        fn stop_recording(&mut self) -> Result<VideoHandle, HardwareError> {
            Err(HardwareError::recorder("never started"))
        }
        fn is_recording(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_finished_completion_returns_at_once() {
        let interrupt = Interrupt::new();
        let outcome = AudioCompletion::finished().wait(&interrupt).unwrap();
        assert_eq!(outcome, WaitOutcome::Finished);
    }

    #[test]
    fn test_wait_races_interrupt() {
        let interrupt = Arc::new(Interrupt::new());
        let (_tx, completion) = AudioCompletion::channel();
        let raiser = {
            let interrupt = Arc::clone(&interrupt);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                interrupt.raise(InterruptKind::Stop);
            })
        };
        let outcome = completion.wait(&interrupt).unwrap();
        raiser.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Interrupted(InterruptKind::Stop));
    }

    #[test]
    fn test_dropped_sender_is_a_device_error() {
        let (tx, completion) = AudioCompletion::channel();
        drop(tx);
        let err = completion.wait(&Interrupt::new()).unwrap_err();
        assert_eq!(err.device, lsci_core::Device::Audio);
    }

    #[test]
    fn test_default_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.lsci");
        std::fs::write(&path, b"frames").unwrap();

        let mut recorder = NullRecorder;
        let video = VideoHandle {
            path: path.clone(),
            frames: 1,
        };
        recorder.discard(video.clone()).unwrap();
        assert!(!path.exists());
        // already gone
        recorder.discard(video).unwrap();
    }
}
