#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lsci_core::{HardwareError, Instruction, Shape, ToneKind, TrialResult, Turn, VideoHandle};
use lsci_experiment::{
    Audio, AudioCompletion, ControlHandle, Display, FrameSpan, Hardware, Recorder, SessionConfig,
    StatusEvent, TimingSettings, TrialSink,
};
use lsci_core::ExperimentState;
use lsci_timing::{FrameRate, ToneBuffer};

/// 100 Hz, so every test interval is a whole number of 10 ms frames.
pub const PERIOD_NS: u64 = 10_000_000;

pub fn rate() -> FrameRate {
    FrameRate::new(1e9 / PERIOD_NS as f64).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Show(String),
    Clear,
    PrepareTone(ToneKind, u32),
    Tone(ToneKind),
    StopAudio,
    Instruction(Instruction),
    StartRecording(PathBuf),
    StopRecording,
    Discard(PathBuf),
}

pub type Hook = Arc<dyn Fn(usize) + Send + Sync>;
pub type ClipHook = Arc<dyn Fn(Instruction) + Send + Sync>;
pub type ResultHook = Arc<dyn Fn(&TrialResult) + Send + Sync>;

/// Shared fake devices. The display clock advances one period per frame
/// without sleeping.
#[derive(Clone, Default)]
pub struct Rig {
    log: Arc<Mutex<Vec<Call>>>,
    frames: Arc<AtomicU64>,
    /// Called with the 1-based recording count every time recording starts.
    pub on_record_start: Option<Hook>,
    /// Called every time an instruction clip starts playing.
    pub on_instruction: Option<ClipHook>,
    pub fail_recording: bool,
}

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_record_start(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_record_start = Some(Arc::new(hook));
        self
    }

    pub fn on_instruction(mut self, hook: impl Fn(Instruction) + Send + Sync + 'static) -> Self {
        self.on_instruction = Some(Arc::new(hook));
        self
    }

    pub fn failing_recorder(mut self) -> Self {
        self.fail_recording = true;
        self
    }

    pub fn hardware(&self) -> Hardware {
        Hardware {
            display: Box::new(FakeDisplay {
                rig: self.clone(),
                clock_ns: 0,
            }),
            audio: Box::new(FakeAudio { rig: self.clone() }),
            recorder: Box::new(FakeRecorder {
                rig: self.clone(),
                current: None,
                started: 0,
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    fn push(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

struct FakeDisplay {
    rig: Rig,
    clock_ns: u64,
}

impl Display for FakeDisplay {
    fn refresh_rate(&self) -> FrameRate {
        rate()
    }

    fn show(&mut self, shape: &Shape) -> Result<(), HardwareError> {
        self.rig.push(Call::Show(shape.name().to_string()));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), HardwareError> {
        self.rig.push(Call::Clear);
        Ok(())
    }

    fn present_frames(
        &mut self,
        frames: u32,
        on_first_flip: &mut dyn FnMut(u64) -> Result<(), HardwareError>,
    ) -> Result<FrameSpan, HardwareError> {
        let first_ns = self.clock_ns + PERIOD_NS;
        for i in 0..frames {
            self.clock_ns += PERIOD_NS;
            self.rig.frames.fetch_add(1, Ordering::SeqCst);
            if i == 0 {
                on_first_flip(self.clock_ns)?;
            }
        }
        Ok(FrameSpan {
            first_ns,
            last_ns: self.clock_ns,
            end_ns: self.clock_ns + PERIOD_NS,
        })
    }
}

struct FakeAudio {
    rig: Rig,
}

impl Audio for FakeAudio {
    fn prepare_tone(&mut self, kind: ToneKind, buffer: ToneBuffer) -> Result<(), HardwareError> {
        self.rig.push(Call::PrepareTone(kind, buffer.frames));
        Ok(())
    }

    fn play_tone(&mut self, kind: ToneKind) -> Result<(), HardwareError> {
        self.rig.push(Call::Tone(kind));
        Ok(())
    }

    fn play_instruction(&mut self, clip: Instruction) -> Result<AudioCompletion, HardwareError> {
        self.rig.push(Call::Instruction(clip));
        if let Some(hook) = &self.rig.on_instruction {
            hook(clip);
        }
        Ok(AudioCompletion::finished())
    }

    fn stop(&mut self) -> Result<(), HardwareError> {
        self.rig.push(Call::StopAudio);
        Ok(())
    }
}

struct FakeRecorder {
    rig: Rig,
    current: Option<PathBuf>,
    started: usize,
}

impl Recorder for FakeRecorder {
    fn start_recording(&mut self, destination: &Path) -> Result<(), HardwareError> {
        if self.rig.fail_recording {
            return Err(HardwareError::recorder("camera unplugged"));
        }
        self.started += 1;
        self.current = Some(destination.to_path_buf());
        self.rig.push(Call::StartRecording(destination.to_path_buf()));
        if let Some(hook) = &self.rig.on_record_start {
            hook(self.started);
        }
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<VideoHandle, HardwareError> {
        let path = self
            .current
            .take()
            .ok_or_else(|| HardwareError::recorder("not recording"))?;
        self.rig.push(Call::StopRecording);
        Ok(VideoHandle { path, frames: 42 })
    }

    fn is_recording(&self) -> bool {
        self.current.is_some()
    }

    fn discard(&mut self, video: VideoHandle) -> Result<(), HardwareError> {
        self.rig.push(Call::Discard(video.path));
        Ok(())
    }
}

/// Keeps finished trials in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub results: Arc<Mutex<Vec<TrialResult>>>,
    on_record: Option<ResultHook>,
}

impl MemorySink {
    /// Runs `hook` on the engine thread after each result is stored.
    pub fn on_record(mut self, hook: impl Fn(&TrialResult) + Send + Sync + 'static) -> Self {
        self.on_record = Some(Arc::new(hook));
        self
    }
}

impl TrialSink for MemorySink {
    fn destination(&mut self, turn: &Turn) -> PathBuf {
        PathBuf::from(format!(
            "{}/rep{}/{}_{}.lsci",
            turn.subject, turn.session_rep, turn.shape, turn.shape_rep
        ))
    }

    fn record(&mut self, result: &TrialResult) {
        self.results.lock().unwrap().push(result.clone());
        if let Some(hook) = &self.on_record {
            hook(result);
        }
    }
}

/// Short intervals: 3-frame flashes and beeps, 2-frame gaps.
pub fn quick_config(subjects: &[&str], shapes: &[&str]) -> SessionConfig {
    SessionConfig {
        subjects: subjects.iter().map(|s| s.to_string()).collect(),
        shapes: shapes.iter().map(|s| Shape::from(*s)).collect(),
        repetitions: 1,
        shape_reps_per_subsession: 1,
        timing: TimingSettings {
            training_shape_duration: 0.03,
            training_blank_duration: 0.02,
            training_repetitions: 2,
            measurement_beep_duration: 0.03,
            measurement_silence_duration: 0.02,
            measurement_repetitions: 3,
        },
        ..SessionConfig::default()
    }
}

pub fn turn(subject: &str, shape: &str) -> Turn {
    Turn {
        subject: subject.into(),
        shape: Shape::from(shape),
        session_rep: 1,
        shape_rep: 1,
    }
}

/// Drains events until the engine publishes `state`.
pub fn wait_for_state(control: &ControlHandle, state: ExperimentState) -> Vec<StatusEvent> {
    let mut seen = Vec::new();
    loop {
        let event = control
            .events()
            .recv_timeout(Duration::from_secs(10))
            .unwrap_or_else(|_| panic!("timed out waiting for {state}; saw {seen:?}"));
        let reached = event == StatusEvent::StateChanged(state);
        seen.push(event);
        if reached {
            return seen;
        }
    }
}
