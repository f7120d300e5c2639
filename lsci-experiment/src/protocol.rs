//! One shape trial, frame by frame.
//!
//! Durations are counted in display refreshes. Audio onsets and the
//! recording start are issued from the display's first-flip hook, so they
//! land on the same refresh as the visual change they belong to. The
//! interrupt flag is sampled before every frame and while waiting for an
//! instruction clip; the frame or clip in flight always finishes first.

use std::path::Path;
use std::time::Duration;

use lsci_core::{
    HardwareError, Instruction, Phase, PhaseMark, RecordingSpan, StimulusState, ToneKind,
    TrialPhase, TrialResult, Turn, VideoHandle,
};
use lsci_timing::{duration_to_frames, FrameRate, Interrupt, InterruptKind, ToneBuffer};
use tracing::{debug, info, warn};

use crate::bridge::StatusPublisher;
use crate::config::{SessionConfig, ToneSettings};
use crate::hardware::{AudioCompletion, FrameSpan, Hardware, WaitOutcome};

pub const PRE_MEASUREMENT_WAIT: Duration = Duration::from_secs(5);
pub const FINAL_WAIT: Duration = Duration::from_secs(2);
pub const OPEN_EYES_HOLD: Duration = Duration::from_secs(5);

/// Frame counts for every timed interval, fixed for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub shape: u32,
    pub blank: u32,
    pub beep: u32,
    pub silence: u32,
    pub pre_measurement_wait: u32,
    pub final_wait: u32,
    pub open_eyes_hold: u32,
    pub training_repetitions: u32,
    pub measurement_repetitions: u32,
}

impl FrameTiming {
    pub fn new(config: &SessionConfig, rate: FrameRate) -> Self {
        let t = &config.timing;
        let timing = Self {
            shape: duration_to_frames(t.training_shape(), rate),
            blank: duration_to_frames(t.training_blank(), rate),
            beep: duration_to_frames(t.measurement_beep(), rate),
            silence: duration_to_frames(t.measurement_silence(), rate),
            pre_measurement_wait: duration_to_frames(PRE_MEASUREMENT_WAIT, rate),
            final_wait: duration_to_frames(FINAL_WAIT, rate),
            open_eyes_hold: duration_to_frames(OPEN_EYES_HOLD, rate),
            training_repetitions: t.training_repetitions,
            measurement_repetitions: t.measurement_repetitions,
        };
        info!(
            %rate,
            shape = timing.shape,
            blank = timing.blank,
            beep = timing.beep,
            silence = timing.silence,
            pre_wait = timing.pre_measurement_wait,
            final_wait = timing.final_wait,
            "frame counts"
        );
        timing
    }

    /// Tone buffer lasting exactly as long as the interval it accompanies.
    pub fn tone_buffer(&self, kind: ToneKind, tone: &ToneSettings, rate: FrameRate) -> ToneBuffer {
        let frames = match kind {
            ToneKind::Training => self.shape,
            ToneKind::Measurement => self.beep,
        };
        ToneBuffer::frame_locked(tone.beep_frequency, tone.beep_volume, frames, rate, tone.sample_rate)
    }

    pub fn beeps_per_trial(&self) -> u32 {
        self.training_repetitions + self.measurement_repetitions
    }
}

/// Where a turn sits in the session; picks the closing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialContext {
    pub is_last_shape: bool,
    pub is_last_turn: bool,
}

impl TrialContext {
    pub fn closing_instruction(&self) -> Instruction {
        Instruction::after_measurement(self.is_last_shape, self.is_last_turn)
    }
}

/// A hardware fault ended the trial. The turn is marked interrupted.
#[derive(Debug, thiserror::Error)]
#[error("trial {} aborted", .result.turn)]
pub struct TrialAborted {
    pub result: TrialResult,
    #[source]
    pub source: HardwareError,
}

enum Abort {
    Interrupted(InterruptKind),
    Hardware(HardwareError),
}

impl From<HardwareError> for Abort {
    fn from(err: HardwareError) -> Self {
        Abort::Hardware(err)
    }
}

type Step<T> = Result<T, Abort>;

/// What to trigger on the first flip of a presentation.
enum OnFlip<'p> {
    Nothing,
    Tone(ToneKind),
    Silence,
    Instruction(Instruction),
    StartRecording(&'p Path),
}

struct Presented {
    span: FrameSpan,
    completion: Option<AudioCompletion>,
}

pub struct TrialProtocol<'a> {
    turn: &'a Turn,
    timing: &'a FrameTiming,
    hardware: &'a mut Hardware,
    interrupt: &'a Interrupt,
    status: &'a StatusPublisher,
    phases: Vec<PhaseMark>,
    beeps: u32,
    recorded: Option<VideoHandle>,
}

impl<'a> TrialProtocol<'a> {
    pub fn new(
        turn: &'a Turn,
        timing: &'a FrameTiming,
        hardware: &'a mut Hardware,
        interrupt: &'a Interrupt,
        status: &'a StatusPublisher,
    ) -> Self {
        Self {
            turn,
            timing,
            hardware,
            interrupt,
            status,
            phases: Vec::with_capacity(7),
            beeps: 0,
            recorded: None,
        }
    }

    /// Runs every phase of the turn.
    ///
    /// A pause or stop yields an `Interrupted` result; a device fault yields
    /// [`TrialAborted`]. In both cases audio is silenced and the turn's
    /// recording, whether still running or already stopped, is discarded
    /// before returning.
    pub fn run(mut self, context: TrialContext, destination: &Path) -> Result<TrialResult, TrialAborted> {
        info!(turn = %self.turn, "trial started");
        match self.run_phases(context, destination) {
            Ok(recording) => {
                let Some(video) = self.recorded.take() else {
                    let source = HardwareError::recorder("measurement left no recording");
                    self.abandon();
                    return Err(TrialAborted {
                        result: TrialResult::interrupted(self.turn.clone(), self.phases),
                        source,
                    });
                };
                self.status.stimulus(StimulusState::Idle);
                info!(turn = %self.turn, frames = video.frames, "trial completed");
                Ok(TrialResult::completed(self.turn.clone(), video, recording, self.phases))
            }
            Err(Abort::Interrupted(kind)) => {
                info!(turn = %self.turn, ?kind, "trial interrupted");
                self.abandon();
                Ok(TrialResult::interrupted(self.turn.clone(), self.phases))
            }
            Err(Abort::Hardware(source)) => {
                tracing::error!(turn = %self.turn, error = %source, "trial aborted");
                self.abandon();
                Err(TrialAborted {
                    result: TrialResult::interrupted(self.turn.clone(), self.phases),
                    source,
                })
            }
        }
    }

    fn run_phases(&mut self, context: TrialContext, destination: &Path) -> Step<RecordingSpan> {
        let mut span = None;
        for phase in TrialPhase::sequence() {
            self.check_interrupt()?;
            self.status.phase_changed(self.turn, phase);
            debug!(turn = %self.turn, %phase, recording = phase.is_recording(), "phase");
            match phase {
                TrialPhase::Training => self.training()?,
                TrialPhase::CloseEyesInstruction => {
                    self.instruction(phase, Instruction::CloseYourEyes)?
                }
                TrialPhase::PreMeasurementWait => {
                    self.blank_hold(phase, self.timing.pre_measurement_wait)?
                }
                TrialPhase::StartingInstruction => self.instruction(phase, Instruction::Starting)?,
                TrialPhase::FinalWait => self.blank_hold(phase, self.timing.final_wait)?,
                TrialPhase::Measurement => span = Some(self.measurement(destination)?),
                TrialPhase::PostMeasurementInstruction => self.post_measurement(phase, context)?,
            }
        }
        // The sequence always contains Measurement.
        span.ok_or_else(|| Abort::Hardware(HardwareError::recorder("measurement never ran")))
    }

    fn training(&mut self) -> Step<()> {
        let phase = TrialPhase::Training;
        for rep in 1..=self.timing.training_repetitions {
            self.check_interrupt()?;
            self.hardware.display.show(&self.turn.shape)?;
            self.status.stimulus(StimulusState::Shape(self.turn.shape.clone()));
            self.present(phase, self.timing.shape, OnFlip::Tone(ToneKind::Training))?;
            self.count_beep();

            self.check_interrupt()?;
            self.hardware.display.clear()?;
            self.status.stimulus(StimulusState::Blank);
            self.present(phase, self.timing.blank, OnFlip::Silence)?;
            debug!(turn = %self.turn, rep, "training flash");
        }
        Ok(())
    }

    fn instruction(&mut self, phase: TrialPhase, clip: Instruction) -> Step<()> {
        self.hardware.display.clear()?;
        self.status.stimulus(StimulusState::Instruction(clip));
        let presented = self.present(phase, 1, OnFlip::Instruction(clip))?;
        let completion = presented
            .completion
            .ok_or_else(|| HardwareError::audio("instruction started without completion signal"))?;
        match completion.wait(self.interrupt)? {
            WaitOutcome::Finished => Ok(()),
            WaitOutcome::Interrupted(kind) => Err(Abort::Interrupted(kind)),
        }
    }

    fn blank_hold(&mut self, phase: TrialPhase, frames: u32) -> Step<()> {
        self.hardware.display.clear()?;
        self.status.stimulus(StimulusState::Blank);
        self.present(phase, frames, OnFlip::Nothing)?;
        Ok(())
    }

    /// Records the beeps. The stopped video is held until the trial ends so
    /// an interrupt during the closing instruction still discards it.
    fn measurement(&mut self, destination: &Path) -> Step<RecordingSpan> {
        let phase = TrialPhase::Measurement;
        self.hardware.display.clear()?;
        self.status.stimulus(StimulusState::Recording);

        let mut start_ns = None;
        let mut last_silence = None;
        for rep in 1..=self.timing.measurement_repetitions {
            self.check_interrupt()?;
            let on_flip = if rep == 1 {
                OnFlip::StartRecording(destination)
            } else {
                OnFlip::Tone(ToneKind::Measurement)
            };
            let beep = self.present(phase, self.timing.beep, on_flip)?.span;
            start_ns.get_or_insert(beep.first_ns);
            self.count_beep();

            self.check_interrupt()?;
            let silence = self.present(phase, self.timing.silence, OnFlip::Silence)?.span;
            last_silence = Some(silence);
            debug!(turn = %self.turn, rep, onset_ns = beep.first_ns, "measurement beep");
        }

        let video = self.hardware.recorder.stop_recording()?;
        let video = self.recorded.insert(video);
        let (Some(start_ns), Some(silence)) = (start_ns, last_silence) else {
            return Err(Abort::Hardware(HardwareError::recorder(
                "measurement finished without a beep",
            )));
        };
        let span = RecordingSpan {
            start_ns,
            last_beep_offset_ns: silence.first_ns,
            stop_ns: silence.end_ns,
        };
        info!(
            turn = %self.turn,
            path = %video.path.display(),
            frames = video.frames,
            duration_ms = (span.stop_ns - span.start_ns) / 1_000_000,
            "recording stopped"
        );
        Ok(span)
    }

    fn post_measurement(&mut self, phase: TrialPhase, context: TrialContext) -> Step<()> {
        let clip = context.closing_instruction();
        self.instruction(phase, clip)?;
        if clip == Instruction::OpenYourEyes {
            self.check_interrupt()?;
            self.blank_hold(phase, self.timing.open_eyes_hold)?;
        }
        Ok(())
    }

    /// Presents `frames` refreshes, one at a time so an interrupt is noticed
    /// between any two frames.
    fn present(&mut self, phase: TrialPhase, frames: u32, on_flip: OnFlip<'_>) -> Step<Presented> {
        let Hardware {
            display,
            audio,
            recorder,
        } = &mut *self.hardware;

        let mut completion = None;
        let first = display.present_frames(1, &mut |_flip_ns: u64| -> Result<(), HardwareError> {
            match &on_flip {
                OnFlip::Nothing => {}
                OnFlip::Tone(kind) => audio.play_tone(*kind)?,
                OnFlip::Silence => audio.stop()?,
                OnFlip::Instruction(clip) => completion = Some(audio.play_instruction(*clip)?),
                OnFlip::StartRecording(destination) => {
                    recorder.start_recording(destination)?;
                    audio.play_tone(ToneKind::Measurement)?;
                }
            }
            Ok(())
        })?;
        self.mark(phase, first.first_ns);

        let mut span = first;
        for _ in 1..frames {
            self.check_interrupt()?;
            let next = self.hardware.display.present_frames(1, &mut |_| Ok(()))?;
            span.last_ns = next.last_ns;
            span.end_ns = next.end_ns;
        }
        Ok(Presented { span, completion })
    }

    fn mark(&mut self, phase: TrialPhase, onset_ns: u64) {
        if self.phases.last().map(|mark| mark.phase) != Some(phase) {
            self.phases.push(PhaseMark { phase, onset_ns });
        }
    }

    fn count_beep(&mut self) {
        self.beeps += 1;
        self.status
            .beep_progress(self.beeps, self.timing.beeps_per_trial());
    }

    fn check_interrupt(&self) -> Step<()> {
        match self.interrupt.current() {
            Some(kind) => Err(Abort::Interrupted(kind)),
            None => Ok(()),
        }
    }

    /// Leaves the devices idle: audio silent, recorder stopped, the turn's
    /// recording deleted, screen blank.
    fn abandon(&mut self) {
        let hw = &mut *self.hardware;
        if let Err(err) = hw.audio.stop() {
            warn!(error = %err, "could not silence audio");
        }
        let mut video = self.recorded.take();
        if hw.recorder.is_recording() {
            match hw.recorder.stop_recording() {
                Ok(partial) => video = Some(partial),
                Err(err) => warn!(error = %err, "recorder did not stop cleanly"),
            }
        }
        if let Some(video) = video {
            info!(path = %video.path.display(), "discarding interrupted recording");
            if let Err(err) = hw.recorder.discard(video) {
                warn!(error = %err, "could not discard interrupted recording");
            }
        }
        if let Err(err) = hw.display.clear() {
            warn!(error = %err, "could not blank display");
        }
        self.status.stimulus(StimulusState::Idle);
    }
}
