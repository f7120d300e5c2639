//! Session orchestration on a dedicated engine thread.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use lsci_core::{
    Command, ConfigurationError, Error, ExperimentState, HardwareError, InvalidTransition,
    ToneKind, TrialResult,
};
use lsci_timing::InterruptKind;
use tracing::{debug, error, info, warn};

use crate::bridge::{bridge, ControlHandle, StatusPublisher};
use crate::config::SessionConfig;
use crate::hardware::{Hardware, TrialSink};
use crate::protocol::{FrameTiming, TrialContext, TrialProtocol};
use crate::queue::{QueueProgress, SessionQueue};

/// A validated session, ready to run.
#[derive(Debug, Clone)]
pub struct ExperimentEngine {
    config: SessionConfig,
    queue: SessionQueue,
}

/// What a finished engine thread hands back.
#[derive(Debug)]
pub struct EngineReport {
    pub state: ExperimentState,
    pub results: Vec<TrialResult>,
    pub error: Option<HardwareError>,
    /// Cursor for resuming the session later.
    pub progress: QueueProgress,
}

impl EngineReport {
    pub fn completed_trials(&self) -> usize {
        self.results.iter().filter(|r| r.is_completed()).count()
    }
}

pub struct EngineHandle {
    control: ControlHandle,
    thread: JoinHandle<EngineReport>,
}

impl EngineHandle {
    pub fn control(&self) -> &ControlHandle {
        &self.control
    }

    /// Waits for the session to reach a terminal state.
    pub fn join(self) -> Result<EngineReport, Error> {
        self.thread.join().map_err(|_| Error::EngineGone)
    }
}

impl ExperimentEngine {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let queue = SessionQueue::build(&config)?;
        info!(
            subjects = config.subjects.len(),
            shapes = config.shapes.len(),
            turns = queue.total(),
            "session scheduled"
        );
        Ok(Self { config, queue })
    }

    /// Skips the turns a previous run already completed.
    pub fn with_progress(mut self, progress: &QueueProgress) -> Result<Self, ConfigurationError> {
        self.queue.restore(progress)?;
        info!(
            completed = self.queue.completed_count(),
            remaining = self.queue.remaining_count(),
            "session restored"
        );
        Ok(self)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn queue(&self) -> &SessionQueue {
        &self.queue
    }

    /// Starts the engine thread in `Idle`.
    ///
    /// `open_hardware` runs on the engine thread once `Start` arrives, so the
    /// devices never cross threads.
    pub fn spawn<F>(self, open_hardware: F, sink: Box<dyn TrialSink>) -> io::Result<EngineHandle>
    where
        F: FnOnce() -> Result<Hardware, HardwareError> + Send + 'static,
    {
        let (control, status, commands) =
            bridge(self.queue.completed_count(), self.queue.total());
        let worker = Worker {
            config: self.config,
            queue: self.queue,
            status,
            commands,
            sink,
            results: Vec::new(),
        };
        let thread = thread::Builder::new()
            .name("lsci-engine".into())
            .spawn(move || worker.run(open_hardware))?;
        Ok(EngineHandle { control, thread })
    }
}

struct Worker {
    config: SessionConfig,
    queue: SessionQueue,
    status: StatusPublisher,
    commands: Receiver<Command>,
    sink: Box<dyn TrialSink>,
    results: Vec<TrialResult>,
}

impl Worker {
    fn run<F>(mut self, open_hardware: F) -> EngineReport
    where
        F: FnOnce() -> Result<Hardware, HardwareError>,
    {
        let (state, error) = match self.session(open_hardware) {
            Ok(state) => (state, None),
            Err(err) => {
                error!(error = %err, "session halted by hardware failure");
                self.status.error(&err);
                (ExperimentState::Stopped, Some(err))
            }
        };
        self.set_state(state);
        info!(
            %state,
            completed = self.queue.completed_count(),
            total = self.queue.total(),
            "session finished"
        );
        EngineReport {
            state,
            results: self.results,
            error,
            progress: self.queue.progress(),
        }
    }

    fn session<F>(&mut self, open_hardware: F) -> Result<ExperimentState, HardwareError>
    where
        F: FnOnce() -> Result<Hardware, HardwareError>,
    {
        if self.await_command(&[Command::Start]) == Command::Stop {
            return Ok(ExperimentState::Stopped);
        }
        self.set_state(ExperimentState::Running);

        let mut hardware = open_hardware()?;
        let rate = hardware.display.refresh_rate();
        let timing = FrameTiming::new(&self.config, rate);
        for kind in [ToneKind::Training, ToneKind::Measurement] {
            let buffer = timing.tone_buffer(kind, &self.config.tone, rate);
            hardware.audio.prepare_tone(kind, buffer)?;
        }
        self.publish_progress();

        while let Some(turn) = self.queue.peek().cloned() {
            if let Some(kind) = self.status.interrupt().current() {
                if !self.hold(kind) {
                    return Ok(ExperimentState::Stopped);
                }
            }

            let context = TrialContext {
                is_last_shape: self.queue.is_last_shape_in_current_subsession(),
                is_last_turn: self.queue.is_last_turn_of_session(),
            };
            if let Some((position, length)) = self.queue.subsession_position() {
                debug!(%turn, position, length, "subsession turn");
            }
            let destination = self.sink.destination(&turn);
            let outcome = TrialProtocol::new(
                &turn,
                &timing,
                &mut hardware,
                self.status.interrupt(),
                &self.status,
            )
            .run(context, &destination);

            match outcome {
                Ok(result) if result.is_completed() => {
                    self.finish(result);
                    self.queue.advance();
                    self.publish_progress();
                    if context.is_last_shape && !self.queue.is_complete() && !self.confirm_next() {
                        return Ok(ExperimentState::Stopped);
                    }
                }
                Ok(result) => {
                    self.finish(result);
                    let kind = self
                        .status
                        .interrupt()
                        .current()
                        .unwrap_or(InterruptKind::Stop);
                    // The same turn is rerun from training after a resume.
                    if !self.hold(kind) {
                        return Ok(ExperimentState::Stopped);
                    }
                }
                Err(aborted) => {
                    self.finish(aborted.result);
                    return Err(aborted.source);
                }
            }
        }
        Ok(ExperimentState::Completed)
    }

    /// Waits out a pause. Returns false when the session must stop.
    fn hold(&mut self, kind: InterruptKind) -> bool {
        if kind == InterruptKind::Stop {
            return false;
        }
        self.set_state(ExperimentState::Paused);
        match self.await_command(&[Command::Resume]) {
            Command::Resume => {
                self.status.interrupt().clear_pause();
                self.set_state(ExperimentState::Running);
                true
            }
            _ => false,
        }
    }

    /// Subsession boundary: the operator swaps subjects, then confirms.
    fn confirm_next(&mut self) -> bool {
        if let Some(next) = self.queue.peek() {
            info!(next = %next, "subsession finished, waiting for next participant");
        }
        self.set_state(ExperimentState::AwaitingConfirmNext);
        match self.await_command(&[Command::ConfirmNext]) {
            Command::ConfirmNext => {
                self.set_state(ExperimentState::Running);
                true
            }
            _ => false,
        }
    }

    /// Blocks for one of `accepted` or `Stop`. Anything else is rejected and
    /// the wait continues. A vanished control surface counts as `Stop`.
    fn await_command(&mut self, accepted: &[Command]) -> Command {
        loop {
            let Ok(command) = self.commands.recv() else {
                warn!("control surface disconnected, stopping");
                return Command::Stop;
            };
            if command == Command::Stop || accepted.contains(&command) {
                debug!(%command, "command accepted");
                return command;
            }
            let state = self.status.state();
            if command == Command::Pause && state == ExperimentState::Paused {
                // Already honoured by the interrupt.
                continue;
            }
            if command == Command::Pause {
                self.status.interrupt().clear_pause();
            }
            let rejection = InvalidTransition { command, state };
            warn!(%rejection, "command rejected");
            self.status.rejected(rejection);
        }
    }

    fn finish(&mut self, result: TrialResult) {
        self.sink.record(&result);
        self.status.trial_finished(&result);
        self.results.push(result);
    }

    fn publish_progress(&self) {
        self.status
            .progress(self.queue.completed_count(), self.queue.total());
    }

    fn set_state(&self, state: ExperimentState) {
        if self.status.state() != state {
            info!(%state, "state changed");
        }
        self.status.state_changed(state);
    }
}
