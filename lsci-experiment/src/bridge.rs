//! Control/status bridge between the operator surface and the engine thread.
//!
//! The engine is the only writer of session state; it publishes the state
//! and progress through atomics and emits [`StatusEvent`]s. The control side
//! validates commands against the published state before posting them, so an
//! invalid command is rejected synchronously without touching the engine.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use lsci_core::{
    Command, Error, ExperimentState, HardwareError, InvalidTransition, StimulusState, TrialPhase,
    TrialResult, Turn,
};
use lsci_timing::{Interrupt, InterruptKind};

#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    StateChanged(ExperimentState),
    PhaseChanged { turn: Turn, phase: TrialPhase },
    Progress { completed: usize, total: usize },
    Stimulus(StimulusState),
    BeepProgress { current: u32, total: u32 },
    TrialFinished(TrialResult),
    CommandRejected(InvalidTransition),
    Error(HardwareError),
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    completed: AtomicUsize,
    total: AtomicUsize,
    interrupt: Interrupt,
}

impl Shared {
    fn state(&self) -> ExperimentState {
        ExperimentState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or_default()
    }
}

/// Engine-side half: publishes state and emits events.
#[derive(Debug)]
pub struct StatusPublisher {
    events: Sender<StatusEvent>,
    shared: Arc<Shared>,
}

/// Control-side half. Cheap to clone; every clone talks to the same engine.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    commands: Sender<Command>,
    events: Receiver<StatusEvent>,
    shared: Arc<Shared>,
}

/// Wires up a bridge for a session of `total_turns` turns, of which
/// `completed` are already done.
pub fn bridge(
    completed: usize,
    total_turns: usize,
) -> (ControlHandle, StatusPublisher, Receiver<Command>) {
    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let shared = Arc::new(Shared {
        state: AtomicU8::new(ExperimentState::Idle as u8),
        completed: AtomicUsize::new(completed),
        total: AtomicUsize::new(total_turns),
        interrupt: Interrupt::new(),
    });
    let control = ControlHandle {
        commands: command_tx,
        events: event_rx,
        shared: Arc::clone(&shared),
    };
    let publisher = StatusPublisher {
        events: event_tx,
        shared,
    };
    (control, publisher, command_rx)
}

impl StatusPublisher {
    pub fn interrupt(&self) -> &Interrupt {
        &self.shared.interrupt
    }

    pub fn state(&self) -> ExperimentState {
        self.shared.state()
    }

    pub fn state_changed(&self, state: ExperimentState) {
        self.shared.state.store(state as u8, Ordering::Release);
        self.send(StatusEvent::StateChanged(state));
    }

    pub fn phase_changed(&self, turn: &Turn, phase: TrialPhase) {
        self.send(StatusEvent::PhaseChanged {
            turn: turn.clone(),
            phase,
        });
    }

    pub fn progress(&self, completed: usize, total: usize) {
        self.shared.completed.store(completed, Ordering::Release);
        self.shared.total.store(total, Ordering::Release);
        self.send(StatusEvent::Progress { completed, total });
    }

    pub fn stimulus(&self, stimulus: StimulusState) {
        self.send(StatusEvent::Stimulus(stimulus));
    }

    pub fn beep_progress(&self, current: u32, total: u32) {
        self.send(StatusEvent::BeepProgress { current, total });
    }

    pub fn trial_finished(&self, result: &TrialResult) {
        self.send(StatusEvent::TrialFinished(result.clone()));
    }

    pub fn rejected(&self, rejection: InvalidTransition) {
        self.send(StatusEvent::CommandRejected(rejection));
    }

    pub fn error(&self, err: &HardwareError) {
        self.send(StatusEvent::Error(err.clone()));
    }

    fn send(&self, event: StatusEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("no status listener left");
        }
    }
}

impl ControlHandle {
    pub fn start(&self) -> Result<(), Error> {
        self.post(Command::Start)
    }

    /// Interrupts the running trial; it is discarded and rerun on resume.
    pub fn pause(&self) -> Result<(), Error> {
        self.post(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), Error> {
        self.post(Command::Resume)
    }

    pub fn confirm_next(&self) -> Result<(), Error> {
        self.post(Command::ConfirmNext)
    }

    /// Aborts the session for good.
    pub fn stop(&self) -> Result<(), Error> {
        self.post(Command::Stop)
    }

    pub fn post(&self, command: Command) -> Result<(), Error> {
        self.shared.state().check(command)?;
        match command {
            Command::Pause => self.shared.interrupt.raise(InterruptKind::Pause),
            Command::Stop => self.shared.interrupt.raise(InterruptKind::Stop),
            _ => {}
        }
        self.commands.send(command).map_err(|_| Error::EngineGone)
    }

    pub fn state(&self) -> ExperimentState {
        self.shared.state()
    }

    /// `(completed, total)` turns.
    pub fn progress(&self) -> (usize, usize) {
        (
            self.shared.completed.load(Ordering::Acquire),
            self.shared.total.load(Ordering::Acquire),
        )
    }

    pub fn events(&self) -> &Receiver<StatusEvent> {
        &self.events
    }
}
