use std::fs;
use std::io::{self, BufRead};
use std::thread;

use anyhow::{Context, Result};
use lsci_core::{Command, ExperimentState};
use lsci_experiment::{
    ControlHandle, EngineReport, ExperimentEngine, QueueProgress, StatusEvent,
};
use tracing::{info, warn};

use crate::backends;
use crate::config::AppConfig;
use crate::sink::JsonlSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Start immediately and confirm every subsession boundary.
    pub unattended: bool,
    /// Continue from the progress file left by an earlier run.
    pub resume: bool,
}

/// Operator console: commands on stdin, status on stdout.
pub struct App {
    config: AppConfig,
    options: RunOptions,
}

impl App {
    pub fn new(config: AppConfig, options: RunOptions) -> Self {
        Self { config, options }
    }

    pub fn run(self) -> Result<()> {
        let mut engine = ExperimentEngine::new(self.config.session.clone())
            .context("invalid session configuration")?;
        if self.options.resume {
            if let Some(saved) = self.load_progress()? {
                engine = engine
                    .with_progress(&saved)
                    .context("progress file does not match this session")?;
            }
        }

        let per_trial = engine.config().estimated_trial_duration();
        let sink = JsonlSink::create(&self.config.output_dir, &self.config.trial_log_path())?;
        let settings = self.config.clone();
        let handle = engine.spawn(move || backends::open(&settings), Box::new(sink))?;
        let control = handle.control().clone();

        println!("=== LSCI IMAGERY EXPERIMENT ===");
        println!("Platform: {}", std::env::consts::OS);
        let (done, total) = control.progress();
        println!("Turns: {done}/{total} done");
        println!(
            "Per trial: ~{:.0} s of flashes and beeps plus instructions",
            per_trial.as_secs_f64()
        );
        println!("Output: {}", self.config.output_dir.display());

        if self.options.unattended {
            control.start()?;
        } else {
            println!("Commands: start | pause | resume | next | stop\n");
            spawn_console(control.clone())?;
        }

        for event in control.events().iter() {
            self.show(&event);
            if self.options.unattended
                && event == StatusEvent::StateChanged(ExperimentState::AwaitingConfirmNext)
            {
                control.confirm_next()?;
            }
        }

        let report = handle.join()?;
        self.save_progress(&report)?;
        summarize(&report);
        Ok(())
    }

    fn show(&self, event: &StatusEvent) {
        match event {
            StatusEvent::StateChanged(state) => println!("[state] {state}"),
            StatusEvent::PhaseChanged { turn, phase } => println!("[phase] {turn} | {phase}"),
            StatusEvent::Progress { completed, total } => {
                println!("[progress] {completed}/{total}")
            }
            StatusEvent::TrialFinished(result) => {
                println!("[trial] {} {:?}", result.turn, result.status)
            }
            StatusEvent::CommandRejected(rejection) => println!("[rejected] {rejection}"),
            StatusEvent::Error(err) => println!("[error] {err}"),
            StatusEvent::Stimulus(_) | StatusEvent::BeepProgress { .. } => {}
        }
    }

    fn load_progress(&self) -> Result<Option<QueueProgress>> {
        let path = self.config.progress_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let progress = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "resuming from saved progress");
        Ok(Some(progress))
    }

    /// Keeps the cursor of an unfinished session; removes it once done.
    fn save_progress(&self, report: &EngineReport) -> Result<()> {
        let path = self.config.progress_path();
        if report.state == ExperimentState::Completed {
            if path.exists() {
                fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
            }
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&report.progress)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "progress saved");
        Ok(())
    }
}

fn summarize(report: &EngineReport) {
    println!("\n=== SESSION {} ===", report.state.to_string().to_uppercase());
    println!(
        "Trials: {} completed, {} interrupted",
        report.completed_trials(),
        report.results.len() - report.completed_trials()
    );
    println!(
        "Turns done: {}/{}",
        report.progress.next_turn,
        report.progress.turns.len()
    );
    if let Some(err) = &report.error {
        println!("Halted by: {err}");
    }
}

pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "start" | "s" => Some(Command::Start),
        "pause" | "p" => Some(Command::Pause),
        "resume" | "r" => Some(Command::Resume),
        "next" | "n" | "confirm" => Some(Command::ConfirmNext),
        "stop" | "q" | "quit" => Some(Command::Stop),
        _ => None,
    }
}

/// Reads operator commands until stdin closes or the engine goes away.
fn spawn_console(control: ControlHandle) -> io::Result<()> {
    thread::Builder::new()
        .name("lsci-console".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let Some(command) = parse_command(&line) else {
                    println!("unknown command: {}", line.trim());
                    continue;
                };
                match control.post(command) {
                    Ok(()) => {}
                    Err(lsci_core::Error::EngineGone) => break,
                    Err(err) => println!("[rejected] {err}"),
                }
            }
            if !control.state().is_terminal() {
                warn!("console closed, stopping session");
                let _ = control.stop();
            }
        })?;
    Ok(())
}
