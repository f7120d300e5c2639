use lsci_core::{ConfigurationError, Turn};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;

/// Ordered, restartable schedule of turns for one session.
///
/// Subjects advance in lockstep: everyone finishes session repetition `k`
/// before anyone starts `k + 1`. Within one subject's visit (a subsession)
/// each shape is run `shape_reps_per_subsession` times in a row before the
/// next shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionQueue {
    turns: Vec<Turn>,
    cursor: usize,
    per_subsession: usize,
}

/// Serializable cursor, kept so an aborted session can be picked up again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueProgress {
    pub next_turn: usize,
    pub turns: Vec<Turn>,
}

impl SessionQueue {
    pub fn build(config: &SessionConfig) -> Result<Self, ConfigurationError> {
        if config.subjects.is_empty() {
            return Err(ConfigurationError::NoSubjects);
        }
        if config.shapes.is_empty() {
            return Err(ConfigurationError::NoShapes);
        }
        if config.repetitions == 0 {
            return Err(ConfigurationError::ZeroCount {
                field: "repetitions",
            });
        }
        if config.shape_reps_per_subsession == 0 {
            return Err(ConfigurationError::ZeroCount {
                field: "shape_reps_per_subsession",
            });
        }

        let mut turns = Vec::with_capacity(config.total_turns());
        for session_rep in 1..=config.repetitions {
            for subject in &config.subjects {
                for shape in &config.shapes {
                    for shape_rep in 1..=config.shape_reps_per_subsession {
                        turns.push(Turn {
                            subject: subject.clone(),
                            shape: shape.clone(),
                            session_rep,
                            shape_rep,
                        });
                    }
                }
            }
        }

        Ok(Self {
            turns,
            cursor: 0,
            per_subsession: config.turns_per_subsession(),
        })
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn peek(&self) -> Option<&Turn> {
        self.turns.get(self.cursor)
    }

    /// Marks the current turn done and returns the new current turn.
    pub fn advance(&mut self) -> Option<&Turn> {
        if self.cursor < self.turns.len() {
            self.cursor += 1;
        }
        self.peek()
    }

    pub fn total(&self) -> usize {
        self.turns.len()
    }

    pub fn completed_count(&self) -> usize {
        self.cursor
    }

    pub fn remaining_count(&self) -> usize {
        self.turns.len() - self.cursor
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.turns.len()
    }

    pub fn is_last_turn_of_session(&self) -> bool {
        !self.is_complete() && self.cursor + 1 == self.turns.len()
    }

    pub fn is_last_shape_in_current_subsession(&self) -> bool {
        !self.is_complete() && (self.cursor + 1) % self.per_subsession == 0
    }

    /// 1-based position of the current turn within its subsession, and the
    /// subsession length.
    pub fn subsession_position(&self) -> Option<(usize, usize)> {
        self.peek()
            .map(|_| (self.cursor % self.per_subsession + 1, self.per_subsession))
    }

    pub fn restart(&mut self) {
        self.cursor = 0;
    }

    pub fn progress(&self) -> QueueProgress {
        QueueProgress {
            next_turn: self.cursor,
            turns: self.turns.clone(),
        }
    }

    /// Moves the cursor to a saved position. The snapshot must have been
    /// taken from a queue built with the same configuration.
    pub fn restore(&mut self, progress: &QueueProgress) -> Result<(), ConfigurationError> {
        if progress.turns != self.turns {
            return Err(ConfigurationError::ProgressMismatch(format!(
                "snapshot lists {} turns, session schedules {}",
                progress.turns.len(),
                self.turns.len()
            )));
        }
        if progress.next_turn > self.turns.len() {
            return Err(ConfigurationError::ProgressMismatch(format!(
                "cursor {} is past the end of {} turns",
                progress.next_turn,
                self.turns.len()
            )));
        }
        self.cursor = progress.next_turn;
        Ok(())
    }
}
