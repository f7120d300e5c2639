use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered, linear phases of a trial
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn next(&self) -> Option<Self>;

    fn is_recording(&self) -> bool {
        false
    }

    /// Every phase from the default (first) one to the last, in order.
    fn sequence() -> std::iter::Successors<Self, fn(&Self) -> Option<Self>> {
        std::iter::successors(Some(Self::default()), Self::next as fn(&Self) -> Option<Self>)
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    #[default]
    Training,
    CloseEyesInstruction,
    PreMeasurementWait,
    StartingInstruction,
    FinalWait,
    Measurement,
    PostMeasurementInstruction,
}

impl TrialPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::CloseEyesInstruction => "close eyes instruction",
            Self::PreMeasurementWait => "pre-measurement wait",
            Self::StartingInstruction => "starting instruction",
            Self::FinalWait => "final wait",
            Self::Measurement => "measurement",
            Self::PostMeasurementInstruction => "post-measurement instruction",
        }
    }
}

impl Phase for TrialPhase {
    fn next(&self) -> Option<Self> {
        use TrialPhase::*;
        Some(match self {
            Training => CloseEyesInstruction,
            CloseEyesInstruction => PreMeasurementWait,
            PreMeasurementWait => StartingInstruction,
            StartingInstruction => FinalWait,
            FinalWait => Measurement,
            Measurement => PostMeasurementInstruction,
            PostMeasurementInstruction => return None,
        })
    }

    fn is_recording(&self) -> bool {
        matches!(self, Self::Measurement)
    }
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
