use std::collections::HashSet;
use std::time::Duration;

use lsci_core::{ConfigurationError, Shape};
use serde::{Deserialize, Serialize};

/// Trial timing parameters, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub training_shape_duration: f64,
    pub training_blank_duration: f64,
    pub training_repetitions: u32,
    pub measurement_beep_duration: f64,
    pub measurement_silence_duration: f64,
    pub measurement_repetitions: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            training_shape_duration: 1.5,
            training_blank_duration: 0.5,
            training_repetitions: 5,
            measurement_beep_duration: 1.5,
            measurement_silence_duration: 0.5,
            measurement_repetitions: 5,
        }
    }
}

impl TimingSettings {
    pub fn training_shape(&self) -> Duration {
        Duration::from_secs_f64(self.training_shape_duration)
    }

    pub fn training_blank(&self) -> Duration {
        Duration::from_secs_f64(self.training_blank_duration)
    }

    pub fn measurement_beep(&self) -> Duration {
        Duration::from_secs_f64(self.measurement_beep_duration)
    }

    pub fn measurement_silence(&self) -> Duration {
        Duration::from_secs_f64(self.measurement_silence_duration)
    }

    pub fn training_phase_duration(&self) -> Duration {
        (self.training_shape() + self.training_blank()) * self.training_repetitions
    }

    pub fn measurement_phase_duration(&self) -> Duration {
        (self.measurement_beep() + self.measurement_silence()) * self.measurement_repetitions
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let durations = [
            ("training_shape_duration", self.training_shape_duration),
            ("training_blank_duration", self.training_blank_duration),
            ("measurement_beep_duration", self.measurement_beep_duration),
            ("measurement_silence_duration", self.measurement_silence_duration),
        ];
        for (field, value) in durations {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::NonPositiveDuration { field, value });
            }
        }
        if self.training_repetitions == 0 {
            return Err(ConfigurationError::ZeroCount {
                field: "training_repetitions",
            });
        }
        if self.measurement_repetitions == 0 {
            return Err(ConfigurationError::ZeroCount {
                field: "measurement_repetitions",
            });
        }
        Ok(())
    }
}

/// Beep synthesis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneSettings {
    pub beep_frequency: f64,
    pub beep_volume: f32,
    pub sample_rate: u32,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            beep_frequency: 440.0,
            beep_volume: 0.5,
            sample_rate: 44_100,
        }
    }
}

impl ToneSettings {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.beep_frequency.is_finite() && self.beep_frequency > 0.0) {
            return Err(ConfigurationError::OutOfRange {
                field: "tone.beep_frequency",
                value: self.beep_frequency,
                expected: "a positive frequency in Hz",
            });
        }
        if !(0.0..=1.0).contains(&self.beep_volume) {
            return Err(ConfigurationError::OutOfRange {
                field: "tone.beep_volume",
                value: f64::from(self.beep_volume),
                expected: "between 0 and 1",
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigurationError::ZeroCount {
                field: "tone.sample_rate",
            });
        }
        Ok(())
    }
}

/// Everything the engine needs to schedule and time a session.
/// Read-only once the engine is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub subjects: Vec<String>,
    pub shapes: Vec<Shape>,
    pub repetitions: u32,
    pub shape_reps_per_subsession: u32,
    pub timing: TimingSettings,
    pub tone: ToneSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subjects: Vec::new(),
            shapes: ["circle", "square", "triangle", "star"]
                .into_iter()
                .map(Shape::from)
                .collect(),
            repetitions: 5,
            shape_reps_per_subsession: 1,
            timing: TimingSettings::default(),
            tone: ToneSettings::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.subjects.is_empty() {
            return Err(ConfigurationError::NoSubjects);
        }
        if self.shapes.is_empty() {
            return Err(ConfigurationError::NoShapes);
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.subjects.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(ConfigurationError::DuplicateSubject(dup.clone()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.shapes.iter().find(|s| !seen.insert(s.name())) {
            return Err(ConfigurationError::DuplicateShape(dup.to_string()));
        }
        if self.repetitions == 0 {
            return Err(ConfigurationError::ZeroCount {
                field: "repetitions",
            });
        }
        if self.shape_reps_per_subsession == 0 {
            return Err(ConfigurationError::ZeroCount {
                field: "shape_reps_per_subsession",
            });
        }
        self.tone.validate()?;
        self.timing.validate()
    }

    pub fn total_turns(&self) -> usize {
        self.repetitions as usize
            * self.subjects.len()
            * self.shapes.len()
            * self.shape_reps_per_subsession as usize
    }

    pub fn turns_per_subsession(&self) -> usize {
        self.shapes.len() * self.shape_reps_per_subsession as usize
    }

    /// Training plus measurement, excluding instruction clips and fixed waits.
    pub fn estimated_trial_duration(&self) -> Duration {
        self.timing.training_phase_duration() + self.timing.measurement_phase_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SessionConfig {
        SessionConfig {
            subjects: vec!["A".into(), "B".into()],
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_default_needs_subjects() {
        assert_eq!(
            SessionConfig::default().validate(),
            Err(ConfigurationError::NoSubjects)
        );
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_non_positive_durations() {
        let mut config = valid();
        config.timing.measurement_silence_duration = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::NonPositiveDuration {
                field: "measurement_silence_duration",
                ..
            })
        ));

        config.timing.measurement_silence_duration = 0.5;
        config.timing.training_shape_duration = -1.0;
        assert!(config.validate().is_err());

        config.timing.training_shape_duration = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_counts_and_duplicates() {
        let mut config = valid();
        config.timing.training_repetitions = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::ZeroCount {
                field: "training_repetitions"
            })
        );

        let mut config = valid();
        config.shapes = vec![Shape::from("circle"), Shape::from("circle")];
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::DuplicateShape("circle".into()))
        );

        let mut config = valid();
        config.subjects.push("A".into());
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::DuplicateSubject("A".into()))
        );
    }

    #[test]
    fn test_rejects_bad_tone_settings() {
        let mut config = valid();
        config.tone.beep_frequency = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::OutOfRange {
                field: "tone.beep_frequency",
                ..
            }
        ));
        assert!(err.to_string().contains("Hz"));

        let mut config = valid();
        config.tone.beep_volume = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::OutOfRange {
                field: "tone.beep_volume",
                ..
            })
        ));
        config.tone.beep_volume = f32::NAN;
        assert!(config.validate().is_err());
        config.tone.beep_volume = 0.0;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_phase_estimates() {
        let timing = TimingSettings::default();
        assert_eq!(timing.training_phase_duration(), Duration::from_secs(10));
        assert_eq!(timing.measurement_phase_duration(), Duration::from_secs(10));
        assert_eq!(valid().estimated_trial_duration(), Duration::from_secs(20));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{ "subjects": ["P01"], "timing": { "measurement_repetitions": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.subjects, vec!["P01".to_string()]);
        assert_eq!(config.shapes.len(), 4);
        assert_eq!(config.timing.measurement_repetitions, 3);
        assert_eq!(config.timing.training_repetitions, 5);
        assert_eq!(config.tone.beep_frequency, 440.0);
    }
}
