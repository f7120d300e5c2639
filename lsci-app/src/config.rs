use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use lsci_experiment::SessionConfig;
use serde::{Deserialize, Serialize};

/// Station configuration: the session plus the simulated devices it runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub output_dir: PathBuf,
    pub display: DisplaySettings,
    pub audio: AudioSettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Nominal vsync rate of the simulated panel.
    pub refresh_rate_hz: f64,
    /// Upper bound of random flip latency after each vsync.
    pub jitter_us: u64,
    /// Measure the refresh rate before the session instead of trusting the
    /// nominal one.
    pub calibrate: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            refresh_rate_hz: 60.0,
            jitter_us: 200,
            calibrate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Playback length of every simulated instruction clip.
    pub instruction_duration_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            instruction_duration_ms: 1500,
        }
    }
}

impl AudioSettings {
    pub fn instruction_duration(&self) -> Duration {
        Duration::from_millis(self.instruction_duration_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraBackend {
    /// Capture thread writing one timestamp per camera frame.
    Simulated,
    /// Accepts every call and writes nothing.
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub backend: CameraBackend,
    pub target_frame_rate: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            backend: CameraBackend::Simulated,
            target_frame_rate: 500.0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                subjects: vec!["P01".into(), "P02".into()],
                ..SessionConfig::default()
            },
            output_dir: PathBuf::from("lsci-output"),
            display: DisplaySettings::default(),
            audio: AudioSettings::default(),
            camera: CameraSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn progress_path(&self) -> PathBuf {
        self.output_dir.join("progress.json")
    }

    pub fn trial_log_path(&self) -> PathBuf {
        self.output_dir.join("trials.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.json");
        fs::write(
            &path,
            r#"{
                "session": { "subjects": ["S1"], "shapes": ["circle"] },
                "camera": { "backend": "null" },
                "display": { "refresh_rate_hz": 144.0 }
            }"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.session.subjects, vec!["S1".to_string()]);
        assert_eq!(config.session.repetitions, 5);
        assert_eq!(config.camera.backend, CameraBackend::Null);
        assert_eq!(config.camera.target_frame_rate, 500.0);
        assert_eq!(config.display.refresh_rate_hz, 144.0);
        assert!(config.display.calibrate);
        assert_eq!(config.output_dir, PathBuf::from("lsci-output"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = AppConfig::load(Path::new("/nonexistent/station.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/station.json"));
    }
}
