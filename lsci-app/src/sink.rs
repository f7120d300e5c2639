use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lsci_core::{TrialResult, Turn};
use lsci_experiment::TrialSink;
use tracing::warn;

/// Lays out recordings as `<dir>/<subject>/rep<k>/<shape>_<n>.lsci` and
/// appends every trial outcome to a JSON-lines log.
pub struct JsonlSink {
    dir: PathBuf,
    log: BufWriter<File>,
}

impl JsonlSink {
    pub fn create(dir: &Path, log_path: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("opening {}", log_path.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            log: BufWriter::new(file),
        })
    }

    fn append(&mut self, result: &TrialResult) -> Result<()> {
        serde_json::to_writer(&mut self.log, result)?;
        self.log.write_all(b"\n")?;
        self.log.flush()?;
        Ok(())
    }
}

impl TrialSink for JsonlSink {
    fn destination(&mut self, turn: &Turn) -> PathBuf {
        self.dir
            .join(&turn.subject)
            .join(format!("rep{}", turn.session_rep))
            .join(format!("{}_{}.lsci", turn.shape, turn.shape_rep))
    }

    fn record(&mut self, result: &TrialResult) {
        if let Err(err) = self.append(result) {
            warn!(turn = %result.turn, error = %err, "trial log write failed");
        }
    }
}
