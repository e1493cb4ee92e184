//! Shared plumbing for batch stages.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};

use crate::country::StageOutput;

/// Result type for batch stages.
pub type StageResult<T> = Result<T, StageError>;

/// Errors that stop a whole batch stage (as opposed to one item failing).
#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
}

/// Create a stage's output directory.
pub fn prepare_output_dir(dir: &Path) -> StageResult<()> {
    fs::create_dir_all(dir).map_err(|e| StageError::CreateDir {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Whether an existing output should be kept instead of produced again.
pub fn should_skip(path: &Path, overwrite: bool) -> bool {
    if path.exists() && !overwrite {
        info!("Skipping {} which already exists...", path.display());
        return true;
    }
    false
}

/// Success and failure counts of one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTally {
    pub stage: String,
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    /// Items the stage had nothing to do for.
    pub not_started: usize,
}

impl StageTally {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Default::default()
        }
    }

    /// Record one item's outcome; `path` names the item for failures.
    pub fn record(&mut self, path: &Path, output: &StageOutput) {
        match output {
            StageOutput::Succeeded(p) => self.succeeded.push(p.clone()),
            StageOutput::Failed(reason) => self.failed.push((path.to_path_buf(), reason.clone())),
            StageOutput::NotStarted => self.not_started += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.not_started
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Log the counts, plus every failure at error level.
    pub fn log(&self) {
        info!(
            stage = %self.stage,
            succeeded = self.succeeded.len(),
            failed = self.failed.len(),
            not_started = self.not_started,
            "stage finished"
        );
        for (path, reason) in &self.failed {
            error!(stage = %self.stage, path = %path.display(), "{}", reason);
        }
    }
}

impl fmt::Display for StageTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} failed",
            self.stage,
            self.succeeded.len(),
            self.failed.len()
        )?;
        if self.not_started > 0 {
            write!(f, ", {} skipped", self.not_started)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_each_outcome() {
        let mut tally = StageTally::new("convert");
        tally.record(Path::new("a"), &StageOutput::Succeeded(PathBuf::from("a.fgb")));
        tally.record(Path::new("b"), &StageOutput::Failed("exit 1".to_string()));
        tally.record(Path::new("c"), &StageOutput::NotStarted);

        assert_eq!(tally.total(), 3);
        assert!(!tally.all_succeeded());
        assert_eq!(tally.failed[0], (PathBuf::from("b"), "exit 1".to_string()));
        assert_eq!(tally.to_string(), "convert: 1 succeeded, 1 failed, 1 skipped");
    }

    #[test]
    fn test_should_skip() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("CYP-ADM0.geojson");

        assert!(!should_skip(&path, false));
        std::fs::write(&path, "{}").unwrap();
        assert!(should_skip(&path, false));
        assert!(!should_skip(&path, true));
    }

    #[test]
    fn test_prepare_output_dir_creates_parents() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("pmtiles").join("indiv");
        prepare_output_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
