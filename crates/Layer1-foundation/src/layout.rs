//! Project directory layout
//!
//! ```text
//! <base_dir>/
//!   tasks/            task prompt files (*.md)
//!   results/          <stem>.result / <stem>.error
//!   task_state.json   persisted task records
//! ```

use crate::{Error, Result};
use std::path::{Path, PathBuf};

pub const TASKS_DIR: &str = "tasks";
pub const RESULTS_DIR: &str = "results";
pub const STATE_FILE: &str = "task_state.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    base_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// `~/taskrunner`, or `./taskrunner` when there is no home directory
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join("taskrunner"))
            .unwrap_or_else(|| PathBuf::from("taskrunner"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.base_dir.join(TASKS_DIR)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.base_dir.join(RESULTS_DIR)
    }

    pub fn state_file(&self) -> PathBuf {
        self.base_dir.join(STATE_FILE)
    }

    /// Result file for a task file: `results/<stem>.result`
    pub fn result_file(&self, task_file: &Path) -> PathBuf {
        self.results_dir().join(format!("{}.result", file_stem(task_file)))
    }

    /// Error file for a task file: `results/<stem>.error`
    pub fn error_file(&self, task_file: &Path) -> PathBuf {
        self.results_dir().join(format!("{}.error", file_stem(task_file)))
    }

    /// Create the base, tasks and results directories
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.base_dir.clone(), self.tasks_dir(), self.results_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::Storage(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

/// Task name used as the state key: the file name without extension
pub fn file_stem(task_file: &Path) -> String {
    task_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
