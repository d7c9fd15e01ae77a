//! Batch runner - every task file in `tasks/`, in file-name order

use crate::engine::{ExecutionEngine, RunOptions};
use crate::task::{TaskRecord, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskrunner_foundation::{file_stem, Error, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub timeout: Duration,
    pub run: RunOptions,
    /// Reset the agent's conversation between tasks
    pub clear_context: bool,
}

/// Aggregate of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub timeout: usize,
    /// Already terminal before this batch; also counted in their status
    pub skipped: usize,
    pub task_results: BTreeMap<String, TaskRecord>,
}

impl BatchReport {
    fn count(&mut self, record: &TaskRecord) {
        match record.status {
            TaskStatus::Completed => self.success += 1,
            TaskStatus::Timeout => self.timeout += 1,
            _ => self.failed += 1,
        }
        self.task_results.insert(record.name.clone(), record.clone());
    }
}

/// `*.md` files directly inside `dir`, sorted by file name
pub fn task_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub struct BatchRunner<'a> {
    engine: &'a mut ExecutionEngine,
}

impl<'a> BatchRunner<'a> {
    pub fn new(engine: &'a mut ExecutionEngine) -> Self {
        Self { engine }
    }

    /// Run every non-terminal task; `Error::NoTasks` if there are none.
    ///
    /// Once the engine's interrupt fires, the task in flight is recorded
    /// and the batch ends with `Error::Interrupted`.
    pub async fn run(&mut self, options: &BatchOptions) -> Result<BatchReport> {
        let tasks_dir = self.engine.layout().tasks_dir();
        let files = task_files(&tasks_dir)?;
        if files.is_empty() {
            warn!("No task files found in {}", tasks_dir.display());
            return Err(Error::NoTasks(tasks_dir.display().to_string()));
        }

        info!(count = files.len(), "Processing tasks");
        let clearer = if options.clear_context && !options.run.demo {
            self.engine.context_clearer()
        } else {
            None
        };

        let interrupt = self.engine.interrupt();
        let mut report = BatchReport {
            total: files.len(),
            ..Default::default()
        };

        for (i, file) in files.iter().enumerate() {
            let name = file_stem(file);
            if interrupt.is_triggered() {
                warn!(task = %name, "Batch interrupted before task");
                return Err(Error::Interrupted(name));
            }

            if let Some(existing) = self.engine.state().get(&name) {
                if existing.status.is_terminal() {
                    info!(task = %name, status = %existing.status, "Skipping finished task");
                    let existing = existing.clone();
                    report.count(&existing);
                    report.skipped += 1;
                    continue;
                }
            }

            info!(task = %name, "Running task ({}/{})", i + 1, files.len());
            let (_, record) = self
                .engine
                .run_task(file, options.timeout, &options.run)
                .await;
            report.count(&record);
            if interrupt.is_triggered() {
                warn!(task = %name, "Batch interrupted");
                return Err(Error::Interrupted(name));
            }

            if i + 1 < files.len() {
                if let Some(clearer) = &clearer {
                    clearer.clear().await;
                }
            }
        }

        info!(
            total = report.total,
            success = report.success,
            failed = report.failed,
            timeout = report.timeout,
            skipped = report.skipped,
            "Batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["010_c.md", "002_b.md", "001_a.md", "notes.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::create_dir(dir.path().join("003_dir.md")).unwrap();

        let names: Vec<String> = task_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| file_stem(p))
            .collect();
        assert_eq!(names, vec!["001_a", "002_b", "010_c"]);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(task_files(&dir.path().join("tasks")).unwrap().is_empty());
    }
}
