//! Task Manager - one base directory's tasks, shared by the CLI and the
//! RPC wrapper
//!
//! Features:
//! - Agent resolution with optional demo fallback
//! - Single-task and batch execution
//! - Task-list splitting and project creation
//! - Status, summary, and cleanup of orphaned processes

use crate::batch::{BatchOptions, BatchReport, BatchRunner};
use crate::engine::{ExecutionEngine, RunOptions, CLEANED_UP_ERROR};
use crate::supervisor::Interrupt;
use crate::splitter::split_task_list;
use crate::state::TaskMap;
use crate::task::{ExecutionSummary, TaskRecord, TaskStatus, TaskUpdate};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskrunner_foundation::{resolve_agent, Error, ProjectLayout, Result, RunnerConfig};
use tracing::{debug, info, warn};

/// Result of [`TaskManager::clean`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    /// Tasks that were still running and had their processes killed
    pub terminated: Vec<String>,
    /// Whether every kill succeeded
    pub clean: bool,
    /// Records removed from the state file
    pub removed: usize,
}

/// Result of [`TaskManager::create_project`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCreated {
    pub project: String,
    pub project_dir: PathBuf,
    pub task_files: Vec<PathBuf>,
}

pub struct TaskManager {
    engine: ExecutionEngine,
}

impl TaskManager {
    /// Open `base_dir` for execution.
    ///
    /// An agent that cannot be found is an error unless `demo` is
    /// requested or the configuration allows falling back to demo output.
    pub fn open(base_dir: &Path, config: RunnerConfig, demo: bool) -> Result<Self> {
        let layout = prepare(base_dir)?;
        let agent = match resolve_agent(&config.agent) {
            Ok(agent) => Some(agent),
            Err(e) if demo => {
                debug!("Agent not resolved, demo mode requested: {}", e);
                None
            }
            Err(e) if config.execution.demo_fallback => {
                warn!("{}; falling back to demo mode", e);
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(agent) = &agent {
            info!("Using agent {}", agent.display());
        }
        Ok(Self {
            engine: ExecutionEngine::new(layout, config, agent),
        })
    }

    /// Open `base_dir` for status queries and cleanup; never resolves the
    /// agent
    pub fn open_offline(base_dir: &Path, config: RunnerConfig) -> Result<Self> {
        let layout = prepare(base_dir)?;
        Ok(Self {
            engine: ExecutionEngine::new(layout, config, None),
        })
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ExecutionEngine {
        &mut self.engine
    }

    pub fn layout(&self) -> &ProjectLayout {
        self.engine.layout()
    }

    /// Stops the running task; a batch then ends with `Error::Interrupted`
    pub fn interrupt(&self) -> Interrupt {
        self.engine.interrupt()
    }

    /// Run options from configuration, before any per-call override
    pub fn default_run_options(&self) -> RunOptions {
        let execution = &self.engine.config().execution;
        RunOptions {
            streaming: execution.use_streaming,
            demo: false,
            skip_permissions: execution.skip_permissions,
        }
    }

    pub fn default_batch_options(&self) -> BatchOptions {
        BatchOptions {
            timeout: self.engine.config().execution.timeout(),
            run: self.default_run_options(),
            clear_context: self.engine.config().context.clear_between_tasks,
        }
    }

    pub async fn run_task(
        &mut self,
        task_file: &Path,
        timeout: Duration,
        options: &RunOptions,
    ) -> (bool, TaskRecord) {
        self.engine.run_task(task_file, timeout, options).await
    }

    pub async fn run_all(&mut self, options: &BatchOptions) -> Result<BatchReport> {
        BatchRunner::new(&mut self.engine).run(options).await
    }

    /// Split a task list into this base directory's `tasks/`
    pub fn parse_task_list(&mut self, task_list: &Path) -> Result<Vec<PathBuf>> {
        let layout = self.engine.layout().clone();
        split_task_list(task_list, &layout, self.engine.state_mut())
    }

    /// Lay out `<base_dir>/<project_name>` and optionally split a task
    /// list into it
    pub fn create_project(
        base_dir: &Path,
        project_name: &str,
        task_list: Option<&Path>,
    ) -> Result<ProjectCreated> {
        let name = project_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::InvalidInput(format!(
                "invalid project name: {:?}",
                project_name
            )));
        }
        if let Some(list) = task_list {
            if !list.is_file() {
                return Err(Error::NotFound(format!("task list {}", list.display())));
            }
        }

        let project_dir = base_dir.join(name);
        let mut manager = Self::open_offline(&project_dir, RunnerConfig::default())?;
        let task_files = match task_list {
            Some(list) => manager.parse_task_list(list)?,
            None => Vec::new(),
        };
        info!(project = name, tasks = task_files.len(), "Created project");

        Ok(ProjectCreated {
            project: name.to_string(),
            project_dir,
            task_files,
        })
    }

    /// Every record, ordered by name
    pub fn status(&self) -> &TaskMap {
        self.engine.state().records()
    }

    pub fn summary(&self) -> ExecutionSummary {
        self.engine.state().summary()
    }

    /// Re-read state from disk (another process may have written it)
    pub fn reload(&mut self) {
        self.engine.state_mut().reload();
    }

    /// Kill the process trees of every task still marked running, mark
    /// those tasks failed, then drop all records unless `keep_records`.
    pub fn clean(&mut self, keep_records: bool) -> CleanReport {
        let tree = self.engine.process_tree();
        let running: Vec<TaskRecord> = self
            .engine
            .state()
            .records()
            .values()
            .filter(|r| r.status == TaskStatus::Running)
            .cloned()
            .collect();

        let mut report = CleanReport {
            clean: true,
            ..Default::default()
        };

        for record in running {
            let mut clean = true;
            for pid in record.tracked_pids() {
                if !tree.kill_tree(pid) {
                    clean = false;
                }
            }
            info!(task = %record.name, clean, "Terminated running task");
            self.engine.state_mut().update(
                &record.name,
                TaskStatus::Failed,
                TaskUpdate {
                    completed_at: Some(Utc::now()),
                    error: Some(CLEANED_UP_ERROR.to_string()),
                    clean_termination: Some(clean),
                    clear_processes: true,
                    ..Default::default()
                },
            );
            report.clean &= clean;
            report.terminated.push(record.name);
        }

        if !keep_records {
            report.removed = self.engine.state().records().len();
            self.engine.state_mut().clear();
        }
        report
    }

    /// Cleanup after a batch ended with `Error::Interrupted(task)`.
    ///
    /// `task` is reported as terminated if the interrupt killed it; any
    /// other record still marked running is cleaned as by `clean`.
    /// Records are kept.
    pub fn settle_interrupt(&mut self, task: &str) -> CleanReport {
        let stopped = self
            .engine
            .state()
            .get(task)
            .filter(|r| r.error.as_deref() == Some(CLEANED_UP_ERROR))
            .map(|r| r.clean_termination.unwrap_or(true));

        let mut report = self.clean(true);
        if let Some(clean) = stopped {
            report.terminated.insert(0, task.to_string());
            report.clean &= clean;
        }
        report
    }
}

fn prepare(base_dir: &Path) -> Result<ProjectLayout> {
    let layout = ProjectLayout::new(base_dir);
    layout
        .ensure()
        .map_err(|e| Error::Config(format!("cannot prepare {}: {}", base_dir.display(), e)))?;
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn missing_agent_config() -> RunnerConfig {
        let mut config = RunnerConfig::default();
        config.agent.executable = "/nonexistent/agent-binary".to_string();
        config
    }

    #[test]
    fn test_missing_agent_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = TaskManager::open(dir.path(), missing_agent_config(), false)
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_agent_with_demo_or_fallback() {
        let dir = TempDir::new().unwrap();
        let manager = TaskManager::open(dir.path(), missing_agent_config(), true).unwrap();
        assert!(manager.engine().agent().is_none());

        let mut config = missing_agent_config();
        config.execution.demo_fallback = true;
        assert!(TaskManager::open(dir.path(), config, false).is_ok());
    }

    #[test]
    fn test_create_project_validates() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            TaskManager::create_project(dir.path(), "../x", None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            TaskManager::create_project(dir.path(), "p", Some(&dir.path().join("none.md"))),
            Err(Error::NotFound(_))
        ));

        let created = TaskManager::create_project(dir.path(), "p", None).unwrap();
        assert!(created.project_dir.join("tasks").is_dir());
        assert!(created.task_files.is_empty());
    }

    #[test]
    fn test_clean_marks_running_failed() {
        let dir = TempDir::new().unwrap();
        let mut manager = TaskManager::open_offline(dir.path(), RunnerConfig::default()).unwrap();
        let state = manager.engine_mut().state_mut();
        state.update("001_a", TaskStatus::Completed, TaskUpdate::new());
        state.update(
            "002_b",
            TaskStatus::Running,
            TaskUpdate {
                // pid that cannot exist
                process_id: Some(4_194_304 + 99),
                ..Default::default()
            },
        );

        let report = manager.clean(true);
        assert_eq!(report.terminated, vec!["002_b".to_string()]);
        assert_eq!(report.removed, 0);

        let record = manager.status().get("002_b").unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some(CLEANED_UP_ERROR));
        assert!(record.process_id.is_none());
        assert_eq!(
            manager.status().get("001_a").unwrap().status,
            TaskStatus::Completed
        );

        let report = manager.clean(false);
        assert_eq!(report.removed, 2);
        assert!(manager.status().is_empty());
    }
}
