//! Task execution engine
//!
//! Runs one task file end to end: `pending -> running -> {completed,
//! failed, timeout}`. Errors inside a task never escape [`ExecutionEngine::run_task`];
//! they become a `failed` record. So does a run stopped through the
//! engine's [`Interrupt`].

use crate::context::ContextClearer;
use crate::demo::{ContentGenerator, TemplateContentGenerator};
use crate::executor::{
    Launcher, OutputSink, ProcessSpec, PtyLauncher, RedirectLauncher, StdinSource,
    StreamJsonClassifier,
};
use crate::process_tree::{ProcessTree, SystemProcessTree};
use crate::state::StateStore;
use crate::supervisor::{Interrupt, Outcome, TimeoutSupervisor};
use crate::task::{TaskRecord, TaskStatus, TaskUpdate};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskrunner_foundation::{file_stem, Error, ProjectLayout, Result, RunnerConfig};
use tracing::{debug, error, info, warn};

/// Maximum number of characters of captured stderr kept in a record
pub const ERROR_EXCERPT_CHARS: usize = 500;

/// Error recorded for a task whose processes were killed on interrupt or
/// by `clean`
pub const CLEANED_UP_ERROR: &str = "interrupted: process cleaned up";

/// Per-run switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// PTY streaming instead of plain redirection
    pub streaming: bool,
    /// Generate placeholder output instead of running the agent
    pub demo: bool,
    pub skip_permissions: bool,
}

/// The task currently being executed
#[derive(Debug, Clone)]
pub struct CurrentTask {
    pub name: String,
    pub started: Instant,
}

pub struct ExecutionEngine {
    layout: ProjectLayout,
    state: StateStore,
    config: RunnerConfig,
    /// Resolved agent; `None` means every run is a demo run
    agent: Option<PathBuf>,
    tree: Arc<dyn ProcessTree>,
    redirect: Arc<dyn Launcher>,
    streaming: Arc<dyn Launcher>,
    content: Box<dyn ContentGenerator>,
    current: Option<CurrentTask>,
    interrupt: Interrupt,
}

impl ExecutionEngine {
    pub fn new(layout: ProjectLayout, config: RunnerConfig, agent: Option<PathBuf>) -> Self {
        let state = StateStore::open(layout.state_file());
        let streaming = PtyLauncher::new(config.pty, Arc::new(StreamJsonClassifier));
        let content = TemplateContentGenerator::new(config.demo);
        Self {
            layout,
            state,
            config,
            agent,
            tree: Arc::new(SystemProcessTree::new()),
            redirect: Arc::new(RedirectLauncher::new()),
            streaming: Arc::new(streaming),
            content: Box::new(content),
            current: None,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_process_tree(mut self, tree: Arc<dyn ProcessTree>) -> Self {
        self.tree = tree;
        self
    }

    pub fn with_streaming_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.streaming = launcher;
        self
    }

    pub fn with_content_generator(mut self, content: Box<dyn ContentGenerator>) -> Self {
        self.content = content;
        self
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateStore {
        &mut self.state
    }

    pub fn process_tree(&self) -> Arc<dyn ProcessTree> {
        Arc::clone(&self.tree)
    }

    pub fn agent(&self) -> Option<&Path> {
        self.agent.as_deref()
    }

    /// Handle that stops the task in flight, killing its process tree
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Task in flight, if any
    pub fn current_task(&self) -> Option<&CurrentTask> {
        self.current.as_ref()
    }

    /// Context clearer for the real agent; `None` when running without one
    pub fn context_clearer(&self) -> Option<ContextClearer> {
        self.agent.as_ref().map(|agent| {
            ContextClearer::new(
                agent.clone(),
                self.config.context.clone(),
                Arc::clone(&self.redirect),
                Arc::clone(&self.tree),
            )
        })
    }

    /// Run one task file and commit its terminal record
    pub async fn run_task(
        &mut self,
        task_file: &Path,
        timeout: Duration,
        options: &RunOptions,
    ) -> (bool, TaskRecord) {
        let name = file_stem(task_file);
        self.current = Some(CurrentTask {
            name: name.clone(),
            started: Instant::now(),
        });

        let result = self.execute(&name, task_file, timeout, options).await;
        self.current = None;

        match result {
            Ok(done) => done,
            Err(e) => {
                error!(task = %name, "Task failed: {}", e);
                let record = self.state.update(
                    &name,
                    TaskStatus::Failed,
                    TaskUpdate {
                        completed_at: Some(Utc::now()),
                        error: Some(e.to_string()),
                        clear_processes: true,
                        ..Default::default()
                    },
                );
                (false, record)
            }
        }
    }

    async fn execute(
        &mut self,
        name: &str,
        task_file: &Path,
        timeout: Duration,
        options: &RunOptions,
    ) -> Result<(bool, TaskRecord)> {
        let result_file = self.layout.result_file(task_file);
        let error_file = self.layout.error_file(task_file);

        self.state.update(
            name,
            TaskStatus::Running,
            TaskUpdate {
                started_at: Some(Utc::now()),
                ..TaskUpdate::files(
                    task_file.to_path_buf(),
                    result_file.clone(),
                    error_file.clone(),
                )
            },
        );
        info!(task = %name, "Processing task");

        let agent = match (&self.agent, options.demo) {
            (Some(agent), false) => agent.clone(),
            _ => return self.run_demo(name, &result_file).await,
        };

        let spec = ProcessSpec::new(agent, StdinSource::File(task_file.to_path_buf()))
            .args(
                self.config
                    .agent
                    .task_args(options.streaming, options.skip_permissions),
            )
            .stdout(OutputSink::File(result_file.clone()))
            .stderr(OutputSink::File(error_file.clone()))
            .interactive(options.streaming);

        let launcher = if options.streaming {
            Arc::clone(&self.streaming)
        } else {
            Arc::clone(&self.redirect)
        };
        debug!(task = %name, launcher = launcher.name(), "Launching {}", spec.display());

        let started = Instant::now();
        let mut process = launcher.launch(&spec).await?;
        let pid = process.pid();
        if pid.is_some() {
            self.state.update(
                name,
                TaskStatus::Running,
                TaskUpdate {
                    process_id: pid,
                    ..Default::default()
                },
            );
        }

        let supervisor = TimeoutSupervisor::new(
            timeout,
            self.config.execution.poll_interval(),
            Arc::clone(&self.tree),
        )
        .with_interrupt(self.interrupt.clone());
        let state = &mut self.state;
        let supervised = supervisor
            .supervise(process.as_mut(), started, Some(&result_file), |children| {
                state.update(
                    name,
                    TaskStatus::Running,
                    TaskUpdate {
                        child_processes: Some(children.to_vec()),
                        ..Default::default()
                    },
                );
            })
            .await;

        let run = match supervised {
            Ok(run) => run,
            Err(e) => {
                if let Some(pid) = pid {
                    let tree = Arc::clone(&self.tree);
                    let _ = tokio::task::spawn_blocking(move || tree.kill_tree(pid)).await;
                }
                return Err(e);
            }
        };

        let base = TaskUpdate {
            completed_at: Some(Utc::now()),
            exit_code: Some(run.outcome.exit_code()),
            execution_time: Some(run.elapsed.as_secs_f64()),
            result_size: Some(file_size(&result_file)),
            clear_processes: true,
            ..Default::default()
        };

        let (success, status, update) = match run.outcome {
            Outcome::Exited { code: 0 } => (true, TaskStatus::Completed, base),
            Outcome::Exited { code } => {
                warn!(task = %name, code, "Agent exited with failure");
                let excerpt = error_excerpt(&error_file);
                (false, TaskStatus::Failed, TaskUpdate { error: Some(excerpt), ..base })
            }
            Outcome::TimedOut { clean } => (
                false,
                TaskStatus::Timeout,
                TaskUpdate {
                    clean_termination: Some(clean),
                    ..base
                },
            ),
            Outcome::Interrupted { clean } => {
                warn!(task = %name, clean, "Task interrupted");
                (
                    false,
                    TaskStatus::Failed,
                    TaskUpdate {
                        error: Some(CLEANED_UP_ERROR.to_string()),
                        clean_termination: Some(clean),
                        ..base
                    },
                )
            }
        };

        let record = self.state.update(name, status, update);
        info!(
            task = %name,
            status = %record.status,
            elapsed = run.elapsed.as_secs_f64(),
            "Task finished"
        );
        Ok((success, record))
    }

    async fn run_demo(&mut self, name: &str, result_file: &Path) -> Result<(bool, TaskRecord)> {
        info!(task = %name, "Running in demo mode");
        let started = Instant::now();

        let content = self.content.generate(name);
        if let Some(parent) = result_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(result_file, content).map_err(|e| {
            Error::Storage(format!("Failed to write {}: {}", result_file.display(), e))
        })?;
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(self.content.delay()) => false,
            _ = self.interrupt.triggered() => true,
        };

        let base = TaskUpdate {
            completed_at: Some(Utc::now()),
            execution_time: Some(started.elapsed().as_secs_f64()),
            result_size: Some(file_size(result_file)),
            clear_processes: true,
            ..Default::default()
        };
        if interrupted {
            let record = self.state.update(
                name,
                TaskStatus::Failed,
                TaskUpdate {
                    error: Some(CLEANED_UP_ERROR.to_string()),
                    clean_termination: Some(true),
                    ..base
                },
            );
            return Ok((false, record));
        }

        let record = self.state.update(
            name,
            TaskStatus::Completed,
            TaskUpdate {
                exit_code: Some(0),
                ..base
            },
        );
        Ok((true, record))
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// First [`ERROR_EXCERPT_CHARS`] characters of the error file, or empty
fn error_excerpt(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .chars()
            .take(ERROR_EXCERPT_CHARS)
            .collect(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::ContentGenerator;
    use tempfile::TempDir;

    struct QuickContent;

    impl ContentGenerator for QuickContent {
        fn generate(&self, task_name: &str) -> String {
            format!("demo {}\n", task_name)
        }

        fn delay(&self) -> Duration {
            Duration::from_millis(5)
        }
    }

    fn demo_engine(dir: &TempDir) -> ExecutionEngine {
        let layout = ProjectLayout::new(dir.path());
        layout.ensure().unwrap();
        ExecutionEngine::new(layout, RunnerConfig::default(), None)
            .with_content_generator(Box::new(QuickContent))
    }

    #[tokio::test]
    async fn test_demo_run_completes() {
        let dir = TempDir::new().unwrap();
        let mut engine = demo_engine(&dir);
        let task = engine.layout().tasks_dir().join("001_hello.md");
        std::fs::write(&task, "say hi").unwrap();

        let (success, record) = engine
            .run_task(&task, Duration::from_secs(5), &RunOptions::default())
            .await;

        assert!(success);
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.execution_time.unwrap() > 0.0);
        assert_eq!(record.result_size, Some("demo 001_hello\n".len() as u64));
        assert!(record.started_at.is_some());
        assert!(engine.current_task().is_none());
    }

    #[tokio::test]
    async fn test_launch_error_becomes_failed_record() {
        let dir = TempDir::new().unwrap();
        let layout = ProjectLayout::new(dir.path());
        layout.ensure().unwrap();
        let mut engine = ExecutionEngine::new(
            layout,
            RunnerConfig::default(),
            Some(dir.path().join("missing-agent")),
        );
        let task = engine.layout().tasks_dir().join("001_x.md");
        std::fs::write(&task, "x").unwrap();

        let (success, record) = engine
            .run_task(&task, Duration::from_secs(5), &RunOptions::default())
            .await;

        assert!(!success);
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.unwrap().contains("Failed to spawn"));
        assert!(engine.current_task().is_none());
        assert_eq!(
            engine.state().get("001_x").unwrap().status,
            TaskStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_interrupt_stops_demo_run() {
        struct SlowContent;

        impl ContentGenerator for SlowContent {
            fn generate(&self, _task_name: &str) -> String {
                "partial\n".to_string()
            }

            fn delay(&self) -> Duration {
                Duration::from_secs(60)
            }
        }

        let dir = TempDir::new().unwrap();
        let mut engine = demo_engine(&dir).with_content_generator(Box::new(SlowContent));
        let task = engine.layout().tasks_dir().join("001_slow.md");
        std::fs::write(&task, "wait").unwrap();

        let interrupt = engine.interrupt();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupt.trigger();
        });

        let (success, record) = engine
            .run_task(&task, Duration::from_secs(120), &RunOptions::default())
            .await;

        assert!(!success);
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some(CLEANED_UP_ERROR));
        assert!(record.execution_time.unwrap() < 30.0);
        assert!(engine.current_task().is_none());
    }

    #[test]
    fn test_error_excerpt_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("e");
        std::fs::write(&path, "é".repeat(800)).unwrap();
        assert_eq!(error_excerpt(&path).chars().count(), ERROR_EXCERPT_CHARS);
        assert_eq!(error_excerpt(&dir.path().join("absent")), "");
    }
}
