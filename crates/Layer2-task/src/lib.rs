//! # taskrunner-task
//!
//! Sequential execution of markdown task files against an external agent.
//!
//! ## Features
//!
//! - Durable per-task state (`task_state.json`)
//! - Two launch backends: plain redirection and PTY streaming
//! - Timeout supervision with whole-process-tree cleanup
//! - Batch runs in file-name order with skip-if-finished and context reset
//! - Demo mode that exercises the full lifecycle without the agent
//! - Task-list splitting and project creation

pub mod batch;
pub mod context;
pub mod demo;
pub mod engine;
pub mod executor;
pub mod manager;
pub mod process_tree;
pub mod splitter;
pub mod state;
pub mod supervisor;
pub mod task;

// Execution
pub use batch::{task_files, BatchOptions, BatchReport, BatchRunner};
pub use engine::{CurrentTask, ExecutionEngine, RunOptions, CLEANED_UP_ERROR, ERROR_EXCERPT_CHARS};
pub use manager::{CleanReport, ProjectCreated, TaskManager};
pub use supervisor::{
    timeout_marker, Interrupt, Outcome, Supervised, TimeoutSupervisor, INTERRUPTED_EXIT_CODE,
    TIMEOUT_EXIT_CODE,
};

// Launchers
pub use executor::{
    Channel, Launcher, LineClassifier, OutputSink, PlainClassifier, ProcessSpec, PtyLauncher,
    RedirectLauncher, RunningProcess, StdinSource, StreamJsonClassifier,
};
pub use process_tree::{ProcessTree, SystemProcessTree};

// State
pub use state::{StateStore, TaskMap};
pub use task::{ExecutionSummary, TaskRecord, TaskStatus, TaskUpdate};

// Collaborators
pub use context::ContextClearer;
pub use demo::{ContentGenerator, TemplateContentGenerator};
pub use splitter::{parse_sections, split_task_list, ParsedTask};
