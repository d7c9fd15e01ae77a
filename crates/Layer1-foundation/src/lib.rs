//! # taskrunner-foundation
//!
//! Shared building blocks for the task runner:
//! - Error: crate-wide `Error` / `Result`
//! - Storage: `JsonStore` for atomic JSON files
//! - Config: `RunnerConfig` layered from files and environment
//! - Layout: `ProjectLayout` for the tasks/results/state directory tree

pub mod config;
pub mod error;
pub mod layout;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Storage
// ============================================================================
pub use storage::JsonStore;

// ============================================================================
// Config
// ============================================================================
pub use config::{
    resolve_agent, AgentConfig, ContextConfig, DemoConfig, ExecutionConfig, PtyConfig,
    RunnerConfig,
};

// ============================================================================
// Layout
// ============================================================================
pub use layout::{file_stem, ProjectLayout};
