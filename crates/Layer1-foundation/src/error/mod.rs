//! Error types for TaskRunner
//!
//! Every library-level failure funnels through [`Error`]. Only the
//! configuration-level variants are meant to escape the execution engine;
//! everything else is folded into a terminal task record.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// TaskRunner error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Agent executable not found: {0}")]
    AgentNotFound(String),

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // Process execution
    // ========================================================================
    #[error("Failed to launch agent: {0}")]
    Launch(String),

    #[error("Process error: {0}")]
    Process(String),

    /// A batch stopped by the user; carries the task it stopped at
    #[error("Interrupted by user at task {0}")]
    Interrupted(String),

    // ========================================================================
    // Batch / lookup
    // ========================================================================
    #[error("No task files found in {0}")]
    NoTasks(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Configuration-level failures abort the caller instead of being
    /// recorded against a single task.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::AgentNotFound(_))
    }

    /// Errors a CLI user can act on without a backtrace
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::AgentNotFound(_)
                | Error::NoTasks(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::Interrupted(_)
        )
    }
}
