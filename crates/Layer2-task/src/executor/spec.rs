//! Process launch description
//!
//! The agent is always started directly (no shell), with its stdio
//! described by [`ProcessSpec`].

use std::path::{Path, PathBuf};
use taskrunner_foundation::{Error, Result};

/// Where the child's input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    /// Contents of a file
    File(PathBuf),
    /// Literal text
    Text(String),
}

impl StdinSource {
    /// Full input as text (PTY mode writes it to the terminal)
    pub fn read_to_string(&self) -> Result<String> {
        match self {
            StdinSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::Launch(format!("Failed to read task file {}: {}", path.display(), e))
            }),
            StdinSource::Text(text) => Ok(text.clone()),
        }
    }
}

/// Where one of the child's output streams goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Truncated and written from the start
    File(PathBuf),
    /// Discarded
    Null,
}

impl OutputSink {
    pub fn path(&self) -> Option<&Path> {
        match self {
            OutputSink::File(path) => Some(path),
            OutputSink::Null => None,
        }
    }

    /// Create the sink's parent directory and open it for writing
    pub fn open(&self) -> Result<Option<std::fs::File>> {
        let Some(path) = self.path() else {
            return Ok(None);
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Launch(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        std::fs::File::create(path)
            .map(Some)
            .map_err(|e| Error::Launch(format!("Failed to open {}: {}", path.display(), e)))
    }
}

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub stdin_source: StdinSource,
    pub stdout_sink: OutputSink,
    pub stderr_sink: OutputSink,
    /// Run under a pseudo-terminal and stream output line by line
    pub interactive: bool,
}

impl ProcessSpec {
    pub fn new(executable: impl Into<PathBuf>, stdin_source: StdinSource) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            stdin_source,
            stdout_sink: OutputSink::Null,
            stderr_sink: OutputSink::Null,
            interactive: false,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdout(mut self, sink: OutputSink) -> Self {
        self.stdout_sink = sink;
        self
    }

    pub fn stderr(mut self, sink: OutputSink) -> Self {
        self.stderr_sink = sink;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Short form for log lines
    pub fn display(&self) -> String {
        let mut parts = vec![self.executable.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}
