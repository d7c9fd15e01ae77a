//! Agent executable lookup

use super::AgentConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locate the agent executable.
///
/// An explicit path (absolute or containing a separator) must exist as-is.
/// A bare name is looked up on `PATH` first, then in `search_paths`.
pub fn resolve_agent(config: &AgentConfig) -> Result<PathBuf> {
    let executable = config.executable.trim();
    if executable.is_empty() {
        return Err(Error::Config("agent executable is empty".to_string()));
    }

    let as_path = Path::new(executable);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        if as_path.is_file() {
            return Ok(as_path.to_path_buf());
        }
        return Err(Error::AgentNotFound(executable.to_string()));
    }

    if let Ok(found) = which::which(executable) {
        debug!("Resolved agent on PATH: {}", found.display());
        return Ok(found);
    }

    config
        .search_paths
        .iter()
        .find(|candidate| candidate.is_file())
        .cloned()
        .map(|found| {
            debug!("Resolved agent from search paths: {}", found.display());
            found
        })
        .ok_or_else(|| Error::AgentNotFound(executable.to_string()))
}
