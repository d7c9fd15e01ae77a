//! Launcher traits

use super::spec::ProcessSpec;
use async_trait::async_trait;
use taskrunner_foundation::Result;

/// Launcher trait - implement to add new ways of starting the agent
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start the process described by `spec`; returns as soon as it runs
    async fn launch(&self, spec: &ProcessSpec) -> Result<Box<dyn RunningProcess>>;

    /// Get launcher name
    fn name(&self) -> &'static str;
}

/// Handle on a launched process, driven by the timeout supervisor
#[async_trait]
pub trait RunningProcess: Send {
    /// OS process id, if known
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check; `Some(code)` once the process has ended
    fn try_wait(&mut self) -> Result<Option<i32>>;

    /// Forcefully stop the main process and reap it
    async fn kill(&mut self) -> Result<()>;

    /// Flush any captured output after the process has ended
    async fn finish(&mut self) -> Result<()>;
}
