//! Conversation reset between tasks
//!
//! The clear command is piped into a throwaway agent invocation under its
//! own short timeout. Failure is reported, never fatal.

use crate::executor::{Launcher, ProcessSpec, StdinSource};
use crate::process_tree::ProcessTree;
use crate::supervisor::{Outcome, TimeoutSupervisor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskrunner_foundation::ContextConfig;
use tracing::{info, warn};

const CLEAR_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ContextClearer {
    agent: PathBuf,
    config: ContextConfig,
    launcher: Arc<dyn Launcher>,
    tree: Arc<dyn ProcessTree>,
}

impl ContextClearer {
    pub fn new(
        agent: PathBuf,
        config: ContextConfig,
        launcher: Arc<dyn Launcher>,
        tree: Arc<dyn ProcessTree>,
    ) -> Self {
        Self {
            agent,
            config,
            launcher,
            tree,
        }
    }

    /// Send the clear command; `true` if the agent accepted it
    pub async fn clear(&self) -> bool {
        info!("Clearing agent context");
        let input = format!("{}\n", self.config.clear_command);
        let spec = ProcessSpec::new(self.agent.clone(), StdinSource::Text(input));

        let mut process = match self.launcher.launch(&spec).await {
            Ok(process) => process,
            Err(e) => {
                warn!("Context clearing failed: {}", e);
                return false;
            }
        };

        let supervisor = TimeoutSupervisor::new(
            Duration::from_secs(self.config.clear_timeout_seconds),
            CLEAR_POLL_INTERVAL,
            Arc::clone(&self.tree),
        );
        match supervisor
            .supervise(process.as_mut(), Instant::now(), None, |_| {})
            .await
        {
            Ok(run) if run.outcome == (Outcome::Exited { code: 0 }) => {
                info!("Agent context cleared");
                true
            }
            Ok(run) => {
                warn!("Context clearing failed: {:?}", run.outcome);
                false
            }
            Err(e) => {
                warn!("Context clearing failed: {}", e);
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::RedirectLauncher;
    use crate::process_tree::SystemProcessTree;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("agent.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn clearer(agent: PathBuf, timeout_secs: u64) -> ContextClearer {
        ContextClearer::new(
            agent,
            ContextConfig {
                clear_timeout_seconds: timeout_secs,
                ..Default::default()
            },
            Arc::new(RedirectLauncher::new()),
            Arc::new(SystemProcessTree::new()),
        )
    }

    #[tokio::test]
    async fn test_clear_pipes_command() {
        let dir = tempfile::tempdir().unwrap();
        let seen = dir.path().join("seen");
        let agent = script(dir.path(), &format!("cat > {}", seen.display()));

        assert!(clearer(agent, 5).clear().await);
        assert_eq!(std::fs::read_to_string(seen).unwrap(), "/clear\n");
    }

    #[tokio::test]
    async fn test_clear_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let agent = script(dir.path(), "exit 2");
        assert!(!clearer(agent, 5).clear().await);
    }

    #[tokio::test]
    async fn test_clear_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let agent = script(dir.path(), "sleep 5");
        assert!(!clearer(agent, 0).clear().await);
    }
}
