//! Shared fixtures: shell-script agents in a temp dir

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use taskrunner_foundation::RunnerConfig;
use taskrunner_task::TaskManager;
use tempfile::TempDir;

/// Write an executable `/bin/sh` script
pub fn agent_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Config pointing at `agent`, fast polling, no context clearing
pub fn config_for(agent: &Path) -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.agent.executable = agent.display().to_string();
    config.agent.args = Vec::new();
    config.execution.poll_interval_ms = 50;
    config.context.clear_between_tasks = false;
    config.demo.min_delay_ms = 10;
    config.demo.max_delay_ms = 20;
    config
}

pub struct Project {
    pub dir: TempDir,
    pub base: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("project");
        Self { dir, base }
    }

    pub fn agent(&self, body: &str) -> PathBuf {
        agent_script(self.dir.path(), "agent.sh", body)
    }

    pub fn task(&self, name: &str, content: &str) -> PathBuf {
        let tasks = self.base.join("tasks");
        std::fs::create_dir_all(&tasks).unwrap();
        let path = tasks.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn manager(&self, config: RunnerConfig) -> TaskManager {
        TaskManager::open(&self.base, config, false).unwrap()
    }

    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
