//! Runner configuration
//!
//! Sources are merged lowest priority first:
//! 1. built-in defaults
//! 2. `~/.config/taskrunner/config.json`
//! 3. `<base_dir>/taskrunner.json`
//! 4. `TASKRUNNER_AGENT` environment variable
//!
//! CLI flags are applied on top by the binary.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Global config file name (inside the global config dir)
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Per-project config file name (inside the base directory)
pub const PROJECT_CONFIG_FILE: &str = "taskrunner.json";

/// Environment variable overriding the agent executable
pub const AGENT_ENV_VAR: &str = "TASKRUNNER_AGENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub pty: PtyConfig,

    #[serde(default)]
    pub demo: DemoConfig,
}

/// External agent invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Executable name or path
    pub executable: String,

    /// Arguments for every invocation
    pub args: Vec<String>,

    /// Extra arguments appended in streaming mode
    pub streaming_args: Vec<String>,

    /// Argument appended when permission prompts should be skipped
    pub skip_permissions_arg: String,

    /// Candidate locations tried after `PATH` lookup
    pub search_paths: Vec<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let executable = "claude".to_string();
        let mut search_paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".npm-global").join("bin").join(&executable));
            search_paths.push(home.join("node_modules").join(".bin").join(&executable));
        }
        search_paths.push(PathBuf::from("/usr/local/bin").join(&executable));
        search_paths.push(PathBuf::from("/opt/homebrew/bin").join(&executable));

        Self {
            executable,
            args: vec!["--print".to_string()],
            streaming_args: vec![
                "--verbose".to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
            ],
            skip_permissions_arg: "--dangerously-skip-permissions".to_string(),
            search_paths,
        }
    }
}

impl AgentConfig {
    /// Full argument list for one task invocation
    pub fn task_args(&self, streaming: bool, skip_permissions: bool) -> Vec<String> {
        let mut args = self.args.clone();
        if streaming {
            args.extend(self.streaming_args.iter().cloned());
        }
        if skip_permissions && !self.skip_permissions_arg.is_empty() {
            args.push(self.skip_permissions_arg.clone());
        }
        args
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionConfig {
    pub timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub use_streaming: bool,
    pub skip_permissions: bool,
    /// Fall back to demo output instead of failing when the agent is missing
    pub demo_fallback: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            poll_interval_ms: 1000,
            use_streaming: false,
            skip_permissions: false,
            demo_fallback: false,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Conversation reset between tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextConfig {
    pub clear_between_tasks: bool,
    pub clear_command: String,
    pub clear_timeout_seconds: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            clear_between_tasks: true,
            clear_command: "/clear".to_string(),
            clear_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PtyConfig {
    pub rows: u16,
    pub cols: u16,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self { rows: 80, cols: 200 }
    }
}

/// Simulated execution window for demo mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DemoConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 500,
            max_delay_ms: 2000,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load global + project settings and apply environment overrides
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut merged = Value::Object(Default::default());

        match JsonStore::global() {
            Ok(global) => merge_file(&mut merged, &global, GLOBAL_CONFIG_FILE),
            Err(e) => debug!("No global config directory: {}", e),
        }
        merge_file(&mut merged, &JsonStore::new(base_dir), PROJECT_CONFIG_FILE);

        let mut config: RunnerConfig = serde_json::from_value(merged)?;
        config.apply_env();
        Ok(config)
    }

    /// Load from explicit JSON documents (lowest priority first)
    pub fn from_layers(layers: &[Value]) -> Result<Self> {
        let mut merged = Value::Object(Default::default());
        for layer in layers {
            merge_values(&mut merged, layer.clone());
        }
        Ok(serde_json::from_value(merged)?)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(AGENT_ENV_VAR) {
            if !path.trim().is_empty() {
                debug!("Agent executable overridden by {}", AGENT_ENV_VAR);
                self.agent.executable = path;
            }
        }
    }
}

fn merge_file(target: &mut Value, store: &JsonStore, filename: &str) {
    match store.load_optional::<Value>(filename) {
        Ok(Some(layer)) => {
            debug!("Loaded settings from {}", store.file_path(filename).display());
            merge_values(target, layer);
        }
        Ok(None) => {}
        Err(e) => warn!("Ignoring unreadable settings file: {}", e),
    }
}

/// Deep-merge `overlay` into `target`; objects merge key by key, anything
/// else replaces.
fn merge_values(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(base), Value::Object(over)) => {
            for (key, value) in over {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.execution.timeout_seconds, 300);
        assert_eq!(config.execution.poll_interval(), Duration::from_secs(1));
        assert!(config.context.clear_between_tasks);
        assert_eq!(config.context.clear_command, "/clear");
        assert_eq!(config.agent.args, vec!["--print".to_string()]);
        assert!(!config.execution.demo_fallback);
    }

    #[test]
    fn test_layers_override_field_by_field() {
        let config = RunnerConfig::from_layers(&[
            json!({ "execution": { "timeoutSeconds": 60, "useStreaming": true } }),
            json!({ "execution": { "timeoutSeconds": 5 }, "agent": { "executable": "/opt/agent" } }),
        ])
        .unwrap();

        assert_eq!(config.execution.timeout_seconds, 5);
        assert!(config.execution.use_streaming);
        assert_eq!(config.agent.executable, "/opt/agent");
        // untouched sections keep defaults
        assert_eq!(config.agent.args, vec!["--print".to_string()]);
        assert_eq!(config.pty.cols, 200);
    }

    #[test]
    fn test_task_args() {
        let agent = AgentConfig::default();
        assert_eq!(agent.task_args(false, false), vec!["--print"]);

        let args = agent.task_args(true, true);
        assert_eq!(args[0], "--print");
        assert!(args.contains(&"stream-json".to_string()));
        assert_eq!(args.last().unwrap(), "--dangerously-skip-permissions");
    }

    #[test]
    fn test_load_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            r#"{ "context": { "clearBetweenTasks": false } }"#,
        )
        .unwrap();

        let config = RunnerConfig::load(dir.path()).unwrap();
        assert!(!config.context.clear_between_tasks);
    }

    #[test]
    fn test_load_ignores_malformed_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROJECT_CONFIG_FILE), "{{{").unwrap();
        let config = RunnerConfig::load(dir.path()).unwrap();
        assert_eq!(config.execution.timeout_seconds, 300);
    }
}
