//! Config - layered runner configuration
//!
//! - `runner.rs` - `RunnerConfig` and its sections, file/env merging
//! - `agent.rs` - locating the external agent executable

mod agent;
mod runner;

pub use agent::resolve_agent;
pub use runner::{
    AgentConfig, ContextConfig, DemoConfig, ExecutionConfig, PtyConfig, RunnerConfig,
    AGENT_ENV_VAR, GLOBAL_CONFIG_FILE, PROJECT_CONFIG_FILE,
};
