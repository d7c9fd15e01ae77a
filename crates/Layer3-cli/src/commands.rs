//! Subcommand implementations

use crate::output;
use crate::schema;
use crate::{CommonArgs, RunArgs, EXIT_INTERRUPTED};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use taskrunner_foundation::{Error, ProjectLayout, RunnerConfig};
use taskrunner_task::TaskManager;
use tracing::warn;

pub fn base_dir(common: &CommonArgs) -> PathBuf {
    common
        .base_dir
        .clone()
        .unwrap_or_else(ProjectLayout::default_base_dir)
}

fn load_config(base: &Path) -> anyhow::Result<RunnerConfig> {
    RunnerConfig::load(base).context("failed to load configuration")
}

/// Apply `run` flags on top of file/env configuration
pub fn apply_run_flags(config: &mut RunnerConfig, args: &RunArgs) {
    if let Some(agent) = &args.agent {
        config.agent.executable = agent.clone();
    }
    if let Some(timeout) = args.timeout {
        config.execution.timeout_seconds = timeout;
    }
    if args.stream {
        config.execution.use_streaming = true;
    }
    if args.skip_permissions {
        config.execution.skip_permissions = true;
    }
    if args.no_clear_context {
        config.context.clear_between_tasks = false;
    }
}

pub async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let base = base_dir(&args.common);
    let mut config = load_config(&base)?;
    apply_run_flags(&mut config, &args);

    let mut manager = TaskManager::open(&base, config, args.demo)?;

    if let Some(list) = &args.task_list {
        if args.resume {
            warn!("--resume given; not re-splitting {}", list.display());
        } else {
            let created = manager.parse_task_list(list)?;
            if !args.common.json {
                println!("Created {} task file(s) from {}", created.len(), list.display());
            }
        }
    }

    let mut options = manager.default_batch_options();
    options.run.demo = args.demo;

    let interrupt = manager.interrupt();
    let result = {
        let batch = manager.run_all(&options);
        tokio::pin!(batch);
        tokio::select! {
            result = &mut batch => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupt received; stopping the running task");
                interrupt.trigger();
                batch.await
            }
        }
    };

    match result {
        Ok(report) => {
            output::print_report(&report, args.common.json);
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Interrupted(task)) => {
            let cleaned = manager.settle_interrupt(&task);
            warn!(
                terminated = cleaned.terminated.len(),
                clean = cleaned.clean,
                "Interrupted; cleaned up running tasks"
            );
            output::print_interrupted(&cleaned, args.common.json);
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn status(common: &CommonArgs) -> anyhow::Result<ExitCode> {
    let base = base_dir(common);
    let manager = TaskManager::open_offline(&base, load_config(&base)?)?;
    output::print_status(manager.status(), &manager.summary(), common.json);
    Ok(ExitCode::SUCCESS)
}

pub fn create(
    project: &str,
    task_list: Option<&Path>,
    common: &CommonArgs,
) -> anyhow::Result<ExitCode> {
    let created = TaskManager::create_project(&base_dir(common), project, task_list)?;
    output::print_created(&created, task_list.is_some(), common.json);
    Ok(ExitCode::SUCCESS)
}

pub fn clean(common: &CommonArgs, keep_records: bool) -> anyhow::Result<ExitCode> {
    let base = base_dir(common);
    let mut manager = TaskManager::open_offline(&base, load_config(&base)?)?;
    let report = manager.clean(keep_records);
    output::print_clean(&report, common.json);
    Ok(ExitCode::SUCCESS)
}

pub fn health(common: &CommonArgs) -> anyhow::Result<ExitCode> {
    let report = schema::health(&base_dir(common));
    output::print_health(&report, common.json);
    Ok(if schema::is_healthy(&report) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub fn info(json: bool) -> anyhow::Result<ExitCode> {
    output::print_info(&schema::server_info(), json);
    Ok(ExitCode::SUCCESS)
}

pub fn schema(json: bool) -> anyhow::Result<ExitCode> {
    output::print_schema(&schema::full_schema(), json);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args() -> RunArgs {
        RunArgs {
            task_list: None,
            common: CommonArgs {
                base_dir: None,
                json: false,
            },
            agent: Some("/opt/agent".to_string()),
            timeout: Some(42),
            demo: false,
            stream: true,
            skip_permissions: false,
            no_clear_context: true,
            resume: false,
        }
    }

    #[test]
    fn test_run_flags_override_config() {
        let mut config = RunnerConfig::default();
        apply_run_flags(&mut config, &run_args());
        assert_eq!(config.agent.executable, "/opt/agent");
        assert_eq!(config.execution.timeout_seconds, 42);
        assert!(config.execution.use_streaming);
        assert!(!config.execution.skip_permissions);
        assert!(!config.context.clear_between_tasks);
    }

    #[test]
    fn test_base_dir_default() {
        let common = CommonArgs {
            base_dir: None,
            json: true,
        };
        assert_eq!(base_dir(&common), ProjectLayout::default_base_dir());
    }
}
