//! TaskRunner CLI - Main entry point

mod commands;
mod output;
mod rpc;
mod schema;

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code after Ctrl-C
pub const EXIT_INTERRUPTED: u8 = 130;

/// TaskRunner - run markdown task files through an external agent, one at a time
#[derive(Parser, Debug)]
#[command(name = "taskrunner")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

/// Options shared by every project command
#[derive(ClapArgs, Debug, Clone)]
pub struct CommonArgs {
    /// Base directory holding tasks/, results/ and task_state.json
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Task list to split into tasks/ before running
    pub task_list: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Agent executable (name or path)
    #[arg(long)]
    pub agent: Option<String>,

    /// Per-task timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Simulate the agent with placeholder output
    #[arg(long)]
    pub demo: bool,

    /// Stream output through a pseudo-terminal
    #[arg(long)]
    pub stream: bool,

    /// Let the agent skip its permission prompts
    #[arg(long)]
    pub skip_permissions: bool,

    /// Do not reset the agent's conversation between tasks
    #[arg(long)]
    pub no_clear_context: bool,

    /// Keep existing tasks/ and state; do not split the task list again
    #[arg(long)]
    pub resume: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every unfinished task in order
    Run(RunArgs),
    /// Show task status and summary
    Status {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Create a project directory, optionally from a task list
    Create {
        /// Project name (directory under the base directory)
        project: String,

        /// Task list to split into the new project
        task_list: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Kill processes of tasks still marked running and reset state
    Clean {
        #[command(flatten)]
        common: CommonArgs,

        /// Keep task records (only mark running tasks as failed)
        #[arg(long)]
        keep_records: bool,
    },
    /// Serve JSON-RPC requests on stdin/stdout
    Serve,
    /// Check configuration and agent availability
    Health {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Show name, version and the RPC method list
    Info {
        /// Print machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Describe every command and RPC method
    Schema {
        /// Print machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging (stderr keeps stdout clean for --json and serve)
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let (json, result) = match args.command {
        Command::Run(run) => (run.common.json, commands::run(run).await),
        Command::Status { common } => (common.json, commands::status(&common)),
        Command::Create {
            project,
            task_list,
            common,
        } => (
            common.json,
            commands::create(&project, task_list.as_deref(), &common),
        ),
        Command::Clean {
            common,
            keep_records,
        } => (common.json, commands::clean(&common, keep_records)),
        Command::Serve => (false, rpc::serve().await.map(|_| ExitCode::SUCCESS)),
        Command::Health { common } => (common.json, commands::health(&common)),
        Command::Info { json } => (json, commands::info(json)),
        Command::Schema { json } => (json, commands::schema(json)),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&e, json);
            ExitCode::FAILURE
        }
    }
}
