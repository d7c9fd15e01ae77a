//! Self-description: server info, health and the command/method schema
//!
//! The CLI half of the schema is read back from the clap definition, so
//! it cannot drift from the parser. The RPC half is a table of JSON
//! schemas, one per method served by [`crate::rpc::dispatch`].

use clap::{Arg, CommandFactory, ValueHint};
use serde_json::{json, Map, Value};
use std::path::Path;
use taskrunner_foundation::{resolve_agent, RunnerConfig};

pub const NAME: &str = "taskrunner";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// One RPC method: name, summary and the JSON schema of its params
pub struct MethodSchema {
    pub name: &'static str,
    pub description: &'static str,
    parameters: fn() -> Value,
}

impl MethodSchema {
    pub fn parameters(&self) -> Value {
        (self.parameters)()
    }
}

fn base_dir_only() -> Value {
    json!({
        "type": "object",
        "properties": {
            "base_dir": {
                "type": "string",
                "description": "Project base directory (defaults to the runner's home directory)"
            }
        },
        "required": []
    })
}

fn no_params() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

fn run_task_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "task_path": {
                "type": "string",
                "description": "Task file to run"
            },
            "base_dir": {
                "type": "string",
                "description": "Project base directory"
            },
            "timeout_seconds": {
                "type": "integer",
                "description": "Per-task timeout; configuration value when omitted"
            },
            "demo_mode": {
                "type": "boolean",
                "description": "Write placeholder output instead of launching the agent"
            },
            "use_streaming": {
                "type": "boolean",
                "description": "Run the agent under a pseudo-terminal"
            }
        },
        "required": ["task_path"]
    })
}

fn run_all_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "base_dir": {
                "type": "string",
                "description": "Project base directory"
            },
            "timeout_seconds": {
                "type": "integer",
                "description": "Per-task timeout; configuration value when omitted"
            },
            "demo_mode": {
                "type": "boolean",
                "description": "Write placeholder output instead of launching the agent"
            },
            "use_streaming": {
                "type": "boolean",
                "description": "Run the agent under a pseudo-terminal"
            }
        },
        "required": []
    })
}

fn parse_task_list_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "task_list_path": {
                "type": "string",
                "description": "Markdown task list to split"
            },
            "base_dir": {
                "type": "string",
                "description": "Project base directory"
            }
        },
        "required": ["task_list_path"]
    })
}

fn create_project_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "project_name": {
                "type": "string",
                "description": "Directory name of the new project"
            },
            "task_list_path": {
                "type": "string",
                "description": "Task list to split into the project"
            },
            "base_dir": {
                "type": "string",
                "description": "Directory the project is created under"
            }
        },
        "required": ["project_name"]
    })
}

/// Every method [`crate::rpc::dispatch`] answers
pub const METHODS: &[MethodSchema] = &[
    MethodSchema {
        name: "run_task",
        description: "Run a single task file through the agent",
        parameters: run_task_params,
    },
    MethodSchema {
        name: "run_all_tasks",
        description: "Run every unfinished task in order",
        parameters: run_all_params,
    },
    MethodSchema {
        name: "parse_task_list",
        description: "Split a task list into numbered task files",
        parameters: parse_task_list_params,
    },
    MethodSchema {
        name: "create_project",
        description: "Create a project directory, optionally from a task list",
        parameters: create_project_params,
    },
    MethodSchema {
        name: "get_task_status",
        description: "Every task record of a project",
        parameters: base_dir_only,
    },
    MethodSchema {
        name: "get_task_summary",
        description: "Task counts and completion percentage",
        parameters: base_dir_only,
    },
    MethodSchema {
        name: "clean",
        description: "Kill processes of tasks still marked running and reset state",
        parameters: base_dir_only,
    },
    MethodSchema {
        name: "health",
        description: "Version, platform and agent availability",
        parameters: base_dir_only,
    },
    MethodSchema {
        name: "info",
        description: "Server name, version and method list",
        parameters: no_params,
    },
    MethodSchema {
        name: "schema",
        description: "Schema of every CLI command and RPC method",
        parameters: no_params,
    },
];

pub fn method_names() -> Vec<&'static str> {
    METHODS.iter().map(|method| method.name).collect()
}

pub fn server_info() -> Value {
    json!({
        "name": NAME,
        "version": VERSION,
        "description": DESCRIPTION,
        "protocol": "jsonrpc-2.0 over stdio",
        "methods": method_names(),
    })
}

/// `status` is "healthy" while the project configuration loads. A missing
/// agent is reported under `agent` but leaves the status healthy.
pub fn health(base: &Path) -> Value {
    let (config, config_error) = match RunnerConfig::load(base) {
        Ok(config) => (config, None),
        Err(e) => (RunnerConfig::default(), Some(e.to_string())),
    };

    let mut agent = json!({ "executable": config.agent.executable });
    match resolve_agent(&config.agent) {
        Ok(path) => {
            agent["available"] = json!(true);
            agent["path"] = json!(path);
        }
        Err(e) => {
            agent["available"] = json!(false);
            agent["error"] = json!(e.to_string());
        }
    }

    let mut config_state = json!({ "loaded": config_error.is_none() });
    if let Some(error) = &config_error {
        config_state["error"] = json!(error);
    }

    json!({
        "status": if config_error.is_none() { "healthy" } else { "unhealthy" },
        "version": VERSION,
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "family": std::env::consts::FAMILY,
        },
        "base_dir": base,
        "config": config_state,
        "agent": agent,
    })
}

pub fn is_healthy(report: &Value) -> bool {
    report["status"] == "healthy"
}

fn arg_type(arg: &Arg) -> &'static str {
    if !arg.get_action().takes_values() {
        return "flag";
    }
    match arg.get_value_hint() {
        ValueHint::AnyPath | ValueHint::FilePath | ValueHint::DirPath => "path",
        _ => "value",
    }
}

fn arg_schema(arg: &Arg) -> Value {
    let mut schema = json!({
        "type": arg_type(arg),
        "required": arg.is_required_set(),
        "positional": arg.is_positional(),
        "help": arg.get_help().map(|help| help.to_string()).unwrap_or_default(),
    });
    if let Some(long) = arg.get_long() {
        schema["flag"] = json!(format!("--{}", long));
    }
    let defaults: Vec<String> = arg
        .get_default_values()
        .iter()
        .map(|value| value.to_string_lossy().into_owned())
        .collect();
    if let [single] = defaults.as_slice() {
        schema["default"] = json!(single);
    } else if !defaults.is_empty() {
        schema["default"] = json!(defaults);
    }
    schema
}

fn parameters(command: &clap::Command) -> Value {
    let mut params = Map::new();
    for arg in command.get_arguments() {
        let id = arg.get_id().as_str();
        if id == "help" || id == "version" {
            continue;
        }
        params.insert(id.to_string(), arg_schema(arg));
    }
    Value::Object(params)
}

/// Commands and their arguments, read from the CLI definition
pub fn cli_schema() -> Value {
    let mut cli = crate::Args::command();
    cli.build();
    let mut commands = Map::new();
    for sub in cli.get_subcommands() {
        commands.insert(
            sub.get_name().to_string(),
            json!({
                "help": sub.get_about().map(|about| about.to_string()).unwrap_or_default(),
                "parameters": parameters(sub),
            }),
        );
    }
    json!({
        "name": NAME,
        "version": VERSION,
        "global": parameters(&cli),
        "commands": commands,
    })
}

/// RPC methods in the `functions` layout MCP-style clients expect
pub fn rpc_schema() -> Value {
    let functions: Map<String, Value> = METHODS
        .iter()
        .map(|method| {
            (
                method.name.to_string(),
                json!({
                    "description": method.description,
                    "parameters": method.parameters(),
                }),
            )
        })
        .collect();
    json!({ "functions": functions })
}

/// CLI and RPC schema in one document
pub fn full_schema() -> Value {
    json!({
        "cli": cli_schema(),
        "rpc": rpc_schema(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_schema_lists_every_command() {
        let schema = cli_schema();
        let commands = schema["commands"].as_object().unwrap();
        for name in ["run", "status", "create", "clean", "serve", "health", "info", "schema"] {
            assert!(commands.contains_key(name), "missing command {}", name);
        }
        assert_eq!(schema["version"], VERSION);
        assert_eq!(schema["global"]["debug"]["type"], "flag");
    }

    #[test]
    fn test_cli_schema_argument_details() {
        let schema = cli_schema();
        let run = &schema["commands"]["run"]["parameters"];
        assert_eq!(run["task_list"]["type"], "path");
        assert_eq!(run["task_list"]["required"], false);
        assert_eq!(run["task_list"]["positional"], true);
        assert_eq!(run["timeout"]["type"], "value");
        assert_eq!(run["timeout"]["flag"], "--timeout");
        assert_eq!(run["demo"]["type"], "flag");
        assert_eq!(run["base_dir"]["type"], "path");
        assert_eq!(run["json"]["help"], "Print machine-readable JSON instead of text");
        assert!(run.get("help").is_none());

        let create = &schema["commands"]["create"]["parameters"];
        assert_eq!(create["project"]["required"], true);
    }

    #[test]
    fn test_rpc_schema_required_params() {
        let schema = rpc_schema();
        let functions = schema["functions"].as_object().unwrap();
        assert_eq!(functions.len(), METHODS.len());
        assert_eq!(
            functions["run_task"]["parameters"]["required"],
            json!(["task_path"])
        );
        assert_eq!(
            functions["parse_task_list"]["parameters"]["properties"]["task_list_path"]["type"],
            "string"
        );
        assert_eq!(functions["info"]["parameters"]["properties"], json!({}));
    }

    #[test]
    fn test_server_info() {
        let info = server_info();
        assert_eq!(info["name"], "taskrunner");
        assert_eq!(info["version"], VERSION);
        let methods = info["methods"].as_array().unwrap();
        assert!(methods.contains(&json!("run_all_tasks")));
        assert!(methods.contains(&json!("health")));
    }

    #[test]
    fn test_health_without_agent_is_still_healthy() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("taskrunner.json"),
            r#"{ "agent": { "executable": "/nonexistent/agent-binary", "searchPaths": [] } }"#,
        )
        .unwrap();

        let report = health(dir.path());
        assert!(is_healthy(&report));
        assert_eq!(report["config"]["loaded"], true);
        assert_eq!(report["agent"]["available"], false);
        assert_eq!(report["agent"]["executable"], "/nonexistent/agent-binary");
        assert!(report["agent"]["error"].as_str().unwrap().contains("agent-binary"));
        assert_eq!(report["platform"]["os"], std::env::consts::OS);
    }

    #[test]
    fn test_health_with_broken_config_is_unhealthy() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("taskrunner.json"),
            r#"{ "execution": { "timeoutSeconds": "soon" } }"#,
        )
        .unwrap();

        let report = health(dir.path());
        assert!(!is_healthy(&report));
        assert_eq!(report["config"]["loaded"], false);
        assert!(report["config"]["error"].is_string());
    }
}
