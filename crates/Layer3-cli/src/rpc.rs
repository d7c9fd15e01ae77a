//! JSON-RPC 2.0 wrapper over stdio
//!
//! One request per line on stdin, one response per line on stdout.
//! Every known method answers with a `result` envelope
//! (`{"success": true, ...}` or `{"success": false, "error": ...}`);
//! protocol problems use JSON-RPC `error` objects.

use crate::output::{error_envelope, report_envelope, success_envelope};
use crate::schema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskrunner_foundation::{Error, ProjectLayout, Result, RunnerConfig};
use taskrunner_task::{RunOptions, TaskManager};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn reply(id: Option<Value>, outcome: std::result::Result<Value, JsonRpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result,
            error,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_string(),
            data: None,
        }
    }

    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "Invalid Request".to_string(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "Method not found".to_string(),
            data: Some(json!({ "method": method })),
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Deserialize)]
struct RunTaskParams {
    task_path: PathBuf,
    base_dir: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    #[serde(default)]
    demo_mode: bool,
    use_streaming: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RunAllParams {
    base_dir: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    #[serde(default)]
    demo_mode: bool,
    use_streaming: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ParseTaskListParams {
    task_list_path: PathBuf,
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct CreateProjectParams {
    project_name: String,
    task_list_path: Option<PathBuf>,
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct BaseDirParams {
    base_dir: Option<PathBuf>,
}

fn params<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = match params {
        Value::Null => json!({}),
        other => other,
    };
    serde_json::from_value(params)
        .map_err(|e| Error::InvalidInput(format!("invalid parameters: {}", e)))
}

fn base_dir(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(ProjectLayout::default_base_dir)
}

fn data(value: &impl Serialize) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

// ============================================================================
// Dispatch
// ============================================================================

/// Execute one method. Unknown methods are a protocol error; every other
/// failure is folded into the `{"success": false}` envelope.
pub async fn dispatch(method: &str, raw: Value) -> std::result::Result<Value, JsonRpcError> {
    debug!(method, "RPC call");
    let outcome = match method {
        "run_task" => run_task(raw).await,
        "run_all_tasks" => run_all_tasks(raw).await,
        "parse_task_list" => parse_task_list(raw),
        "create_project" => create_project(raw),
        "get_task_status" => get_task_status(raw),
        "get_task_summary" => get_task_summary(raw),
        "clean" => clean(raw),
        "health" => health(raw),
        "info" => Ok(success_envelope(schema::server_info())),
        "schema" => Ok(success_envelope(schema::full_schema())),
        _ => return Err(JsonRpcError::method_not_found(method)),
    };

    Ok(outcome.unwrap_or_else(|e| {
        if e.is_fatal() {
            error!(method, "RPC call failed: {}", e);
        } else {
            warn!(method, "RPC call failed: {}", e);
        }
        error_envelope(e.to_string())
    }))
}

async fn run_task(raw: Value) -> Result<Value> {
    let p: RunTaskParams = params(raw)?;
    if !p.task_path.is_file() {
        return Err(Error::NotFound(format!(
            "Task file not found: {}",
            p.task_path.display()
        )));
    }
    let base = base_dir(p.base_dir);
    let config = RunnerConfig::load(&base)?;
    let timeout = p
        .timeout_seconds
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.execution.timeout());

    let mut manager = TaskManager::open(&base, config, p.demo_mode)?;
    let mut options = manager.default_run_options();
    options.demo = p.demo_mode;
    if let Some(streaming) = p.use_streaming {
        options.streaming = streaming;
    }

    let (success, record) = manager.run_task(&p.task_path, timeout, &options).await;
    let mut response = json!({ "success": success, "task_result": data(&record)? });
    if !success {
        response["error"] = json!(record.error.unwrap_or_else(|| record.status.to_string()));
    }
    Ok(response)
}

async fn run_all_tasks(raw: Value) -> Result<Value> {
    let p: RunAllParams = params(raw)?;
    let base = base_dir(p.base_dir);
    let config = RunnerConfig::load(&base)?;

    let mut manager = TaskManager::open(&base, config, p.demo_mode)?;
    let mut options = manager.default_batch_options();
    options.run = RunOptions {
        demo: p.demo_mode,
        streaming: p.use_streaming.unwrap_or(options.run.streaming),
        ..options.run
    };
    if let Some(seconds) = p.timeout_seconds {
        options.timeout = Duration::from_secs(seconds);
    }

    let report = manager.run_all(&options).await?;
    Ok(report_envelope(&report))
}

fn parse_task_list(raw: Value) -> Result<Value> {
    let p: ParseTaskListParams = params(raw)?;
    let mut manager = offline(&base_dir(p.base_dir))?;
    let files = manager.parse_task_list(&p.task_list_path)?;
    Ok(success_envelope(json!({
        "task_files": files,
        "count": files.len(),
    })))
}

fn create_project(raw: Value) -> Result<Value> {
    let p: CreateProjectParams = params(raw)?;
    let created = TaskManager::create_project(
        &base_dir(p.base_dir),
        &p.project_name,
        p.task_list_path.as_deref(),
    )?;

    let mut response = json!({
        "project": created.project,
        "project_dir": created.project_dir,
    });
    if p.task_list_path.is_some() {
        response["task_files"] = data(&created.task_files)?;
        response["count"] = json!(created.task_files.len());
    } else {
        response["message"] = json!("Project structure created. Use a task list to add tasks.");
    }
    Ok(success_envelope(response))
}

fn get_task_status(raw: Value) -> Result<Value> {
    let p: BaseDirParams = params(raw)?;
    let manager = offline(&base_dir(p.base_dir))?;
    Ok(success_envelope(json!({ "tasks": data(manager.status())? })))
}

fn get_task_summary(raw: Value) -> Result<Value> {
    let p: BaseDirParams = params(raw)?;
    let manager = offline(&base_dir(p.base_dir))?;
    Ok(success_envelope(json!({ "summary": data(&manager.summary())? })))
}

fn clean(raw: Value) -> Result<Value> {
    let p: BaseDirParams = params(raw)?;
    let mut manager = offline(&base_dir(p.base_dir))?;
    let report = manager.clean(false);
    Ok(success_envelope(json!({
        "message": "Cleaned up all processes",
        "terminated": report.terminated,
    })))
}

fn health(raw: Value) -> Result<Value> {
    let p: BaseDirParams = params(raw)?;
    let report = schema::health(&base_dir(p.base_dir));
    let mut response = success_envelope(report);
    response["success"] = json!(schema::is_healthy(&response));
    Ok(response)
}

fn offline(base: &Path) -> Result<TaskManager> {
    TaskManager::open_offline(base, RunnerConfig::load(base)?)
}

// ============================================================================
// Stdio loop
// ============================================================================

/// Answer one raw input line
pub async fn handle_line(line: &str) -> JsonRpcResponse {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => return JsonRpcResponse::reply(None, Err(JsonRpcError::parse_error())),
    };
    let id = value.get("id").cloned();
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(_) => return JsonRpcResponse::reply(id, Err(JsonRpcError::invalid_request())),
    };
    if request.jsonrpc != "2.0" {
        return JsonRpcResponse::reply(request.id, Err(JsonRpcError::invalid_request()));
    }

    let outcome = dispatch(&request.method, request.params.unwrap_or(Value::Null)).await;
    JsonRpcResponse::reply(request.id, outcome)
}

/// Serve until stdin closes
pub async fn serve() -> anyhow::Result<()> {
    info!("Serving JSON-RPC on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&line).await;
        let mut text = serde_json::to_string(&response)?;
        text.push('\n');
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
    }
    info!("stdin closed, shutting down");
    Ok(())
}
