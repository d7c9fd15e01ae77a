//! Text and JSON rendering for command results
//!
//! JSON goes to stdout as a single document; logs stay on stderr.

use serde::Serialize;
use serde_json::{json, Value};
use taskrunner_foundation::Error;
use taskrunner_task::{
    BatchReport, CleanReport, ExecutionSummary, ProjectCreated, TaskMap, TaskRecord,
};

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: failed to serialize output: {}", e),
    }
}

fn to_value(data: &impl Serialize) -> Value {
    serde_json::to_value(data).unwrap_or(Value::Null)
}

/// `{"success": true, ...data}`; the flag always wins over a `success` key in `data`
pub fn success_envelope(data: Value) -> Value {
    let mut envelope = match data {
        Value::Object(fields) => Value::Object(fields),
        _ => json!({}),
    };
    envelope["success"] = json!(true);
    envelope
}

/// Batch report inside an envelope. The completed count moves to
/// `succeeded` so it does not collide with the envelope flag.
pub fn report_envelope(report: &BatchReport) -> Value {
    let mut data = to_value(report);
    if let Some(fields) = data.as_object_mut() {
        if let Some(count) = fields.remove("success") {
            fields.insert("succeeded".to_string(), count);
        }
    }
    success_envelope(data)
}

/// `{"success": false, "error": message}`
pub fn error_envelope(message: impl Into<String>) -> Value {
    json!({ "success": false, "error": message.into() })
}

/// User-facing runner errors print bare; anything else keeps its context chain
fn error_message(error: &anyhow::Error) -> String {
    match error.downcast_ref::<Error>() {
        Some(e) if e.is_user_facing() => e.to_string(),
        _ => format!("{:#}", error),
    }
}

pub fn print_error(error: &anyhow::Error, json: bool) {
    let message = error_message(error);
    if json {
        print_json(&error_envelope(message));
    } else {
        eprintln!("Error: {}", message);
    }
}

pub fn print_report(report: &BatchReport, json: bool) {
    if json {
        print_json(&report_envelope(report));
        return;
    }

    println!();
    for record in report.task_results.values() {
        println!("{}", task_line(record));
    }
    println!();
    println!(
        "Total: {}  Completed: {}  Failed: {}  Timeout: {}  Skipped: {}",
        report.total, report.success, report.failed, report.timeout, report.skipped
    );
}

pub fn print_status(tasks: &TaskMap, summary: &ExecutionSummary, json: bool) {
    if json {
        print_json(&success_envelope(json!({
            "tasks": to_value(tasks),
            "summary": to_value(summary),
        })));
        return;
    }

    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }
    for record in tasks.values() {
        println!("{}", task_line(record));
    }
    println!();
    println!(
        "{}/{} finished ({}%)  completed {}, failed {}, timeout {}, running {}, pending {}",
        summary.completed + summary.failed + summary.timeout,
        summary.total,
        summary.completion_pct,
        summary.completed,
        summary.failed,
        summary.timeout,
        summary.running,
        summary.pending,
    );
}

pub fn print_created(created: &ProjectCreated, from_list: bool, json: bool) {
    if json {
        let mut data = json!({
            "project": created.project,
            "project_dir": created.project_dir,
        });
        if from_list {
            data["task_files"] = to_value(&created.task_files);
            data["count"] = json!(created.task_files.len());
        }
        print_json(&success_envelope(data));
        return;
    }

    println!("Created project {} at {}", created.project, created.project_dir.display());
    if from_list {
        for file in &created.task_files {
            println!("  {}", file.display());
        }
        println!("{} task file(s)", created.task_files.len());
    }
}

pub fn print_clean(report: &CleanReport, json: bool) {
    if json {
        print_json(&success_envelope(to_value(report)));
        return;
    }
    if report.terminated.is_empty() {
        println!("No running tasks to clean up.");
    } else {
        println!("Terminated: {}", report.terminated.join(", "));
    }
    if report.removed > 0 {
        println!("Removed {} task record(s)", report.removed);
    }
}

pub fn print_interrupted(report: &CleanReport, json: bool) {
    if json {
        let mut value = error_envelope("interrupted");
        value["terminated"] = to_value(&report.terminated);
        print_json(&value);
    } else {
        eprintln!(
            "Interrupted. Cleaned up {} running task(s).",
            report.terminated.len()
        );
    }
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

pub fn print_health(report: &Value, json: bool) {
    if json {
        print_json(report);
        return;
    }
    println!("Status:   {}", text(&report["status"]));
    println!("Version:  {}", text(&report["version"]));
    println!(
        "Platform: {} ({})",
        text(&report["platform"]["os"]),
        text(&report["platform"]["arch"])
    );
    if let Some(error) = report["config"]["error"].as_str() {
        println!("Config:   {}", error);
    }
    let agent = &report["agent"];
    if agent["available"] == true {
        println!("Agent:    {}", text(&agent["path"]));
    } else {
        println!(
            "Agent:    {} not available ({})",
            text(&agent["executable"]),
            text(&agent["error"])
        );
    }
}

pub fn print_info(info: &Value, json: bool) {
    if json {
        print_json(info);
        return;
    }
    println!("{} {}", text(&info["name"]), text(&info["version"]));
    println!("{}", text(&info["description"]));
    println!();
    println!("RPC methods ({}):", text(&info["protocol"]));
    for method in info["methods"].as_array().into_iter().flatten() {
        println!("  {}", text(method));
    }
}

pub fn print_schema(schema: &Value, json: bool) {
    if json {
        print_json(schema);
        return;
    }
    for line in schema_lines(schema) {
        println!("{}", line);
    }
}

fn schema_lines(schema: &Value) -> Vec<String> {
    let mut lines = vec!["Commands:".to_string()];
    let commands = schema["cli"]["commands"].as_object().into_iter().flatten();
    for (name, command) in commands {
        lines.push(format!("  {:<10} {}", name, text(&command["help"])));
        let params = command["parameters"].as_object().into_iter().flatten();
        for (param, spec) in params {
            let required = if spec["required"] == true { " (required)" } else { "" };
            lines.push(format!(
                "      {} <{}>{}  {}",
                param,
                text(&spec["type"]),
                required,
                text(&spec["help"])
            ));
        }
    }

    lines.push(String::new());
    lines.push("RPC methods:".to_string());
    let functions = schema["rpc"]["functions"].as_object().into_iter().flatten();
    for (name, function) in functions {
        lines.push(format!("  {:<17} {}", name, text(&function["description"])));
        let parameters = &function["parameters"];
        let required = parameters["required"].as_array();
        let params = parameters["properties"].as_object().into_iter().flatten();
        for (param, spec) in params {
            let is_required = required.is_some_and(|names| names.contains(&json!(param)));
            lines.push(format!(
                "      {} <{}>{}",
                param,
                text(&spec["type"]),
                if is_required { " (required)" } else { "" }
            ));
        }
    }
    lines
}

fn task_line(record: &TaskRecord) -> String {
    let mut line = format!("{} {:<9} {}", record.status.symbol(), record.status, record.name);
    if let Some(seconds) = record.execution_time {
        line.push_str(&format!("  ({:.1}s)", seconds));
    }
    if let Some(error) = record.error.as_deref().filter(|e| !e.is_empty()) {
        let first = error.lines().next().unwrap_or_default();
        line.push_str(&format!("  {}", first));
    }
    line
}
