//! Streaming (PTY) mode against a fake agent
//!
//! Needs a pseudo-terminal, so ignored by default:
//! `cargo test -p taskrunner-task --test pty_test -- --ignored`

#![cfg(unix)]

mod common;

use common::{config_for, Project};
use std::time::Duration;
use taskrunner_task::{RunOptions, TaskStatus};

#[tokio::test]
#[ignore = "requires a pseudo-terminal"]
async fn test_streaming_routes_lines() {
    let project = Project::new();
    let agent = project.agent(
        "cat > /dev/null\n\
         echo '{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"hello\"}]}}'\n\
         echo '[ERROR] something broke'\n\
         echo '{\"type\":\"system\"}'",
    );
    let task = project.task("001_stream.md", "stream please");
    let mut manager = project.manager(config_for(&agent));
    let options = RunOptions {
        streaming: true,
        ..Default::default()
    };

    let (success, record) = manager
        .run_task(&task, Duration::from_secs(10), &options)
        .await;

    assert!(success);
    assert_eq!(record.status, TaskStatus::Completed);
    let result = std::fs::read_to_string(record.result_file.unwrap()).unwrap();
    let error = std::fs::read_to_string(record.error_file.unwrap()).unwrap();
    assert!(result.contains("hello"));
    assert!(!result.contains("system"));
    assert!(error.contains("[ERROR] something broke"));
}

#[tokio::test]
#[ignore = "requires a pseudo-terminal"]
async fn test_streaming_timeout() {
    let project = Project::new();
    let agent = project.agent("echo working\nsleep 30");
    let task = project.task("001_stuck.md", "x");
    let mut manager = project.manager(config_for(&agent));
    let options = RunOptions {
        streaming: true,
        ..Default::default()
    };

    let (success, record) = manager
        .run_task(&task, Duration::from_secs(1), &options)
        .await;

    assert!(!success);
    assert_eq!(record.status, TaskStatus::Timeout);
    let result = std::fs::read_to_string(record.result_file.unwrap()).unwrap();
    assert!(result.contains("working"));
    assert!(result.contains("[TIMEOUT:"));
}
