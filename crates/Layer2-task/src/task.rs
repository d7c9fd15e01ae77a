//! Task records and status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Discovered or parsed, not yet run
    Pending,

    /// Agent process is running
    Running,

    /// Agent exited with code 0
    Completed,

    /// Agent exited nonzero, or launching/monitoring failed
    Failed,

    /// Agent exceeded its time budget and was killed
    Timeout,
}

impl TaskStatus {
    /// Terminal states are never re-run by a batch
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
        }
    }

    /// Get a symbol for the status (for plain-text output)
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "◯",
            TaskStatus::Running => "⟳",
            TaskStatus::Completed => "✓",
            TaskStatus::Failed => "✗",
            TaskStatus::Timeout => "⏱",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted record for one task file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    /// Bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_processes: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_termination: Option<bool>,
}

impl TaskRecord {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            title: None,
            task_file: None,
            result_file: None,
            error_file: None,
            started_at: None,
            completed_at: None,
            exit_code: None,
            execution_time: None,
            result_size: None,
            error: None,
            process_id: None,
            child_processes: Vec::new(),
            clean_termination: None,
        }
    }

    /// Every pid this record still tracks, descendants first
    pub fn tracked_pids(&self) -> Vec<u32> {
        let mut pids = self.child_processes.clone();
        if let Some(pid) = self.process_id {
            if !pids.contains(&pid) {
                pids.push(pid);
            }
        }
        pids
    }
}

/// Fields merged into a record by [`crate::StateStore::update`].
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub task_file: Option<PathBuf>,
    pub result_file: Option<PathBuf>,
    pub error_file: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub execution_time: Option<f64>,
    pub result_size: Option<u64>,
    pub error: Option<String>,
    pub process_id: Option<u32>,
    pub child_processes: Option<Vec<u32>>,
    pub clean_termination: Option<bool>,
    /// Drop `process_id` and `child_processes` (terminal transitions)
    pub clear_processes: bool,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(task_file: PathBuf, result_file: PathBuf, error_file: PathBuf) -> Self {
        Self {
            task_file: Some(task_file),
            result_file: Some(result_file),
            error_file: Some(error_file),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub(crate) fn apply(self, record: &mut TaskRecord) {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field {
                    record.$field = Some(value);
                })*
            };
        }
        merge!(
            title,
            task_file,
            result_file,
            error_file,
            started_at,
            completed_at,
            exit_code,
            execution_time,
            result_size,
            error,
            process_id,
            clean_termination
        );
        if let Some(children) = self.child_processes {
            record.child_processes = children;
        }
        if self.clear_processes {
            record.process_id = None;
            record.child_processes.clear();
        }
    }
}

/// Aggregate counts over all records (derived, never persisted)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub timeout: usize,
    pub pending: usize,
    pub running: usize,
    /// Share of tasks in a terminal state, 0-100
    pub completion_pct: u32,
}

impl ExecutionSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TaskRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.total += 1;
            match record.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Timeout => summary.timeout += 1,
            }
        }
        let finished = summary.completed + summary.failed + summary.timeout;
        summary.completion_pct = (finished * 100 / summary.total.max(1)) as u32;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Timeout.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        let parsed: TaskStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(parsed, TaskStatus::Running);
    }

    #[test]
    fn test_record_omits_unset_fields() {
        let record = TaskRecord::new("001_setup", Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj["status"], "pending");
        assert!(!obj.contains_key("exit_code"));
        assert!(!obj.contains_key("child_processes"));
    }

    #[test]
    fn test_update_merges_and_clears_processes() {
        let mut record = TaskRecord::new("t", Utc::now());
        TaskUpdate {
            process_id: Some(42),
            child_processes: Some(vec![43, 44]),
            ..Default::default()
        }
        .apply(&mut record);
        assert_eq!(record.tracked_pids(), vec![43, 44, 42]);

        TaskUpdate {
            exit_code: Some(0),
            clear_processes: true,
            ..Default::default()
        }
        .apply(&mut record);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.process_id.is_none());
        assert!(record.child_processes.is_empty());
    }

    #[test]
    fn test_summary_percentage() {
        let now = Utc::now();
        let mut records = Vec::new();
        for (name, status) in [
            ("a", TaskStatus::Completed),
            ("b", TaskStatus::Failed),
            ("c", TaskStatus::Pending),
        ] {
            let mut record = TaskRecord::new(name, now);
            record.status = status;
            records.push(record);
        }
        let summary = ExecutionSummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.completion_pct, 66);

        assert_eq!(ExecutionSummary::from_records(&Vec::<TaskRecord>::new()).completion_pct, 0);
    }
}
