//! Durable task state
//!
//! A single JSON document (`task_state.json`) maps task name to
//! [`TaskRecord`]. Every mutation rewrites the whole file. There is no
//! locking: one runner per base directory at a time.

use crate::task::{ExecutionSummary, TaskRecord, TaskStatus, TaskUpdate};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use taskrunner_foundation::JsonStore;
use tracing::{debug, warn};

pub type TaskMap = BTreeMap<String, TaskRecord>;

/// In-memory cache of the state document plus its on-disk location
#[derive(Debug)]
pub struct StateStore {
    store: JsonStore,
    filename: String,
    records: TaskMap,
}

impl StateStore {
    /// Open the state file, starting empty if it is missing or unreadable
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| taskrunner_foundation::layout::STATE_FILE.to_string());

        let mut state = Self {
            store: JsonStore::new(dir),
            filename,
            records: TaskMap::new(),
        };
        state.records = state.load();
        state
    }

    pub fn path(&self) -> PathBuf {
        self.store.file_path(&self.filename)
    }

    /// Read the document from disk. Never fails: a missing file is empty
    /// state, a malformed one is logged and treated as empty.
    pub fn load(&self) -> TaskMap {
        match self.store.load_optional::<TaskMap>(&self.filename) {
            Ok(Some(records)) => {
                debug!(count = records.len(), "Loaded task state");
                records
            }
            Ok(None) => TaskMap::new(),
            Err(e) => {
                warn!("Ignoring unreadable task state {}: {}", self.path().display(), e);
                TaskMap::new()
            }
        }
    }

    /// Write the document. Failures are logged; the in-memory copy stays
    /// authoritative.
    pub fn save(&self) {
        if let Err(e) = self.store.save(&self.filename, &self.records) {
            warn!("Failed to save task state: {}", e);
        }
    }

    /// Reload from disk, discarding the in-memory copy
    pub fn reload(&mut self) {
        self.records = self.load();
    }

    /// The only mutation path: create if new, set status, merge fields,
    /// persist.
    pub fn update(&mut self, name: &str, status: TaskStatus, fields: TaskUpdate) -> TaskRecord {
        let now = Utc::now();
        let record = self
            .records
            .entry(name.to_string())
            .or_insert_with(|| TaskRecord::new(name, now));

        record.status = status;
        // never move backwards if the wall clock does
        record.updated_at = now.max(record.updated_at);
        fields.apply(record);

        let snapshot = record.clone();
        self.save();
        snapshot
    }

    pub fn get(&self, name: &str) -> Option<&TaskRecord> {
        self.records.get(name)
    }

    /// All records, ordered by name
    pub fn records(&self) -> &TaskMap {
        &self.records
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary::from_records(self.records.values())
    }

    /// Drop every record and persist the empty document
    pub fn clear(&mut self) {
        self.records.clear();
        self.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::open(dir.path().join("task_state.json"))
    }

    #[test]
    fn test_update_creates_pending_then_sets_status() {
        let dir = TempDir::new().unwrap();
        let mut state = store(&dir);

        let first = state.update("001_a", TaskStatus::Pending, TaskUpdate::new().with_title("A"));
        assert_eq!(first.status, TaskStatus::Pending);
        assert_eq!(first.title.as_deref(), Some("A"));

        let second = state.update("001_a", TaskStatus::Running, TaskUpdate::new());
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.title.as_deref(), Some("A"));
        assert_eq!(state.records().len(), 1);
    }

    #[test]
    fn test_persists_every_update() {
        let dir = TempDir::new().unwrap();
        let mut state = store(&dir);
        state.update("001_a", TaskStatus::Failed, TaskUpdate::new().with_error("boom"));

        let reopened = store(&dir);
        let record = reopened.get("001_a").unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_corrupted_state_is_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("task_state.json"), "{ not json").unwrap();
        let state = store(&dir);
        assert!(state.records().is_empty());
    }

    #[test]
    fn test_save_load_is_stable() {
        let dir = TempDir::new().unwrap();
        let mut state = store(&dir);
        state.update(
            "001_a",
            TaskStatus::Completed,
            TaskUpdate {
                exit_code: Some(0),
                execution_time: Some(1.25),
                result_size: Some(10),
                ..Default::default()
            },
        );
        state.update("002_b", TaskStatus::Pending, TaskUpdate::new());

        let path = state.path();
        let first: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        let mut reopened = store(&dir);
        reopened.save();
        reopened.reload();
        reopened.save();
        let second: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_save_failure_keeps_memory() {
        let dir = TempDir::new().unwrap();
        // parent is a file, so the write cannot succeed
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut state = StateStore::open(blocker.join("task_state.json"));

        state.update("001_a", TaskStatus::Running, TaskUpdate::new());
        assert_eq!(state.get("001_a").unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let mut state = store(&dir);
        state.update("001_a", TaskStatus::Pending, TaskUpdate::new());
        state.clear();
        assert!(store(&dir).records().is_empty());
    }
}
