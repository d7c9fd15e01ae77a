//! Task-list splitting
//!
//! A task list is markdown with one section per task:
//!
//! ```text
//! ## Task 1: Set up the project
//! body...
//! ## Task 2: Write tests
//! body...
//! ```
//!
//! Each section becomes `tasks/NNN_slug.md` and a `pending` record.

use crate::state::StateStore;
use crate::task::{TaskStatus, TaskUpdate};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use taskrunner_foundation::{Error, ProjectLayout, Result};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTask {
    /// Number as written in the header
    pub number: String,
    pub title: String,
    pub body: String,
}

impl ParsedTask {
    /// `NNN_slug.md`
    pub fn file_name(&self) -> String {
        format!("{:0>3}_{}.md", self.number, slug(&self.title))
    }

    pub fn content(&self) -> String {
        format!("# {}\n\n{}", self.title, self.body)
    }
}

fn header_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?m)^##\s*Task\s+(\d+):[ \t]*([^\r\n]+)").ok())
        .as_ref()
}

/// Lower-cased title with whitespace and path separators replaced by `_`
pub fn slug(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Split a task list into sections. No headers means no tasks.
pub fn parse_sections(content: &str) -> Vec<ParsedTask> {
    let Some(pattern) = header_pattern() else {
        return Vec::new();
    };
    let headers: Vec<_> = pattern.captures_iter(content).collect();
    let mut tasks = Vec::with_capacity(headers.len());

    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(number), Some(title)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let body_end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(content.len());

        tasks.push(ParsedTask {
            number: number.as_str().to_string(),
            title: title.as_str().trim().to_string(),
            body: content[whole.end()..body_end].trim().to_string(),
        });
    }
    tasks
}

/// Write one task file per section into `layout.tasks_dir()` and register
/// each as `pending`
pub fn split_task_list(
    task_list: &Path,
    layout: &ProjectLayout,
    state: &mut StateStore,
) -> Result<Vec<PathBuf>> {
    info!("Parsing task list: {}", task_list.display());
    let content = std::fs::read_to_string(task_list).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            Error::NotFound(format!("task list {}", task_list.display()))
        }
        _ => Error::Io(e),
    })?;

    layout.ensure()?;
    let mut created = Vec::new();
    for task in parse_sections(&content) {
        let path = layout.tasks_dir().join(task.file_name());
        std::fs::write(&path, task.content())?;

        let name = taskrunner_foundation::file_stem(&path);
        state.update(
            &name,
            TaskStatus::Pending,
            TaskUpdate::files(
                path.clone(),
                layout.result_file(&path),
                layout.error_file(&path),
            )
            .with_title(task.title.clone()),
        );
        info!("Created task file: {}", path.display());
        created.push(path);
    }
    Ok(created)
}
