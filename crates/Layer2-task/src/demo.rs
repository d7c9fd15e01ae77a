//! Offline content generation
//!
//! Used when demo mode is requested (or the agent cannot be found and
//! fallback is enabled). Output is placeholder text chosen by the task
//! name; the engine still drives the full state lifecycle around it.

use rand::Rng;
use std::time::Duration;
use taskrunner_foundation::DemoConfig;

pub trait ContentGenerator: Send + Sync {
    /// Placeholder result text for `task_name`
    fn generate(&self, task_name: &str) -> String;

    /// Simulated processing time
    fn delay(&self) -> Duration;
}

/// Picks a canned template by substring of the task name
#[derive(Debug, Clone)]
pub struct TemplateContentGenerator {
    config: DemoConfig,
}

impl TemplateContentGenerator {
    pub fn new(config: DemoConfig) -> Self {
        Self { config }
    }
}

impl Default for TemplateContentGenerator {
    fn default() -> Self {
        Self::new(DemoConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Template {
    Analysis,
    Documentation,
    Tests,
    Cli,
    Generic,
}

impl Template {
    fn for_task(task_name: &str) -> Self {
        let name = task_name.to_lowercase();
        if name.contains("analyze") {
            Template::Analysis
        } else if name.contains("documentation") {
            Template::Documentation
        } else if name.contains("test") {
            Template::Tests
        } else if name.contains("cli") {
            Template::Cli
        } else {
            Template::Generic
        }
    }

    fn body(&self, task_name: &str) -> String {
        match self {
            Template::Analysis => "\
## Structure Analysis

The project is split into three layers:

1. **Interface**: command-line entry point and output formatting
2. **Engine**: task lifecycle, process supervision, state
3. **Foundation**: configuration, storage, errors

### Key Components

- **ExecutionEngine**: runs one task and records its outcome
- **BatchRunner**: walks the task directory in order
- **StateStore**: persists task records as JSON
"
            .to_string(),
            Template::Documentation => "\
## Documentation Template

```rust
/// One-line summary of what the function does.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the input does not exist.
///
/// # Examples
///
/// ```
/// let value = function_name(\"example\", 123)?;
/// ```
pub fn function_name(name: &str, count: u32) -> Result<Output> {
    todo!()
}
```
"
            .to_string(),
            Template::Tests => "\
## Unit Test Example

```rust
#[tokio::test]
async fn test_run_task_completes() {
    let dir = tempfile::tempdir().unwrap();
    let task = dir.path().join(\"tasks\").join(\"001_demo.md\");
    std::fs::create_dir_all(task.parent().unwrap()).unwrap();
    std::fs::write(&task, \"Say hello\").unwrap();

    let (success, record) = engine.run_task(&task, timeout, &options).await;

    assert!(success);
    assert_eq!(record.status, TaskStatus::Completed);
}
```
"
            .to_string(),
            Template::Cli => "\
## CLI Example

```rust
#[derive(Parser)]
struct Cli {
    /// Task list to split before running
    task_list: Option<PathBuf>,

    /// Base directory for tasks and results
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Per-task timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Simulate the agent
    #[arg(long)]
    demo: bool,
}
```
"
            .to_string(),
            Template::Generic => format!(
                "This is a demo response generated without running the agent.\n\n\
                 Task content would be processed from: {}\n",
                task_name
            ),
        }
    }
}

impl ContentGenerator for TemplateContentGenerator {
    fn generate(&self, task_name: &str) -> String {
        let template = Template::for_task(task_name);
        format!(
            "# Simulated output for {}\n\n{}",
            task_name,
            template.body(task_name)
        )
    }

    fn delay(&self) -> Duration {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms.max(min);
        let ms = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_selection() {
        assert_eq!(Template::for_task("001_Analyze_code"), Template::Analysis);
        assert_eq!(Template::for_task("002_write_documentation"), Template::Documentation);
        assert_eq!(Template::for_task("003_add_tests"), Template::Tests);
        assert_eq!(Template::for_task("004_build_cli"), Template::Cli);
        assert_eq!(Template::for_task("005_misc"), Template::Generic);
    }

    #[test]
    fn test_generated_header() {
        let text = TemplateContentGenerator::default().generate("005_misc");
        assert!(text.starts_with("# Simulated output for 005_misc\n\n"));
        assert!(text.contains("005_misc\n"));
    }

    #[test]
    fn test_delay_within_bounds() {
        let generator = TemplateContentGenerator::new(DemoConfig {
            min_delay_ms: 10,
            max_delay_ms: 20,
        });
        for _ in 0..20 {
            let d = generator.delay();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }

        let fixed = TemplateContentGenerator::new(DemoConfig {
            min_delay_ms: 30,
            max_delay_ms: 5,
        });
        assert_eq!(fixed.delay(), Duration::from_millis(30));
    }
}
