//! Agent launchers
//!
//! Provides two execution backends behind [`Launcher`]:
//! - `RedirectLauncher` - stdio bound directly to the task/result/error files
//! - `PtyLauncher` - pseudo-terminal with incremental, classified output
//!
//! Launch parameters are described by [`ProcessSpec`]; the agent is never
//! started through a shell.

pub mod classify;
pub mod local;
pub mod pty;
pub mod spec;
pub mod r#trait;

pub use classify::{Channel, LineClassifier, PlainClassifier, StreamJsonClassifier};
pub use local::RedirectLauncher;
pub use pty::PtyLauncher;
pub use r#trait::{Launcher, RunningProcess};
pub use spec::{OutputSink, ProcessSpec, StdinSource};
