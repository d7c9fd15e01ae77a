//! Timeout supervision for a single agent process
//!
//! The supervisor polls the child on a fixed interval. Each tick checks
//! liveness before the deadline, so a process that exits just before the
//! timeout always reports its real exit code. On expiry the whole process
//! tree is killed and a marker is appended to the result file.
//!
//! An [`Interrupt`] stops supervision early. The tree is killed while the
//! root is still alive so every descendant is still reachable through its
//! parent link.

use crate::executor::RunningProcess;
use crate::process_tree::ProcessTree;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskrunner_foundation::{Error, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Exit code recorded for a timed-out task
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Exit code recorded for a task stopped by an interrupt (128 + SIGINT)
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Stop request shared between a caller and the tasks it runs.
///
/// Clones share one flag. Once triggered it stays triggered.
#[derive(Debug, Clone)]
pub struct Interrupt {
    flag: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    pub fn trigger(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once [`Interrupt::trigger`] has been called
    pub async fn triggered(&self) {
        let mut rx = self.flag.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

/// How a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exited on its own
    Exited { code: i32 },
    /// Killed at the deadline; `clean` is false if any kill failed
    TimedOut { clean: bool },
    /// Killed because an [`Interrupt`] fired
    Interrupted { clean: bool },
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Exited { code } => *code,
            Outcome::TimedOut { .. } => TIMEOUT_EXIT_CODE,
            Outcome::Interrupted { .. } => INTERRUPTED_EXIT_CODE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Supervised {
    pub outcome: Outcome,
    pub elapsed: Duration,
}

pub struct TimeoutSupervisor {
    timeout: Duration,
    poll_interval: Duration,
    tree: Arc<dyn ProcessTree>,
    interrupt: Interrupt,
}

impl TimeoutSupervisor {
    pub fn new(timeout: Duration, poll_interval: Duration, tree: Arc<dyn ProcessTree>) -> Self {
        Self {
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            tree,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Wait for `process` to exit or time out.
    ///
    /// `on_children` is called whenever the observed descendant set
    /// changes, so the caller can persist it. `marker_file` receives the
    /// timeout marker.
    pub async fn supervise(
        &self,
        process: &mut dyn RunningProcess,
        started: Instant,
        marker_file: Option<&Path>,
        mut on_children: impl FnMut(&[u32]) + Send,
    ) -> Result<Supervised> {
        let pid = process.pid();
        let mut children: Vec<u32> = Vec::new();

        loop {
            if let Some(code) = process.try_wait()? {
                process.finish().await?;
                let elapsed = started.elapsed();
                debug!(?pid, code, ?elapsed, "Agent exited");
                return Ok(Supervised {
                    outcome: Outcome::Exited { code },
                    elapsed,
                });
            }

            if self.interrupt.is_triggered() {
                let clean = self.terminate(process, pid).await;
                info!(?pid, clean, "Agent stopped by interrupt");
                return Ok(Supervised {
                    outcome: Outcome::Interrupted { clean },
                    elapsed: started.elapsed(),
                });
            }

            let elapsed = started.elapsed();
            if elapsed > self.timeout {
                let clean = self.terminate(process, pid).await;
                let elapsed = started.elapsed();
                if let Some(path) = marker_file {
                    append_timeout_marker(path, self.timeout);
                }
                info!(?pid, clean, "Agent timed out after {:?}", self.timeout);
                return Ok(Supervised {
                    outcome: Outcome::TimedOut { clean },
                    elapsed,
                });
            }

            if let Some(pid) = pid {
                let current = self.descendants(pid).await;
                if current != children {
                    children = current;
                    on_children(&children);
                }
            }

            let remaining = self.timeout.saturating_sub(elapsed);
            let nap = self.poll_interval.min(remaining + Duration::from_millis(1));
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = self.interrupt.triggered() => {}
            }
        }
    }

    async fn descendants(&self, pid: u32) -> Vec<u32> {
        let tree = Arc::clone(&self.tree);
        tokio::task::spawn_blocking(move || {
            tree.refresh();
            let mut found = tree.descendants_of(pid);
            found.sort_unstable();
            found
        })
        .await
        .unwrap_or_default()
    }

    async fn terminate(&self, process: &mut dyn RunningProcess, pid: Option<u32>) -> bool {
        let mut clean = match pid {
            Some(pid) => {
                let tree = Arc::clone(&self.tree);
                tokio::task::spawn_blocking(move || tree.kill_tree(pid))
                    .await
                    .unwrap_or(false)
            }
            None => true,
        };

        if let Err(e) = process.kill().await {
            warn!(?pid, "Failed to reap timed-out agent: {}", e);
            clean = false;
        }
        if let Err(e) = process.finish().await {
            warn!(?pid, "Failed to collect output after timeout: {}", e);
        }
        clean
    }
}

/// Marker appended to the result file of a timed-out task
pub fn timeout_marker(timeout: Duration) -> String {
    format!(
        "\n\n[TIMEOUT: agent process was terminated after {}s]\n",
        timeout.as_secs()
    )
}

fn append_timeout_marker(path: &Path, timeout: Duration) {
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(timeout_marker(timeout).as_bytes()));
    if let Err(e) = result {
        warn!(
            "{}",
            Error::Storage(format!(
                "Failed to append timeout marker to {}: {}",
                path.display(),
                e
            ))
        );
    }
}
