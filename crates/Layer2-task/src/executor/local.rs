//! Redirect launcher - plain child process with file-backed stdio
//!
//! stdin is bound to the task file, stdout/stderr straight to the result
//! and error files. Nothing is buffered in this process.

use super::spec::{OutputSink, ProcessSpec, StdinSource};
use super::{Launcher, RunningProcess};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use taskrunner_foundation::{Error, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectLauncher;

impl RedirectLauncher {
    pub fn new() -> Self {
        Self
    }
}

fn sink_stdio(sink: &OutputSink) -> Result<Stdio> {
    Ok(match sink.open()? {
        Some(file) => Stdio::from(file),
        None => Stdio::null(),
    })
}

#[async_trait]
impl Launcher for RedirectLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> Result<Box<dyn RunningProcess>> {
        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args)
            .stdout(sink_stdio(&spec.stdout_sink)?)
            .stderr(sink_stdio(&spec.stderr_sink)?)
            .kill_on_drop(true);
        // own group: a terminal Ctrl-C must not reach the agent before the
        // supervisor can walk and kill its tree
        #[cfg(unix)]
        cmd.process_group(0);

        match &spec.stdin_source {
            StdinSource::File(path) => {
                let file = std::fs::File::open(path).map_err(|e| {
                    Error::Launch(format!("Failed to open task file {}: {}", path.display(), e))
                })?;
                cmd.stdin(Stdio::from(file));
            }
            StdinSource::Text(_) => {
                cmd.stdin(Stdio::piped());
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Launch(format!("Failed to spawn {}: {}", spec.display(), e)))?;

        let feeder = match (&spec.stdin_source, child.stdin.take()) {
            (StdinSource::Text(text), Some(mut stdin)) => {
                let text = text.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = stdin.write_all(text.as_bytes()).await {
                        debug!("Agent closed stdin early: {}", e);
                    }
                    // dropping stdin delivers EOF
                }))
            }
            _ => None,
        };

        debug!(pid = ?child.id(), "Spawned {}", spec.display());
        Ok(Box::new(RedirectProcess { child, feeder }))
    }

    fn name(&self) -> &'static str {
        "redirect"
    }
}

struct RedirectProcess {
    child: Child,
    feeder: Option<JoinHandle<()>>,
}

#[async_trait]
impl RunningProcess for RedirectProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> Result<Option<i32>> {
        self.child
            .try_wait()
            .map(|status| status.map(exit_code))
            .map_err(|e| Error::Process(format!("Failed to poll agent: {}", e)))
    }

    async fn kill(&mut self) -> Result<()> {
        if let Err(e) = self.child.start_kill() {
            // already exited
            debug!("Kill on finished child: {}", e);
        }
        self.child
            .wait()
            .await
            .map(|_| ())
            .map_err(|e| Error::Process(format!("Failed to reap agent: {}", e)))
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
            if let Err(e) = feeder.await {
                if !e.is_cancelled() {
                    warn!("stdin feeder failed: {}", e);
                }
            }
        }
        Ok(())
    }
}

/// Exit code, or `128 + signal` for a signal-terminated child on unix
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait(process: &mut Box<dyn RunningProcess>) -> i32 {
        loop {
            if let Some(code) = process.try_wait().unwrap() {
                return code;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_redirects_stdio_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("task.md");
        std::fs::write(&input, "hello agent\n").unwrap();
        let out = dir.path().join("results").join("task.result");
        let err = dir.path().join("results").join("task.error");

        let spec = ProcessSpec::new("/bin/sh", StdinSource::File(input))
            .args(["-c", "cat; echo oops >&2; exit 3"])
            .stdout(OutputSink::File(out.clone()))
            .stderr(OutputSink::File(err.clone()));

        let mut process = RedirectLauncher::new().launch(&spec).await.unwrap();
        assert!(process.pid().is_some());
        assert_eq!(wait(&mut process).await, 3);
        process.finish().await.unwrap();

        assert_eq!(std::fs::read_to_string(out).unwrap(), "hello agent\n");
        assert_eq!(std::fs::read_to_string(err).unwrap(), "oops\n");
    }

    #[tokio::test]
    async fn test_text_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let spec = ProcessSpec::new("/bin/cat", StdinSource::Text("/clear\n".into()))
            .stdout(OutputSink::File(out.clone()));

        let mut process = RedirectLauncher::new().launch(&spec).await.unwrap();
        assert_eq!(wait(&mut process).await, 0);
        process.finish().await.unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "/clear\n");
    }

    #[tokio::test]
    async fn test_kill_reports_signal() {
        let spec = ProcessSpec::new("/bin/sleep", StdinSource::Text(String::new())).args(["5"]);
        let mut process = RedirectLauncher::new().launch(&spec).await.unwrap();
        process.kill().await.unwrap();
        assert_eq!(process.try_wait().unwrap(), Some(128 + libc::SIGKILL));
    }

    #[tokio::test]
    async fn test_agent_leads_its_own_group() {
        let spec = ProcessSpec::new("/bin/sleep", StdinSource::Text(String::new())).args(["5"]);
        let mut process = RedirectLauncher::new().launch(&spec).await.unwrap();
        let pid = process.pid().unwrap() as libc::pid_t;
        // SAFETY: getpgid(2) has no memory-safety preconditions
        let pgid = unsafe { libc::getpgid(pid) };
        process.kill().await.unwrap();
        assert_eq!(pgid, pid);
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let spec = ProcessSpec::new("/no/such/agent", StdinSource::Text(String::new()));
        let result = RedirectLauncher::new().launch(&spec).await;
        assert!(matches!(result, Err(Error::Launch(_))));
    }
}
