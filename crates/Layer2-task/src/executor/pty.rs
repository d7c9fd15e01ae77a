//! PTY launcher - runs the agent under a pseudo-terminal and streams its
//! output into the result/error files line by line.
//!
//! Some agents only flush output when attached to a terminal, so this is
//! the streaming mode. The task text is typed into the terminal followed
//! by an end-of-transmission byte. A blocking reader thread strips ANSI
//! escapes, splits lines, and routes each line through a
//! [`LineClassifier`]. Files are flushed after every line so a tailing
//! reader sees live progress.

use super::classify::{Channel, LineClassifier};
use super::spec::ProcessSpec;
use super::{Launcher, RunningProcess};
use async_trait::async_trait;
use portable_pty::{native_pty_system, Child as PtyChild, CommandBuilder, MasterPty, PtySize};
use std::fs::File;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use taskrunner_foundation::{Error, PtyConfig, Result};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// End-of-transmission (Ctrl-D)
const EOT: u8 = 0x04;

/// How long to wait for the reader to drain after exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct PtyLauncher {
    size: PtyConfig,
    classifier: Arc<dyn LineClassifier>,
}

impl PtyLauncher {
    pub fn new(size: PtyConfig, classifier: Arc<dyn LineClassifier>) -> Self {
        Self { size, classifier }
    }
}

#[async_trait]
impl Launcher for PtyLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> Result<Box<dyn RunningProcess>> {
        let input = spec.stdin_source.read_to_string()?;
        let result_file = spec.stdout_sink.open()?;
        let error_file = spec.stderr_sink.open()?;

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: self.size.rows,
                cols: self.size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::Launch(format!("Failed to open PTY: {}", e)))?;

        #[cfg(unix)]
        {
            if let Some(fd) = pair.master.as_raw_fd() {
                disable_echo(fd);
            }
        }

        let mut cmd = CommandBuilder::new(&spec.executable);
        for arg in &spec.args {
            cmd.arg(arg);
        }
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::Launch(format!("Failed to spawn {}: {}", spec.display(), e)))?;
        // only the child holds the slave end now, so reads hit EOF on exit
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::Launch(format!("Failed to clone PTY reader: {}", e)))?;
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::Launch(format!("Failed to take PTY writer: {}", e)))?;

        let classifier = Arc::clone(&self.classifier);
        let reader_handle = tokio::task::spawn_blocking(move || {
            let mut sinks = LineSinks {
                result: result_file,
                error: error_file,
            };
            pump_lines(reader, classifier.as_ref(), &mut sinks);
        });

        let writer_handle = tokio::task::spawn_blocking(move || {
            let mut payload = input.into_bytes();
            if !payload.ends_with(b"\n") {
                payload.push(b'\n');
            }
            payload.push(EOT);
            if let Err(e) = writer.write_all(&payload).and_then(|_| writer.flush()) {
                debug!("PTY input not fully delivered: {}", e);
            }
            writer
        });

        let pid = child.process_id();
        debug!(?pid, "Spawned under PTY: {}", spec.display());

        Ok(Box::new(PtyProcess {
            child,
            _master: pair.master,
            pid,
            reader: Some(reader_handle),
            writer: Some(writer_handle),
        }))
    }

    fn name(&self) -> &'static str {
        "pty"
    }
}

struct PtyProcess {
    child: Box<dyn PtyChild + Send + Sync>,
    // keeps the terminal open while the child runs
    _master: Box<dyn MasterPty + Send>,
    pid: Option<u32>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<Box<dyn Write + Send>>>,
}

#[async_trait]
impl RunningProcess for PtyProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_wait(&mut self) -> Result<Option<i32>> {
        self.child
            .try_wait()
            .map(|status| status.map(|s| s.exit_code() as i32))
            .map_err(|e| Error::Process(format!("Failed to poll agent: {}", e)))
    }

    async fn kill(&mut self) -> Result<()> {
        if let Err(e) = self.child.kill() {
            debug!("Kill on finished PTY child: {}", e);
        }
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while self.try_wait()?.is_none() {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Process("PTY child did not exit after kill".into()));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            // the writer returns promptly once the child is gone
            if tokio::time::timeout(DRAIN_TIMEOUT, writer).await.is_err() {
                debug!("PTY writer still blocked after exit");
            }
        }
        if let Some(reader) = self.reader.take() {
            match tokio::time::timeout(DRAIN_TIMEOUT, reader).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("PTY reader failed: {}", e),
                Err(_) => warn!("PTY output still open {:?} after exit", DRAIN_TIMEOUT),
            }
        }
        Ok(())
    }
}

struct LineSinks {
    result: Option<File>,
    error: Option<File>,
}

impl LineSinks {
    fn write(&mut self, channel: Channel, text: &str) {
        let sink = match channel {
            Channel::Result => self.result.as_mut(),
            Channel::Error => self.error.as_mut(),
        };
        if let Some(file) = sink {
            if let Err(e) = writeln!(file, "{}", text).and_then(|_| file.flush()) {
                warn!("Failed to write streamed output: {}", e);
            }
        }
    }
}

/// Read until EOF, emitting each complete line (CR or LF terminated)
fn pump_lines(
    mut reader: Box<dyn Read + Send>,
    classifier: &dyn LineClassifier,
    sinks: &mut LineSinks,
) {
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();

    let emit = |raw: &[u8], sinks: &mut LineSinks| {
        let text = String::from_utf8_lossy(raw);
        let clean = strip_ansi_escapes::strip_str(&text);
        for (channel, line) in classifier.classify(&clean) {
            sinks.write(channel, &line);
        }
    };

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while let Some(pos) = pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    emit(&line[..line.len() - 1], sinks);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side closes on Linux
            Err(_) => break,
        }
    }
    if !pending.is_empty() {
        emit(&pending, sinks);
    }
}

#[cfg(unix)]
fn disable_echo(fd: std::os::unix::io::RawFd) {
    // SAFETY: fd is a live PTY master owned by the caller; termios is
    // plain data filled by tcgetattr before use.
    unsafe {
        let mut termios: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut termios) != 0 {
            debug!("tcgetattr failed on PTY");
            return;
        }
        termios.c_lflag &= !(libc::ECHO | libc::ECHONL);
        if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
            debug!("tcsetattr failed on PTY");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::classify::{PlainClassifier, StreamJsonClassifier};

    fn pump(input: &'static [u8], classifier: &dyn LineClassifier) -> (String, String) {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let err = dir.path().join("err");
        let mut sinks = LineSinks {
            result: Some(File::create(&out).unwrap()),
            error: Some(File::create(&err).unwrap()),
        };
        pump_lines(Box::new(input), classifier, &mut sinks);
        drop(sinks);
        (
            std::fs::read_to_string(out).unwrap(),
            std::fs::read_to_string(err).unwrap(),
        )
    }

    #[test]
    fn test_pump_splits_and_strips() {
        let (out, err) = pump(
            b"\x1b[32mgreen\x1b[0m\r\nsecond\r[ERROR] bad\ntail",
            &StreamJsonClassifier,
        );
        assert_eq!(out, "green\nsecond\ntail\n");
        assert_eq!(err, "[ERROR] bad\n");
    }

    #[test]
    fn test_pump_plain() {
        let (out, err) = pump(b"a\n\nb\n", &PlainClassifier);
        assert_eq!(out, "a\nb\n");
        assert!(err.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    #[ignore = "requires a pseudo-terminal"]
    async fn test_pty_streams_task_input() {
        use crate::executor::spec::{OutputSink, StdinSource};

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("task.result");
        let spec = ProcessSpec::new("/bin/cat", StdinSource::Text("line one".into()))
            .stdout(OutputSink::File(out.clone()))
            .interactive(true);

        let launcher = PtyLauncher::new(PtyConfig::default(), Arc::new(PlainClassifier));
        let mut process = launcher.launch(&spec).await.unwrap();
        let code = loop {
            if let Some(code) = process.try_wait().unwrap() {
                break code;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        process.finish().await.unwrap();

        assert_eq!(code, 0);
        assert!(std::fs::read_to_string(out).unwrap().contains("line one"));
    }
}
