// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::os;
use crate::{errors::ChildStartError, outcome::ExitKind, time::stopwatch};
use bytes::{Bytes, BytesMut};
use camino::Utf8Path;
use std::{future::Future, io, process::Stdio, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{ChildStderr, ChildStdin, ChildStdout},
};
use tracing::{debug, warn};

/// The capability to run a program with bounded time, feeding it input and capturing its output.
///
/// Implementations must guarantee that a program which exceeds `timeout` is terminated and
/// reaped before the returned future completes.
pub trait ProcessRunner: Send + Sync {
    /// Runs `program` with `input` on standard input, for at most `timeout`.
    fn run_with_timeout(
        &self,
        program: &Utf8Path,
        input: Bytes,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProcessOutput, ChildStartError>> + Send;
}

/// The raw output of a process run through a [`ProcessRunner`].
#[derive(Clone, Debug)]
pub struct ProcessOutput {
    /// How the process exited.
    pub exit: ExitKind,

    /// Captured standard output.
    pub stdout: Bytes,

    /// Captured standard error.
    pub stderr: Bytes,

    /// Wall-clock time between spawning the process and observing its exit.
    pub elapsed: Duration,

    /// True if the process exited but its output pipes were still held open by another process
    /// after the leak timeout.
    pub leaked: bool,
}

/// A [`ProcessRunner`] that starts real processes through tokio.
///
/// On Unix, each program runs in its own process group. On timeout the group receives `SIGTERM`,
/// then `SIGKILL` once the grace period is over. Processes a program leaves behind in its group are
/// killed once its output has been drained. On Windows the process is killed outright.
#[derive(Clone, Debug)]
pub struct TokioProcessRunner {
    grace_period: Duration,
    leak_timeout: Duration,
}

impl TokioProcessRunner {
    /// How long to keep reading output after a process exits, by default.
    pub const DEFAULT_LEAK_TIMEOUT: Duration = Duration::from_millis(100);

    /// Creates a new runner with the given grace period between `SIGTERM` and `SIGKILL`.
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            leak_timeout: Self::DEFAULT_LEAK_TIMEOUT,
        }
    }

    /// Sets how long to keep reading output after a process exits.
    pub fn with_leak_timeout(mut self, leak_timeout: Duration) -> Self {
        self.leak_timeout = leak_timeout;
        self
    }
}

impl ProcessRunner for TokioProcessRunner {
    async fn run_with_timeout(
        &self,
        program: &Utf8Path,
        input: Bytes,
        timeout: Duration,
    ) -> Result<ProcessOutput, ChildStartError> {
        let mut cmd = std::process::Command::new(program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        os::set_process_group(&mut cmd);

        let mut cmd = tokio::process::Command::from(cmd);
        // Make sure the child doesn't outlive an error return.
        cmd.kill_on_drop(true);

        let stopwatch = stopwatch();
        let mut child = cmd
            .spawn()
            .map_err(|err| ChildStartError::Spawn(Arc::new(err)))?;
        // The id is cleared once the child is reaped, but the group outlives the leader.
        let pid = child.id();

        let stdin_task = child
            .stdin
            .take()
            .map(|stdin| tokio::spawn(feed_stdin(stdin, input)));
        let mut pipes = ChildPipes::new(child.stdout.take(), child.stderr.take());

        let mut deadline = std::pin::pin!(tokio::time::sleep(timeout));
        let wait_res = loop {
            tokio::select! {
                () = pipes.fill_buf(), if !pipes.is_done() => {}
                res = child.wait() => break Some(res),
                () = &mut deadline => break None,
            }
        };

        let (exit, elapsed) = match wait_res {
            Some(res) => {
                let status = res.map_err(|err| ChildStartError::Wait(Arc::new(err)))?;
                (ExitKind::from_exit_status(status), stopwatch.snapshot().duration)
            }
            None => {
                let result = os::terminate_child(&mut child, &mut pipes, self.grace_period).await;
                debug!(?result, "terminated `{program}` after timeout of {timeout:?}");
                // Always reap the child.
                child
                    .wait()
                    .await
                    .map_err(|err| ChildStartError::Wait(Arc::new(err)))?;
                (ExitKind::TimedOut, timeout)
            }
        };

        let leaked = pipes.drain(self.leak_timeout).await;
        if leaked {
            warn!(
                "`{program}` exited, but its output was still open after {:?}; \
                 using output captured so far",
                self.leak_timeout,
            );
        }
        // Anything the program left running in its group must not outlive the run.
        if let Some(pid) = pid {
            os::kill_process_group(pid);
        }

        // A program that exits without reading all its input leaves the writer blocked.
        if let Some(stdin_task) = stdin_task {
            stdin_task.abort();
        }

        pipes.into_output(exit, elapsed, leaked)
    }
}

async fn feed_stdin(mut stdin: ChildStdin, input: Bytes) {
    match stdin.write_all(&input).await {
        Ok(()) => {}
        // The program closed its standard input without reading all of it.
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
        Err(err) => debug!("error writing to standard input: {err}"),
    }
    // Dropping stdin here closes the pipe, so the program sees end of file.
}

/// The size of each read from a child's output pipes.
const CHUNK_SIZE: usize = 4 * 1024;

/// Accumulates a child's standard output and standard error as it is produced.
pub(super) struct ChildPipes {
    stdout: PipeReader<ChildStdout>,
    stderr: PipeReader<ChildStderr>,
    error: Option<ChildStartError>,
}

impl ChildPipes {
    fn new(stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) -> Self {
        Self {
            stdout: PipeReader::new(stdout),
            stderr: PipeReader::new(stderr),
            error: None,
        }
    }

    pub(super) fn is_done(&self) -> bool {
        self.stdout.is_done() && self.stderr.is_done()
    }

    /// Reads the next chunk from whichever pipe is ready first.
    pub(super) async fn fill_buf(&mut self) {
        tokio::select! {
            res = self.stdout.fill(), if !self.stdout.is_done() => {
                if let Err(err) = res {
                    self.error.get_or_insert(ChildStartError::ReadStdout(Arc::new(err)));
                }
            }
            res = self.stderr.fill(), if !self.stderr.is_done() => {
                if let Err(err) = res {
                    self.error.get_or_insert(ChildStartError::ReadStderr(Arc::new(err)));
                }
            }
            else => {}
        }
    }

    /// Reads until both pipes are closed or `leak_timeout` elapses. Returns true if the timeout
    /// was hit.
    async fn drain(&mut self, leak_timeout: Duration) -> bool {
        let mut sleep = std::pin::pin!(tokio::time::sleep(leak_timeout));
        loop {
            tokio::select! {
                biased;

                () = self.fill_buf(), if !self.is_done() => {}
                () = &mut sleep, if !self.is_done() => break true,
                else => break false,
            }
        }
    }

    fn into_output(
        self,
        exit: ExitKind,
        elapsed: Duration,
        leaked: bool,
    ) -> Result<ProcessOutput, ChildStartError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(ProcessOutput {
            exit,
            stdout: self.stdout.buf.freeze(),
            stderr: self.stderr.buf.freeze(),
            elapsed,
            leaked,
        })
    }
}

struct PipeReader<R> {
    reader: Option<R>,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> PipeReader<R> {
    fn new(reader: Option<R>) -> Self {
        Self {
            reader,
            buf: BytesMut::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.reader.is_none()
    }

    async fn fill(&mut self) -> io::Result<()> {
        let Some(reader) = &mut self.reader else {
            return Ok(());
        };
        self.buf.reserve(CHUNK_SIZE);
        let res = reader.read_buf(&mut self.buf).await;
        match res {
            Ok(0) => {
                self.reader = None;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(err) => {
                self.reader = None;
                Err(err)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::outcome::FailureStatus;
    use camino_tempfile::Utf8TempDir;
    use camino::Utf8PathBuf;
    use indoc::indoc;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Utf8TempDir, name: &str, body: &str) -> Utf8PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_captures_output_and_exit() {
        let dir = Utf8TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "sum",
            indoc! {r#"
                read n
                read a b c
                echo $((a + b + c))
                echo "diagnostic" >&2
                exit 3
            "#},
        );

        let runner = TokioProcessRunner::new(Duration::from_millis(100));
        let output = runtime()
            .block_on(runner.run_with_timeout(
                &script,
                Bytes::from_static(b"3\n1 2 3\n"),
                Duration::from_secs(10),
            ))
            .unwrap();

        assert_eq!(
            output.exit,
            ExitKind::Failed {
                status: FailureStatus::ExitCode(3)
            }
        );
        assert_eq!(&output.stdout[..], b"6\n");
        assert_eq!(&output.stderr[..], b"diagnostic\n");
        assert!(!output.leaked);
        assert!(output.elapsed < Duration::from_secs(10));
    }

    #[test]
    fn test_program_ignoring_input() {
        let dir = Utf8TempDir::new().unwrap();
        let script = write_script(&dir, "quiet", "echo done\n");

        // Far more input than a pipe buffer holds.
        let input = Bytes::from(vec![b'x'; 4 * 1024 * 1024]);
        let runner = TokioProcessRunner::new(Duration::from_millis(100));
        let output = runtime()
            .block_on(runner.run_with_timeout(&script, input, Duration::from_secs(10)))
            .unwrap();

        assert_eq!(output.exit, ExitKind::Success);
        assert_eq!(&output.stdout[..], b"done\n");
    }

    #[test]
    fn test_timeout_reports_configured_duration() {
        let dir = Utf8TempDir::new().unwrap();
        let script = write_script(&dir, "spin", "echo partial\nwhile :; do :; done\n");

        let runner = TokioProcessRunner::new(Duration::ZERO);
        let timeout = Duration::from_millis(300);
        let output = runtime()
            .block_on(runner.run_with_timeout(&script, Bytes::new(), timeout))
            .unwrap();

        assert_eq!(output.exit, ExitKind::TimedOut);
        assert_eq!(output.elapsed, timeout);
        assert_eq!(&output.stdout[..], b"partial\n");
    }

    #[test]
    fn test_background_children_are_killed() {
        let dir = Utf8TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        // The background job inherits stdout, so the pipes stay open after the script exits.
        let script = write_script(
            &dir,
            "spawner",
            &format!("(sleep 1; echo late > '{marker}') &\necho 1\n"),
        );

        let runner = TokioProcessRunner::new(Duration::ZERO);
        let output = runtime()
            .block_on(runner.run_with_timeout(&script, Bytes::new(), Duration::from_secs(5)))
            .unwrap();

        assert_eq!(output.exit, ExitKind::Success);
        assert!(output.leaked, "background job holds the output pipes");
        assert_eq!(&output.stdout[..], b"1\n");

        std::thread::sleep(Duration::from_millis(1500));
        assert!(
            !marker.exists(),
            "background job should have been killed with its process group"
        );
    }

    #[test]
    fn test_spawn_failure() {
        let dir = Utf8TempDir::new().unwrap();
        let runner = TokioProcessRunner::new(Duration::ZERO);
        let err = runtime()
            .block_on(runner.run_with_timeout(
                &dir.path().join("missing"),
                Bytes::new(),
                Duration::from_secs(1),
            ))
            .unwrap_err();
        assert!(matches!(err, ChildStartError::Spawn(_)), "{err:?}");
    }
}
