//! One pipeline stage bound to a spawned OS process.
//!
//! A [`StageProcess`] is configured by the orchestrator (input lines, redirect
//! files) and then spawned onto its own tokio task. The task runs the program
//! to completion and reports a [`StageOutcome`] over the completion channel.
//! The returned [`StageHandle`] is only used to stop the stage early.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use chainsh_types::{Stage, StageOutcome, StageStatus};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::sink::{FileSink, LineSink, RedirectMode};
use crate::config::OrchestratorConfig;
use crate::error::PipelineResult;

/// Completion signal sent from a stage task to the orchestrator.
#[derive(Debug)]
pub struct StageMessage {
    /// Run the stage belongs to; stale runs are ignored.
    pub generation: u64,
    pub outcome: StageOutcome,
}

/// A configured, not yet running stage.
#[derive(Debug)]
pub struct StageProcess {
    index: usize,
    argv: Vec<String>,
    input: Arc<Vec<String>>,
    stdout: LineSink,
    stderr: LineSink,
    config: Arc<OrchestratorConfig>,
}

impl StageProcess {
    pub fn new(index: usize, stage: &Stage, config: Arc<OrchestratorConfig>) -> Self {
        Self {
            index,
            argv: stage.argv().to_vec(),
            input: Arc::new(Vec::new()),
            stdout: LineSink::default(),
            stderr: LineSink::default(),
            config,
        }
    }

    /// Lines written to the program's stdin. Empty input leaves stdin closed.
    pub fn set_input(&mut self, lines: Arc<Vec<String>>) {
        self.input = lines;
    }

    /// Send stdout to a file instead of memory.
    pub fn set_stdout_file(&mut self, path: &std::path::Path) -> PipelineResult<()> {
        self.stdout = LineSink::File(FileSink::open(path, RedirectMode::Truncate)?);
        Ok(())
    }

    /// Send stderr to a file instead of memory.
    pub fn set_stderr_file(
        &mut self,
        path: &std::path::Path,
        mode: RedirectMode,
    ) -> PipelineResult<()> {
        self.stderr = LineSink::File(FileSink::open(path, mode)?);
        Ok(())
    }

    /// Start the stage on its own task.
    ///
    /// The outcome is sent on `completions` whatever the exit code, and is also
    /// the task's return value so `StageHandle::stop` can collect it.
    pub fn spawn(
        self,
        generation: u64,
        completions: mpsc::UnboundedSender<StageMessage>,
    ) -> StageHandle {
        let index = self.index;
        let (kill_tx, kill_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let outcome = self.run(kill_rx).await;
            // Receiver gone means the run was stopped; nobody is waiting.
            let _ = completions.send(StageMessage {
                generation,
                outcome: outcome.clone(),
            });
            outcome
        });

        StageHandle {
            index,
            kill: Some(kill_tx),
            task: Some(task),
        }
    }

    async fn run(self, mut kill: oneshot::Receiver<()>) -> StageOutcome {
        let StageProcess {
            index,
            argv,
            input,
            mut stdout,
            mut stderr,
            config,
        } = self;

        let Some((program, args)) = argv.split_first() else {
            return StageOutcome::new(index, argv, StageStatus::Failed {
                reason: "stage has no program".to_string(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        if config.clear_env {
            cmd.env_clear();
        }
        cmd.envs(&config.env);
        cmd.stdin(if input.is_empty() {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(stage = index, program = %program, error = %e, "failed to spawn stage");
                let status = StageStatus::Failed {
                    reason: format!("{}: {}", program, e),
                };
                return finish(index, argv, status, stdout, stderr).await;
            }
        };
        tracing::debug!(stage = index, pid = child.id(), program = %program, "stage spawned");

        let stdin = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        // Feed stdin while draining both outputs, so a program that writes
        // before it finishes reading cannot wedge on a full pipe.
        let io = async {
            let (written, out, err) = tokio::join!(
                write_input(stdin, &input),
                drain_lines(stdout_pipe, &mut stdout),
                drain_lines(stderr_pipe, &mut stderr),
            );
            written.and(out).and(err)
        };

        let drained = tokio::select! {
            result = io => Some(result),
            _ = &mut kill => None,
        };
        let Some(io_result) = drained else {
            return stop_child(index, argv, child, stdout, stderr).await;
        };

        let waited = tokio::select! {
            result = child.wait() => Some(result),
            _ = &mut kill => None,
        };
        let Some(wait_result) = waited else {
            return stop_child(index, argv, child, stdout, stderr).await;
        };

        let status = match (io_result, wait_result) {
            (Ok(()), Ok(exit)) => StageStatus::Exited {
                code: exit_code(exit),
            },
            (Err(e), _) => {
                tracing::warn!(stage = index, error = %e, "stage I/O failed");
                StageStatus::Failed {
                    reason: format!("{}: {}", program, e),
                }
            }
            (_, Err(e)) => {
                tracing::warn!(stage = index, error = %e, "failed to wait for stage");
                StageStatus::Failed {
                    reason: format!("{}: failed to wait: {}", program, e),
                }
            }
        };
        tracing::debug!(stage = index, %status, "stage finished");

        finish(index, argv, status, stdout, stderr).await
    }
}

/// Handle to a spawned stage.
#[derive(Debug)]
pub struct StageHandle {
    index: usize,
    kill: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<StageOutcome>>,
}

impl StageHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    /// True once the stage task has returned.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Kill the process and wait until its redirect files are closed.
    ///
    /// Returns the stage's outcome the first time it is called; later calls
    /// are no-ops.
    pub async fn stop(&mut self) -> Option<StageOutcome> {
        if let Some(kill) = self.kill.take() {
            // Fails when the task already finished; nothing to kill then.
            let _ = kill.send(());
        }
        let task = self.task.take()?;
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(stage = self.index, error = %e, "stage task did not complete");
                None
            }
        }
    }
}

async fn stop_child(
    index: usize,
    argv: Vec<String>,
    mut child: tokio::process::Child,
    stdout: LineSink,
    stderr: LineSink,
) -> StageOutcome {
    if let Err(e) = child.start_kill() {
        tracing::debug!(stage = index, error = %e, "kill failed, process already gone");
    }
    let _ = child.wait().await;
    tracing::debug!(stage = index, "stage stopped");
    finish(index, argv, StageStatus::Stopped, stdout, stderr).await
}

/// Close both sinks and assemble the outcome.
async fn finish(
    index: usize,
    argv: Vec<String>,
    mut status: StageStatus,
    stdout: LineSink,
    stderr: LineSink,
) -> StageOutcome {
    let (stdout, stderr) = tokio::join!(stdout.finish(), stderr.finish());
    let mut close = |result: io::Result<Vec<String>>| {
        result.unwrap_or_else(|e| {
            tracing::warn!(stage = index, error = %e, "failed to close redirect file");
            if !matches!(status, StageStatus::Failed { .. }) {
                status = StageStatus::Failed {
                    reason: format!("closing redirect file: {}", e),
                };
            }
            Vec::new()
        })
    };
    let stdout = close(stdout);
    let stderr = close(stderr);

    StageOutcome {
        index,
        argv,
        status,
        stdout: Arc::new(stdout),
        stderr,
    }
}

/// Write each input line followed by `\n`, then close stdin.
async fn write_input(stdin: Option<ChildStdin>, input: &[String]) -> io::Result<()> {
    let Some(stdin) = stdin else {
        return Ok(());
    };
    let mut writer = BufWriter::new(stdin);

    let result = async {
        for line in input {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.shutdown().await
    }
    .await;

    match result {
        // The program exited or closed stdin without reading everything.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Read a pipe line by line into `sink` until EOF.
async fn drain_lines<R>(pipe: Option<R>, sink: &mut LineSink) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(());
    };
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        sink.push(decode_line(&buf)).await?;
    }
}

/// Strip the line terminator (`\n` or `\r\n`) and decode lossily.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            128 + status.signal().unwrap_or(0)
        }
        #[cfg(not(unix))]
        {
            -1
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(argv: &[&str]) -> Stage {
        argv.iter().copied().collect()
    }

    async fn run_stage(process: StageProcess) -> StageOutcome {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = process.spawn(7, tx);
        let message = rx.recv().await.unwrap();
        assert_eq!(message.generation, 7);
        message.outcome
    }

    #[test]
    fn decode_line_strips_terminators() {
        assert_eq!(decode_line(b"abc\n"), "abc");
        assert_eq!(decode_line(b"abc\r\n"), "abc");
        assert_eq!(decode_line(b"abc"), "abc");
        assert_eq!(decode_line(b"\xffx\n"), "\u{fffd}x");
    }

    #[tokio::test]
    async fn captures_stdout_lines() {
        let process = StageProcess::new(0, &stage(&["printf", "a\\nb\\n"]), Default::default());
        let outcome = run_stage(process).await;
        assert!(outcome.success(), "{:?}", outcome.status);
        assert_eq!(*outcome.stdout, ["a", "b"]);
    }

    #[tokio::test]
    async fn feeds_input_to_stdin() {
        let mut process = StageProcess::new(1, &stage(&["cat"]), Default::default());
        process.set_input(Arc::new(vec!["one".into(), "two".into()]));
        let outcome = run_stage(process).await;
        assert_eq!(*outcome.stdout, ["one", "two"]);
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let process = StageProcess::new(0, &stage(&["sh", "-c", "echo oops >&2; exit 3"]), Default::default());
        let outcome = run_stage(process).await;
        assert_eq!(outcome.status, StageStatus::Exited { code: 3 });
        assert_eq!(outcome.stderr, ["oops"]);
    }

    #[tokio::test]
    async fn missing_program_is_a_failed_stage() {
        let process = StageProcess::new(0, &stage(&["definitely_not_a_real_command_12345"]), Default::default());
        let outcome = run_stage(process).await;
        assert!(matches!(outcome.status, StageStatus::Failed { .. }));
        assert!(outcome.stdout.is_empty());
    }

    #[tokio::test]
    async fn config_env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::default()
            .with_cwd(dir.path())
            .with_env("CHAINSH_TEST_VAR", "hello");
        let process = StageProcess::new(
            0,
            &stage(&["sh", "-c", "echo $CHAINSH_TEST_VAR; pwd"]),
            Arc::new(config),
        );
        let outcome = run_stage(process).await;
        assert_eq!(outcome.stdout[0], "hello");
        let cwd = std::path::Path::new(&outcome.stdout[1]).canonicalize().unwrap();
        assert_eq!(cwd, dir.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn stop_kills_a_running_stage() {
        let process = StageProcess::new(0, &stage(&["sleep", "30"]), Default::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut handle = process.spawn(1, tx);
        let outcome = handle.stop().await.unwrap();
        assert_eq!(outcome.status, StageStatus::Stopped);
        assert!(handle.is_finished());
        assert!(handle.stop().await.is_none());
    }
}
