use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BwrapperError, Result};
use crate::sandbox::assembler::Invocation;

/// How long output readers may keep draining once the child has ended.
///
/// Descendants that inherited the pipes can hold them open after the child
/// is gone; whatever was read by then is returned.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// A fully configured process that has not been started yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedProcess {
    pub invocation: Invocation,
    /// Host working directory of the isolator process; inherited when `None`.
    pub working_directory: Option<PathBuf>,
    /// Variables added on top of the inherited environment.
    pub environment: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl PreparedProcess {
    pub fn program(&self) -> &str {
        self.invocation.program()
    }

    pub fn args(&self) -> &[String] {
        self.invocation.args()
    }
}

/// How a started process finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own; `code` is `None` when a signal ended it.
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The timeout elapsed and the process was killed.
    TimedOut { stdout: String, stderr: String },
    /// The cancellation token fired and the process was killed.
    Cancelled,
}

/// Starts prepared processes and waits for them.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Start `process`, wait for it to exit, time out, or be cancelled.
    ///
    /// Returns an error only when the process could not be started or waited
    /// on; exit status and timeouts are reported through [`ProcessOutcome`].
    async fn spawn(
        &self,
        process: &PreparedProcess,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome>;
}

/// Spawns processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

#[async_trait]
impl ProcessSpawner for TokioSpawner {
    async fn spawn(
        &self,
        process: &PreparedProcess,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome> {
        let mut cmd = Command::new(process.program());
        cmd.args(process.args());

        if let Some(dir) = &process.working_directory {
            cmd.current_dir(dir);
        }
        cmd.envs(&process.environment);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| BwrapperError::Spawn {
            program: process.program().to_string(),
            source: e,
        })?;

        info!(
            program = %process.program(),
            args = process.args().len(),
            pid = ?child.id(),
            "Started sandboxed process"
        );

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = async {
            match process.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        enum Ending {
            Exited(std::process::ExitStatus),
            TimedOut,
            Cancelled,
        }

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status?),
            _ = deadline => Ending::TimedOut,
            _ = cancel.cancelled() => Ending::Cancelled,
        };

        match ending {
            Ending::Exited(status) => {
                let stdout = collect(stdout, DRAIN_GRACE).await;
                let stderr = collect(stderr, DRAIN_GRACE).await;

                debug!(
                    exit_code = ?status.code(),
                    stdout_len = stdout.len(),
                    stderr_len = stderr.len(),
                    "Sandboxed process exited"
                );

                Ok(ProcessOutcome::Exited {
                    code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Ending::TimedOut => {
                warn!(timeout = ?process.timeout, "Sandboxed process timed out, killing it");
                terminate(&mut child).await;

                let stdout = collect(stdout, DRAIN_GRACE).await;
                let stderr = collect(stderr, DRAIN_GRACE).await;
                Ok(ProcessOutcome::TimedOut { stdout, stderr })
            }
            Ending::Cancelled => {
                warn!("Sandboxed process cancelled, killing it");
                terminate(&mut child).await;

                for reader in [stdout, stderr].into_iter().flatten() {
                    reader.task.abort();
                }
                Ok(ProcessOutcome::Cancelled)
            }
        }
    }
}

async fn terminate(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill sandboxed process");
    }
}

/// Output read so far by a background reader task.
struct OutputReader {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

fn drain<R>(mut reader: R) -> OutputReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);

    let task = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "Stopped reading process output");
                    break;
                }
            }
        }
    });

    OutputReader { buf, task }
}

/// Wait up to `grace` for a reader to reach EOF, then return what it read.
async fn collect(reader: Option<OutputReader>, grace: Duration) -> String {
    let Some(OutputReader { buf, mut task }) = reader else {
        return String::new();
    };

    if tokio::time::timeout(grace, &mut task).await.is_err() {
        debug!(?grace, "Process output still open, returning what was read");
        task.abort();
    }

    let bytes = buf.lock().await;
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::assembler::assemble;
    use crate::sandbox::profile::SandboxProfile;
    use crate::sandbox::resolver::PathResolver;

    fn prepared(command: &[&str], timeout: Option<Duration>) -> PreparedProcess {
        let profile = SandboxProfile::new("env", vec![], vec![], vec![]);
        let command: Vec<String> = command.iter().map(|s| s.to_string()).collect();
        let invocation = assemble(&profile, &command, &[], &PathResolver::new()).unwrap();
        PreparedProcess {
            invocation,
            working_directory: None,
            environment: BTreeMap::new(),
            timeout,
        }
    }

    #[tokio::test]
    async fn test_captures_output_and_status() {
        let process = prepared(&["sh", "-c", "echo out; echo err >&2; exit 3"], None);
        let outcome = TokioSpawner
            .spawn(&process, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::Exited {
                code: Some(3),
                stdout: "out\n".to_string(),
                stderr: "err\n".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let process = prepared(&["sleep", "5"], Some(Duration::from_millis(200)));
        let started = std::time::Instant::now();
        let outcome = TokioSpawner
            .spawn(&process, CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, ProcessOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_background_descendant_does_not_hold_run_open() {
        let process = prepared(&["sh", "-c", "sleep 5 & echo started"], None);
        let started = std::time::Instant::now();
        let outcome = TokioSpawner
            .spawn(&process, CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(
            outcome,
            ProcessOutcome::Exited {
                code: Some(0),
                stdout: "started\n".to_string(),
                stderr: String::new(),
            }
        );
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let process = prepared(&["sleep", "5"], None);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = TokioSpawner.spawn(&process, token).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_environment_overlay_and_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut process = prepared(&["sh", "-c", "printf '%s %s' \"$GREETING\" \"$PWD\""], None);
        process.environment.insert("GREETING".to_string(), "hello".to_string());
        process.working_directory = Some(dir.path().to_path_buf());

        let outcome = TokioSpawner
            .spawn(&process, CancellationToken::new())
            .await
            .unwrap();

        let ProcessOutcome::Exited { code, stdout, .. } = outcome else {
            panic!("process did not exit normally");
        };
        assert_eq!(code, Some(0));
        assert!(stdout.starts_with("hello "));
        assert!(stdout.ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_bad_working_directory_is_spawn_error() {
        let process = PreparedProcess {
            invocation: prepared(&["true"], None).invocation,
            working_directory: Some(PathBuf::from("/nonexistent/bwrapper/dir")),
            environment: BTreeMap::new(),
            timeout: None,
        };

        let err = TokioSpawner
            .spawn(&process, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BwrapperError::Spawn { .. }));
    }
}
