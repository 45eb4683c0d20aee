use std::{io, path::Path, process::Stdio, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};
use tracing::trace;

const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;

fn max_capture_bytes() -> usize {
    std::env::var("VEENDOR_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub envs: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    /// `None` uses the `VEENDOR_MAX_CAPTURE_BYTES` bound; `Some(0)` disables it.
    pub capture_limit: Option<usize>,
}

impl RunOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.capture_limit = Some(0);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for {command}: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with status {code}{}", stderr_suffix(.stderr))]
    NonZeroExit {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("`{command}` was killed by signal {signal}{}", stderr_suffix(.stderr))]
    Signal {
        command: String,
        signal: i32,
        stdout: String,
        stderr: String,
    },
    #[error("`{command}` timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        command: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
}

impl ProcessError {
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stderr, .. }
            | Self::Signal { stderr, .. }
            | Self::Timeout { stderr, .. } => Some(stderr),
            Self::Spawn { .. } | Self::Wait { .. } => None,
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Executes a program, capturing stdout/stderr.
///
/// The child is killed if this future is dropped or the timeout expires.
///
/// # Errors
///
/// Returns [`ProcessError::NonZeroExit`], [`ProcessError::Signal`] or
/// [`ProcessError::Timeout`] for abnormal terminations, and
/// [`ProcessError::Spawn`] when the program cannot be started.
pub async fn run_command(
    program: &str,
    args: &[String],
    cwd: &Path,
    options: &RunOptions,
) -> Result<RunOutput, ProcessError> {
    let command_line = render_command(program, args);
    trace!(command = %command_line, cwd = %cwd.display(), "spawning");

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &options.envs {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let limit = options.capture_limit.unwrap_or_else(max_capture_bytes);
    let stdout_task = tokio::spawn(read_limited(child.stdout.take(), limit));
    let stderr_task = tokio::spawn(read_limited(child.stderr.take(), limit));

    let waited = match options.timeout {
        Some(timeout) => tokio::time::timeout(timeout, child.wait()).await.ok(),
        None => Some(child.wait().await),
    };
    let Some(status) = waited else {
        let _ = child.kill().await;
        let (stdout, stderr) = collect(stdout_task, stderr_task).await;
        return Err(ProcessError::Timeout {
            command: command_line,
            timeout: options.timeout.unwrap_or_default(),
            stdout,
            stderr,
        });
    };
    let status = status.map_err(|source| ProcessError::Wait {
        command: command_line.clone(),
        source,
    })?;
    let (stdout, stderr) = collect(stdout_task, stderr_task).await;

    if let Some(code) = status.code() {
        if code == 0 {
            return Ok(RunOutput {
                code,
                stdout,
                stderr,
            });
        }
        return Err(ProcessError::NonZeroExit {
            command: command_line,
            code,
            stdout,
            stderr,
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(ProcessError::Signal {
                command: command_line,
                signal,
                stdout,
                stderr,
            });
        }
    }

    Err(ProcessError::NonZeroExit {
        command: command_line,
        code: -1,
        stdout,
        stderr,
    })
}

fn render_command(program: &str, args: &[String]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

async fn collect(
    stdout: tokio::task::JoinHandle<String>,
    stderr: tokio::task::JoinHandle<String>,
) -> (String, String) {
    (
        stdout.await.unwrap_or_default(),
        stderr.await.unwrap_or_default(),
    )
}

async fn read_limited<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    let mut text = String::from_utf8_lossy(&buffer).to_string();
    if truncated {
        text.push_str("\n[...truncated...]\n");
    }
    text
}

fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    if limit == 0 || buffer.len().saturating_add(chunk.len()) <= limit {
        buffer.extend_from_slice(chunk);
        return;
    }
    *truncated = true;
    let old_len = buffer.len();
    let excess = old_len.saturating_add(chunk.len()).saturating_sub(limit);
    if excess >= old_len {
        buffer.clear();
        let drop_from_chunk = excess.saturating_sub(old_len).min(chunk.len());
        buffer.extend_from_slice(&chunk[drop_from_chunk..]);
    } else {
        buffer.drain(0..excess);
        buffer.extend_from_slice(chunk);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn captures_output_on_success() {
        let output = run_command(
            "/bin/sh",
            &sh("printf out && printf err >&2"),
            Path::new("."),
            &RunOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(output.code, 0);
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_captured_output() {
        let err = run_command(
            "/bin/sh",
            &sh("printf out && printf boom >&2; exit 7"),
            Path::new("."),
            &RunOptions::default(),
        )
        .await
        .unwrap_err();
        match err {
            ProcessError::NonZeroExit {
                code,
                stdout,
                stderr,
                ..
            } => {
                assert_eq!(code, 7);
                assert_eq!(stdout, "out");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn signal_is_reported_separately() {
        let err = run_command(
            "/bin/sh",
            &sh("kill -9 $$"),
            Path::new("."),
            &RunOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, ProcessError::Signal { signal: 9, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let err = run_command(
            "/bin/sh",
            &sh("exec sleep 5"),
            Path::new("."),
            &RunOptions::default().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, ProcessError::Timeout { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = run_command(
            "veendor-definitely-not-a-program",
            &[],
            Path::new("."),
            &RunOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn truncates_large_output() {
        let bytes = 4096;
        let output = run_command(
            "/bin/sh",
            &sh(&format!("yes a | head -c {bytes}")),
            Path::new("."),
            &RunOptions {
                capture_limit: Some(1024),
                ..RunOptions::default()
            },
        )
        .await
        .unwrap();
        assert!(output.stdout.contains("[...truncated...]"));
        assert!(output.stdout.len() <= 1024 + 64);
    }
}
