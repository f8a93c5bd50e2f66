use std::io::{Read, Write};
use std::path::Path;
use std::process::{ChildStdout, ChildStderr, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::app::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Trimmed stderr, or stdout when stderr is empty; used in error messages.
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        self.stdout.trim().to_string()
    }
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    run_command_with_input(program, args, None, timeout, trace_id)
}

/// Runs `program` to completion, feeding `input` on stdin when given.
/// The child is killed once `timeout` elapses.
pub fn run_command_with_input(
    program: &str,
    args: &[String],
    input: Option<Vec<u8>>,
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    debug!(trace_id = %trace_id, program = %program, args = ?args, "run command");
    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            AppError::system(format!("Failed to spawn {}: {err}", display_program(program)), trace_id)
        })?;

    if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
        // Tools like sdkmanager read prompts lazily; a closed pipe just means they stopped asking.
        std::thread::spawn(move || {
            let _ = stdin.write_all(&bytes);
        });
    }

    // Drain stdout/stderr in parallel; otherwise, a chatty child process can block once the pipe
    // buffer fills, and we will incorrectly hit the timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;

    let stdout_handle = drain(PipeReader::Out(stdout));
    let stderr_handle = drain(PipeReader::Err(stderr));

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(AppError::system(
                        format!(
                            "{} timed out after {}s",
                            display_program(program),
                            timeout.as_secs()
                        ),
                        trace_id,
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

enum PipeReader {
    Out(ChildStdout),
    Err(ChildStderr),
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            PipeReader::Out(inner) => inner.read(buf),
            PipeReader::Err(inner) => inner.read(buf),
        }
    }
}

fn drain(mut reader: PipeReader) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

fn display_program(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn run_command_with_timeout_does_not_deadlock_on_large_stdout() {
        // If stdout/stderr are piped but not drained, the child blocks once the pipe buffer
        // fills and an otherwise-fast command hangs until the timeout.
        let output = run_command_with_timeout(
            "sh",
            &sh("i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done"),
            Duration::from_secs(10),
            "test-trace-large-output",
        )
        .expect("expected large-output command to complete without timing out");

        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.len() >= 1_000_000);
    }

    #[test]
    fn feeds_stdin_input() {
        let output = run_command_with_input(
            "sh",
            &sh("read answer; echo got:$answer"),
            Some(b"no\n".to_vec()),
            Duration::from_secs(5),
            "trace-stdin",
        )
        .expect("run");
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "got:no");
    }

    #[test]
    fn kills_on_timeout() {
        let err = run_command_with_timeout("sh", &sh("sleep 30"), Duration::from_millis(200), "trace-t")
            .expect_err("timeout");
        assert_eq!(err.code, "ERR_SYSTEM");
        assert!(err.error.contains("timed out"));
    }

    #[test]
    fn failure_detail_prefers_stderr() {
        let output = run_command_with_timeout("sh", &sh("echo out; echo bad >&2; exit 4"), Duration::from_secs(5), "trace-f")
            .expect("run");
        assert_eq!(output.exit_code, Some(4));
        assert!(!output.success());
        assert_eq!(output.failure_detail(), "bad");
    }

    #[test]
    fn missing_program_is_system_error() {
        let err = run_command_with_timeout("/definitely/not/here", &[], Duration::from_secs(1), "trace-m")
            .expect_err("spawn");
        assert_eq!(err.trace_id, "trace-m");
        assert!(err.error.contains("Failed to spawn here"));
    }
}
