//! Subprocess execution.
//!
//! Spawns the reference tool, drains its output concurrently, and enforces
//! wall-clock timeouts with forced termination.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Error type for subprocess execution.
#[derive(Debug)]
pub enum ExecError {
    /// The program could not be spawned (not found, permission denied).
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// A pipe read failed while draining the process output.
    Io(std::io::Error),
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Spawn { program, source } => {
                write!(f, "failed to spawn '{program}': {source}")
            }
            ExecError::Io(e) => write!(f, "process I/O failed: {e}"),
        }
    }
}

impl std::error::Error for ExecError {}

/// One fully-assembled tool invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The program to execute.
    pub program: String,
    /// Complete argument vector, in order.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub cwd: PathBuf,
    /// Extra environment variables (the host environment is inherited).
    pub env: HashMap<String, String>,
    /// Bytes fed to the child's stdin. `None` gives the child a null stdin.
    pub stdin: Option<String>,
}

/// Everything observed from one completed (or terminated) execution.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Raw captured stdout.
    pub stdout: Vec<u8>,
    /// Raw captured stderr.
    pub stderr: Vec<u8>,
    /// Exit code. `None` when the process was killed by a signal, which
    /// includes every timeout termination, so a real exit code can never be
    /// mistaken for one.
    pub exit_code: Option<i32>,
    /// The signal that killed the process, when the OS reports one.
    pub signal: Option<i32>,
    /// True when the harness forcibly terminated the process at the deadline.
    pub timed_out: bool,
    /// Wall-clock time of the run.
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn stdout_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Short human description of how the process ended.
    pub fn exit_description(&self) -> String {
        if self.timed_out {
            return format!("timed out after {:.1}s", self.duration.as_secs_f64());
        }
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(sig)) => format!("killed by signal {sig}"),
            (None, None) => "terminated without exit code".to_string(),
        }
    }
}

fn command(inv: &Invocation) -> Command {
    let mut cmd = Command::new(&inv.program);
    cmd.args(&inv.args);
    cmd.current_dir(&inv.cwd);
    for (k, v) in &inv.env {
        cmd.env(k, v);
    }
    cmd
}

/// Spawn a reader that drains one pipe to the end.
///
/// Returns whatever was read even when the read fails partway, so output
/// written before a forced kill is never lost.
fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> JoinHandle<(Vec<u8>, Option<std::io::Error>)> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let err = match pipe {
            Some(mut pipe) => pipe.read_to_end(&mut buf).err(),
            None => None,
        };
        (buf, err)
    })
}

/// Run an invocation to completion, capturing both output streams.
///
/// stdout and stderr are drained on dedicated threads while the parent polls
/// for exit, so a child that fills both pipe buffers cannot deadlock. When
/// the deadline passes the child is terminated (SIGTERM, then SIGKILL after a
/// short grace period) and the result carries `timed_out = true` together
/// with all output captured up to that point.
pub fn execute(inv: &Invocation, timeout: Duration) -> Result<ExecutionResult, ExecError> {
    let mut cmd = command(inv);
    if inv.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
        program: inv.program.clone(),
        source: e,
    })?;

    // Writer runs on its own thread: a child that never reads its stdin must
    // not be able to block the deadline loop.
    let stdin_writer = match (&inv.stdin, child.stdin.take()) {
        (Some(data), Some(mut stdin)) => {
            let data = data.clone();
            Some(std::thread::spawn(move || {
                // The child may exit without reading all of it.
                let _ = stdin.write_all(data.as_bytes());
            }))
        }
        _ => None,
    };

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    // Wait with timeout
    let outcome = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    terminate(&mut child);
                    break Err(());
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(ExecError::Io(e)),
        }
    };

    if let Some(writer) = stdin_writer {
        let _ = writer.join();
    }
    let (stdout, stdout_err) = stdout_reader.join().unwrap_or_default();
    let (stderr, stderr_err) = stderr_reader.join().unwrap_or_default();
    let duration = start.elapsed();

    match outcome {
        Ok(status) => {
            if let Some(e) = stdout_err.or(stderr_err) {
                return Err(ExecError::Io(e));
            }
            let exit_code = status.code();
            #[cfg(unix)]
            let signal = {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            };
            #[cfg(not(unix))]
            let signal = None;

            Ok(ExecutionResult {
                stdout,
                stderr,
                exit_code,
                signal,
                timed_out: false,
                duration,
            })
        }
        Err(()) => Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code: None,
            signal: None,
            timed_out: true,
            duration,
        }),
    }
}

/// Spawn an invocation for live trace comparison.
///
/// stdout is piped for incremental reading, stdin is null, and stderr stays
/// attached to the console. The returned guard kills and reaps the child
/// when dropped, so the tool cannot outlive its test.
pub fn spawn_streaming(inv: &Invocation) -> Result<ProcessGuard, ExecError> {
    let mut cmd = command(inv);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());

    let child = cmd.spawn().map_err(|e| ExecError::Spawn {
        program: inv.program.clone(),
        source: e,
    })?;
    Ok(ProcessGuard { child })
}

/// Owns a spawned child and guarantees it is terminated and reaped.
pub struct ProcessGuard {
    child: Child,
}

impl ProcessGuard {
    /// Take the child's stdout handle for incremental reading.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        match self.child.try_wait() {
            // Already exited and reaped.
            Ok(Some(_)) => {}
            _ => terminate(&mut self.child),
        }
    }
}

/// Terminate a child and reap it.
///
/// Sends SIGTERM first so the tool can flush and exit on its own; escalates
/// to SIGKILL if it is still alive after half a second.
#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let _ = signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM);
    let grace = Instant::now();
    while grace.elapsed() < Duration::from_millis(500) {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => std::thread::sleep(Duration::from_millis(10)),
            Err(_) => break,
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    fn sh(script: &str) -> Invocation {
        Invocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: std::env::temp_dir(),
            env: HashMap::new(),
            stdin: None,
        }
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let result = execute(&sh("printf hello; exit 3"), Duration::from_secs(10)).unwrap();
        assert_eq!(result.stdout, b"hello");
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.timed_out);
    }

    #[test]
    fn captures_stderr_separately() {
        let result = execute(&sh("echo out; echo oops >&2"), Duration::from_secs(10)).unwrap();
        assert_eq!(result.stdout, b"out\n");
        assert_eq!(result.stderr, b"oops\n");
    }

    #[test]
    fn feeds_stdin() {
        let inv = Invocation {
            program: "cat".to_string(),
            args: vec![],
            cwd: std::env::temp_dir(),
            env: HashMap::new(),
            stdin: Some("first\nsecond\n".to_string()),
        };
        let result = execute(&inv, Duration::from_secs(10)).unwrap();
        assert_eq!(result.stdout, b"first\nsecond\n");
        assert_eq!(result.exit_code, Some(0));
    }

    #[test]
    fn applies_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = sh("printf '%s' \"$REFTEST_PROBE\"; pwd");
        inv.cwd = dir.path().to_path_buf();
        inv.env
            .insert("REFTEST_PROBE".to_string(), "probe-value".to_string());
        let result = execute(&inv, Duration::from_secs(10)).unwrap();
        let text = result.stdout_text().to_string();
        assert!(text.starts_with("probe-value"), "got: {text}");
        let cwd = dir.path().canonicalize().unwrap();
        assert!(text.contains(&cwd.display().to_string()), "got: {text}");
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let inv = Invocation {
            program: "reftest-no-such-binary".to_string(),
            args: vec![],
            cwd: std::env::temp_dir(),
            env: HashMap::new(),
            stdin: None,
        };
        match execute(&inv, Duration::from_secs(1)) {
            Err(ExecError::Spawn { program, .. }) => {
                assert_eq!(program, "reftest-no-such-binary");
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[test]
    fn timeout_kills_and_keeps_partial_output() {
        let start = Instant::now();
        let result = execute(&sh("echo early; exec sleep 30"), Duration::from_secs(1)).unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert_eq!(result.stdout, b"early\n");
        // Must come back promptly, not after the child would have finished.
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn large_output_on_both_streams_does_not_deadlock() {
        // Well past the 64 KiB pipe buffer on each stream.
        let script = "i=0; while [ $i -lt 5000 ]; do \
                      echo xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx; \
                      echo yyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyy >&2; \
                      i=$((i+1)); done";
        let result = execute(&sh(script), Duration::from_secs(60)).unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.len(), 5000 * 33);
        assert_eq!(result.stderr.len(), 5000 * 33);
    }

    #[test]
    fn stdin_writer_cannot_wedge_the_deadline() {
        // Child never reads stdin; a blocking write here would stall the poll
        // loop and the timeout would never fire.
        let mut inv = sh("exec sleep 30");
        inv.stdin = Some("x".repeat(1 << 20));
        let start = Instant::now();
        let result = execute(&inv, Duration::from_secs(1)).unwrap();
        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn streaming_guard_reads_live_and_kills_on_drop() {
        let start = Instant::now();
        {
            let mut guard = spawn_streaming(&sh("echo one; echo two; exec sleep 30")).unwrap();
            let stdout = guard.take_stdout().expect("piped stdout");
            let mut lines = std::io::BufReader::new(stdout).lines();
            assert_eq!(lines.next().unwrap().unwrap(), "one");
            assert_eq!(lines.next().unwrap().unwrap(), "two");
        }
        // Guard dropped: the sleep must have been terminated, not waited out.
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
