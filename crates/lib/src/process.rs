//! External process execution.
//!
//! Every toolchain and git invocation goes through [`run`]. The child's
//! environment is the inherited one plus explicit additions from a
//! [`CommandSpec`]; nothing is written to this process's environment, so
//! concurrent invocations with different settings stay isolated.
//!
//! Output is streamed line by line to `tracing` (target `v8forge::process`)
//! and captured verbatim for diagnostics. The child runs in its own process
//! group; on timeout, or when the returned future is dropped, the whole tree
//! is terminated rather than left running.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("failed to start `{command}`: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed waiting for `{command}`: {source}")]
  Wait {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("`{command}` timed out after {}s and was terminated", timeout.as_secs())]
  TimedOut {
    command: String,
    timeout: Duration,
    stdout: String,
    stderr: String,
  },

  #[error("invalid PATH entry for `{command}`: {message}")]
  InvalidPath { command: String, message: String },
}

/// A fully described external command.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
  pub program: PathBuf,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  /// Variables added to the inherited environment.
  pub env: BTreeMap<String, String>,
  /// Directories prepended to the inherited `PATH`.
  pub path_prepend: Vec<PathBuf>,
}

impl CommandSpec {
  pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      cwd: cwd.into(),
      ..Default::default()
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn path_prepend(mut self, dir: impl Into<PathBuf>) -> Self {
    self.path_prepend.push(dir.into());
    self
  }
}

/// Renders as a shell-like command line for logs and error messages.
impl fmt::Display for CommandSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program.display())?;
    for arg in &self.args {
      if arg.is_empty() || arg.contains(char::is_whitespace) {
        write!(f, " \"{arg}\"")?;
      } else {
        write!(f, " {arg}")?;
      }
    }
    Ok(())
  }
}

/// Execution limits supplied by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
  pub timeout: Option<Duration>,
}

/// Exit status plus the complete captured output.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
  pub status: ExitStatus,
  pub stdout: String,
  pub stderr: String,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.status.success()
  }

  pub fn code(&self) -> Option<i32> {
    self.status.code()
  }
}

/// Run `spec` to completion.
///
/// A non-zero exit is not an error at this layer: callers inspect
/// [`ProcessOutput::success`] and map failures into their own error types.
pub async fn run(spec: &CommandSpec, options: &ProcessOptions) -> Result<ProcessOutput, ProcessError> {
  let cmd_line = spec.to_string();
  info!(cmd = %cmd_line, cwd = %spec.cwd.display(), "running");

  let mut command = Command::new(&spec.program);
  command
    .args(&spec.args)
    .current_dir(&spec.cwd)
    .envs(&spec.env)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  if !spec.path_prepend.is_empty() {
    command.env("PATH", prepended_path(&spec.path_prepend).map_err(|message| ProcessError::InvalidPath {
      command: cmd_line.clone(),
      message,
    })?);
  }

  #[cfg(unix)]
  command.process_group(0);

  let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
    command: cmd_line.clone(),
    source,
  })?;
  let mut guard = TreeGuard::new(child.id());

  let stdout = child.stdout.take();
  let stderr = child.stderr.take();
  let mut stdout_buf = String::new();
  let mut stderr_buf = String::new();

  let finished = {
    let wait = async {
      let (_, _, status) = tokio::join!(
        drain(stdout, &mut stdout_buf, "stdout"),
        drain(stderr, &mut stderr_buf, "stderr"),
        child.wait()
      );
      status
    };
    match options.timeout {
      Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
      None => Some(wait.await),
    }
  };

  let Some(status) = finished else {
    warn!(cmd = %cmd_line, "timed out, terminating process tree");
    guard.kill();
    return Err(ProcessError::TimedOut {
      command: cmd_line,
      timeout: options.timeout.unwrap_or_default(),
      stdout: stdout_buf,
      stderr: stderr_buf,
    });
  };

  let status = status.map_err(|source| ProcessError::Wait {
    command: cmd_line.clone(),
    source,
  })?;
  guard.disarm();

  debug!(cmd = %cmd_line, code = ?status.code(), "process exited");

  Ok(ProcessOutput {
    status,
    stdout: stdout_buf,
    stderr: stderr_buf,
  })
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, buf: &mut String, stream: &'static str) {
  let Some(reader) = reader else {
    return;
  };
  let mut reader = BufReader::new(reader);
  let mut line = Vec::new();

  loop {
    line.clear();
    match reader.read_until(b'\n', &mut line).await {
      Ok(0) => break,
      Ok(_) => {
        let text = String::from_utf8_lossy(&line);
        debug!(target: "v8forge::process", stream, "{}", text.trim_end());
        buf.push_str(&text);
      }
      Err(e) => {
        warn!(stream, error = %e, "failed reading child output");
        break;
      }
    }
  }
}

fn prepended_path(dirs: &[PathBuf]) -> Result<OsString, String> {
  let inherited = std::env::var_os("PATH").unwrap_or_default();
  let entries = dirs
    .iter()
    .cloned()
    .chain(std::env::split_paths(&inherited));
  std::env::join_paths(entries).map_err(|e| e.to_string())
}

/// Kills the child's whole process tree when dropped while armed.
struct TreeGuard {
  pid: Option<u32>,
}

impl TreeGuard {
  fn new(pid: Option<u32>) -> Self {
    Self { pid }
  }

  fn kill(&mut self) {
    if let Some(pid) = self.pid.take() {
      kill_tree(pid);
    }
  }

  fn disarm(&mut self) {
    self.pid = None;
  }
}

impl Drop for TreeGuard {
  fn drop(&mut self) {
    self.kill();
  }
}

#[cfg(unix)]
fn kill_tree(pid: u32) {
  use nix::sys::signal::{Signal, killpg};
  use nix::unistd::Pid;

  let Ok(raw) = i32::try_from(pid) else {
    return;
  };
  // The child leads its own group (process_group(0)), so its pid is the pgid.
  if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
    debug!(pid, error = %e, "process group already gone");
  }
}

#[cfg(windows)]
fn kill_tree(pid: u32) {
  let result = std::process::Command::new("taskkill")
    .args(["/T", "/F", "/PID", &pid.to_string()])
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .status();
  if let Err(e) = result {
    debug!(pid, error = %e, "taskkill failed");
  }
}

/// Resolve `tool` inside `dir` if given, otherwise leave it to `PATH` lookup.
pub fn tool_path(dir: Option<&Path>, tool: &str) -> PathBuf {
  match dir {
    Some(dir) => dir.join(tool),
    None => PathBuf::from(tool),
  }
}
