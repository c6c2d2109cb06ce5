//! The external configure/compile toolchain.
//!
//! The orchestrator only sees the [`Toolchain`] trait. [`GnNinja`] drives
//! Chromium's `gn` and `ninja` from depot_tools; tests use fakes.

mod depot_tools;
mod gn;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub use depot_tools::bootstrap_depot_tools;
pub use gn::{GnNinja, bundled_clang_dir};

use crate::args::BuildArgs;
use crate::process::{ProcessError, ProcessOutput};

/// Configure-then-compile capability.
///
/// `build_dir` is always the target's scoped directory, already containing
/// the serialized `args.gn`.
pub trait Toolchain: Send + Sync {
  /// One-time setup before configuring, such as downloading a compiler.
  fn prepare(&self, _source: &Path) -> impl Future<Output = Result<(), ToolchainFailure>> + Send {
    async { Ok(()) }
  }

  /// Generate build files for `args` in `build_dir`.
  fn configure(
    &self,
    source: &Path,
    build_dir: &Path,
    args: &BuildArgs,
  ) -> impl Future<Output = Result<(), ToolchainFailure>> + Send;

  /// Build the monolith in a configured `build_dir`.
  fn compile(&self, source: &Path, build_dir: &Path) -> impl Future<Output = Result<(), ToolchainFailure>> + Send;
}

/// Explicit toolchain settings. Nothing here is read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ToolchainConfig {
  /// depot_tools checkout. `None` resolves `gn`/`ninja` through `PATH`.
  pub depot_tools: Option<PathBuf>,
  /// Parallel compile jobs (`ninja -j`). `None` lets ninja decide.
  pub jobs: Option<usize>,
  /// Limit for each external step; the process tree is killed when exceeded.
  pub timeout: Option<Duration>,
  /// Extra variables for every toolchain process.
  pub env: BTreeMap<String, String>,
  /// Download Chromium's clang during `prepare`.
  pub download_clang: bool,
  /// Python interpreter for helper scripts.
  pub python: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainStep {
  Prepare,
  Configure,
  Compile,
  Bootstrap,
}

impl fmt::Display for ToolchainStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      ToolchainStep::Prepare => "prepare",
      ToolchainStep::Configure => "configure",
      ToolchainStep::Compile => "compile",
      ToolchainStep::Bootstrap => "bootstrap",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
  /// Non-zero exit, or killed by a signal (`None`).
  Exited(Option<i32>),
  TimedOut(Duration),
  NotStarted(String),
}

impl fmt::Display for FailureReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailureReason::Exited(Some(code)) => write!(f, "exited with code {code}"),
      FailureReason::Exited(None) => f.write_str("was killed by a signal"),
      FailureReason::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
      FailureReason::NotStarted(message) => write!(f, "could not be run: {message}"),
    }
  }
}

/// A failed external step with its verbatim output.
#[derive(Debug, Error)]
#[error("{step} step failed: `{command}` {reason}")]
pub struct ToolchainFailure {
  pub step: ToolchainStep,
  pub command: String,
  pub reason: FailureReason,
  pub stdout: String,
  pub stderr: String,
}

impl ToolchainFailure {
  pub fn new(step: ToolchainStep, command: impl Into<String>, reason: FailureReason) -> Self {
    Self {
      step,
      command: command.into(),
      reason,
      stdout: String::new(),
      stderr: String::new(),
    }
  }

  /// Exit code of the failed process, when it exited normally.
  pub fn code(&self) -> Option<i32> {
    match self.reason {
      FailureReason::Exited(code) => code,
      _ => None,
    }
  }

  /// Captured stdout then stderr, for printing on failure.
  pub fn diagnostics(&self) -> String {
    let mut out = String::new();
    for stream in [&self.stdout, &self.stderr] {
      if stream.is_empty() {
        continue;
      }
      out.push_str(stream);
      if !stream.ends_with('\n') {
        out.push('\n');
      }
    }
    out
  }

  pub(crate) fn from_output(step: ToolchainStep, command: String, output: ProcessOutput) -> Self {
    Self {
      step,
      command,
      reason: FailureReason::Exited(output.code()),
      stdout: output.stdout,
      stderr: output.stderr,
    }
  }

  pub(crate) fn from_process(step: ToolchainStep, error: ProcessError) -> Self {
    match error {
      ProcessError::TimedOut {
        command,
        timeout,
        stdout,
        stderr,
      } => Self {
        step,
        command,
        reason: FailureReason::TimedOut(timeout),
        stdout,
        stderr,
      },
      ProcessError::Spawn { command, source } | ProcessError::Wait { command, source } => {
        Self::new(step, command, FailureReason::NotStarted(source.to_string()))
      }
      ProcessError::InvalidPath { command, message } => {
        Self::new(step, command, FailureReason::NotStarted(message))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn failure_message_names_step_and_command() {
    let failure = ToolchainFailure {
      step: ToolchainStep::Compile,
      command: "ninja -C out.gn/linux-x64-release v8_monolith".into(),
      reason: FailureReason::Exited(Some(1)),
      stdout: "[1/2] CXX obj/a.o".into(),
      stderr: "error: boom\n".into(),
    };

    assert_eq!(
      failure.to_string(),
      "compile step failed: `ninja -C out.gn/linux-x64-release v8_monolith` exited with code 1"
    );
    assert_eq!(failure.code(), Some(1));
    assert_eq!(failure.diagnostics(), "[1/2] CXX obj/a.o\nerror: boom\n");
  }

  #[test]
  fn timeout_keeps_partial_output() {
    let failure = ToolchainFailure::from_process(
      ToolchainStep::Configure,
      ProcessError::TimedOut {
        command: "gn gen out".into(),
        timeout: Duration::from_secs(5),
        stdout: "partial".into(),
        stderr: String::new(),
      },
    );

    assert_eq!(failure.reason, FailureReason::TimedOut(Duration::from_secs(5)));
    assert_eq!(failure.code(), None);
    assert_eq!(failure.stdout, "partial");
  }
}
