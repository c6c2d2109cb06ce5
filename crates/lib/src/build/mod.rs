//! Build orchestration.
//!
//! Turns an acquired [`SourceTree`](crate::source::SourceTree), base args and
//! a [`TargetDescriptor`] into an install layout:
//!
//! 1. Merge target overrides into the base args ([`effective_args`])
//! 2. Write `args.gn` into the target's scoped build dir
//! 3. Run the toolchain: prepare, configure, compile
//! 4. Stage the install layout beside `install_dir` and swap it in
//!
//! A failure in steps 1 to 3 never touches `install_dir`; a failure while
//! staging leaves it as it was.
//!
//! # Concurrency
//!
//! The source tree is locked shared, so any number of builds can read it
//! while acquisition is excluded. Each target's build dir and each install
//! dir are locked exclusively.

mod install;
mod orchestrator;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use install::{ArtifactRecord, HeaderRecord, INSTALL_FORMAT, InstallLayout, InstallManifest};
pub use orchestrator::{Orchestrator, effective_args};

use crate::lock::LockError;
use crate::source::VersionSpec;
use crate::target::{MergeConflict, TargetDescriptor};
use crate::toolchain::ToolchainFailure;

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("conflicting overrides for {target}: {source}")]
  ConfigMergeConflict {
    target: TargetDescriptor,
    #[source]
    source: MergeConflict,
  },

  #[error("building V8 {version} for {target} failed: {source}")]
  Toolchain {
    version: VersionSpec,
    target: TargetDescriptor,
    #[source]
    source: ToolchainFailure,
  },

  #[error("installing V8 {version} for {target} failed at '{}': {source}", path.display())]
  InstallIo {
    version: VersionSpec,
    target: TargetDescriptor,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to prepare build directory '{}' for {target}: {source}", path.display())]
  BuildDir {
    target: TargetDescriptor,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Lock(#[from] LockError),
}

impl BuildError {
  /// The toolchain failure behind this error, for printing captured output.
  pub fn toolchain_failure(&self) -> Option<&ToolchainFailure> {
    match self {
      BuildError::Toolchain { source, .. } => Some(source),
      _ => None,
    }
  }
}
