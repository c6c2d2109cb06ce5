use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::BuildError;
use super::install::{InstallLayout, install};
use crate::args::BuildArgs;
use crate::consts::ARGS_FILENAME;
use crate::lock::{DirLock, LockMode};
use crate::source::SourceTree;
use crate::target::{self, MergeConflict, TargetDescriptor};
use crate::toolchain::Toolchain;
use crate::util::fs::write_if_changed;

/// The args a build of `target` uses: `base` with the target's overrides applied.
///
/// Pure; exposed separately so they can be inspected without building.
pub fn effective_args(base: &BuildArgs, target: &TargetDescriptor) -> Result<BuildArgs, MergeConflict> {
  target::merge(base, target)
}

/// Drives a [`Toolchain`] over acquired source trees.
pub struct Orchestrator<T> {
  toolchain: T,
}

impl<T: Toolchain> Orchestrator<T> {
  pub fn new(toolchain: T) -> Self {
    Self { toolchain }
  }

  pub fn toolchain(&self) -> &T {
    &self.toolchain
  }

  /// Build `target` from `tree` and install it into `install_dir`.
  pub async fn build(
    &self,
    tree: &SourceTree,
    base: &BuildArgs,
    target: &TargetDescriptor,
    install_dir: &Path,
  ) -> Result<InstallLayout, BuildError> {
    let args = effective_args(base, target).map_err(|source| BuildError::ConfigMergeConflict {
      target: target.clone(),
      source,
    })?;

    let command = format!("build {target}");
    let _source_lock = DirLock::acquire(&tree.root, LockMode::Shared, &command)?;

    let build_dir = tree.build_dir(target);
    let _build_lock = DirLock::acquire(&build_dir, LockMode::Exclusive, &command)?;
    let build_dir_err = |source| BuildError::BuildDir {
      target: target.clone(),
      path: build_dir.clone(),
      source,
    };
    fs::create_dir_all(&build_dir).map_err(build_dir_err)?;

    let args_path = build_dir.join(ARGS_FILENAME);
    let written = write_if_changed(&args_path, &args.to_gn_string()).map_err(build_dir_err)?;
    debug!(path = %args_path.display(), written, "args.gn");

    info!(version = %tree.version, target = %target, dir = %build_dir.display(), "building");
    let toolchain_err = |source| BuildError::Toolchain {
      version: tree.version.clone(),
      target: target.clone(),
      source,
    };
    self.toolchain.prepare(&tree.root).await.map_err(toolchain_err)?;
    self
      .toolchain
      .configure(&tree.root, &build_dir, &args)
      .await
      .map_err(toolchain_err)?;
    self
      .toolchain
      .compile(&tree.root, &build_dir)
      .await
      .map_err(toolchain_err)?;

    let _install_lock = DirLock::acquire(install_dir, LockMode::Exclusive, &command)?;
    install(tree, target, &args, &build_dir, install_dir).map_err(|failure| BuildError::InstallIo {
      version: tree.version.clone(),
      target: target.clone(),
      path: failure.path,
      source: failure.source,
    })
  }
}
