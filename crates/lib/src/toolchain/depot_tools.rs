use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{FailureReason, ToolchainFailure, ToolchainStep};
use crate::consts::DEPOT_TOOLS_URL;
use crate::process::{self, CommandSpec, ProcessOptions};

/// Clone depot_tools into `dir` unless it is already there.
///
/// Returns whether a clone happened.
pub async fn bootstrap_depot_tools(dir: &Path, options: &ProcessOptions) -> Result<bool, ToolchainFailure> {
  clone_depot_tools(PathBuf::from("git"), dir, options).await
}

async fn clone_depot_tools(git: PathBuf, dir: &Path, options: &ProcessOptions) -> Result<bool, ToolchainFailure> {
  if dir.join(".git").exists() {
    info!(path = %dir.display(), "depot_tools already present");
    return Ok(false);
  }

  let parent = match dir.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  let Some(name) = dir.file_name() else {
    return Err(ToolchainFailure::new(
      ToolchainStep::Bootstrap,
      format!("clone into {}", dir.display()),
      FailureReason::NotStarted("checkout directory has no name".to_string()),
    ));
  };
  fs::create_dir_all(parent).map_err(|e| {
    ToolchainFailure::new(
      ToolchainStep::Bootstrap,
      format!("create {}", parent.display()),
      FailureReason::NotStarted(e.to_string()),
    )
  })?;

  info!(url = DEPOT_TOOLS_URL, path = %dir.display(), "cloning depot_tools");
  // Runs from `parent`, so the target is the bare name.
  let spec = CommandSpec::new(git, parent).args([
    "clone".to_string(),
    "--quiet".to_string(),
    DEPOT_TOOLS_URL.to_string(),
    name.to_string_lossy().into_owned(),
  ]);
  let output = process::run(&spec, options)
    .await
    .map_err(|e| ToolchainFailure::from_process(ToolchainStep::Bootstrap, e))?;

  if !output.success() {
    return Err(ToolchainFailure::from_output(
      ToolchainStep::Bootstrap,
      spec.to_string(),
      output,
    ));
  }
  Ok(true)
}
