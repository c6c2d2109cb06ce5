use std::path::PathBuf;

use anyhow::{Context, Result};

use v8forge_lib::platform::paths::default_depot_tools_dir;
use v8forge_lib::process::ProcessOptions;
use v8forge_lib::toolchain::bootstrap_depot_tools;

use crate::output::{print_failure_output, print_info, print_success};

pub fn cmd_bootstrap(dir: Option<PathBuf>) -> Result<()> {
  let dir = dir.unwrap_or_else(default_depot_tools_dir);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  match rt.block_on(bootstrap_depot_tools(&dir, &ProcessOptions::default())) {
    Ok(true) => print_success(&format!("depot_tools cloned into {}", dir.display())),
    Ok(false) => print_info(&format!("depot_tools already present at {}", dir.display())),
    Err(failure) => {
      print_failure_output(&failure.diagnostics());
      return Err(failure).context("Failed to bootstrap depot_tools");
    }
  }
  Ok(())
}
