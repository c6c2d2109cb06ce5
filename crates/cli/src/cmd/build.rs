//! Implementation of the `v8forge build` command.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::debug;

use v8forge_lib::build::Orchestrator;
use v8forge_lib::platform::Platform;
use v8forge_lib::platform::paths::default_depot_tools_dir;
use v8forge_lib::source::SourceTree;
use v8forge_lib::toolchain::{GnNinja, ToolchainConfig, bundled_clang_dir};

use super::args::{load_base, target_descriptor};
use crate::TargetArgs;
use crate::output::{format_bytes, format_duration, print_failure_output, print_stat, print_success};

pub struct BuildOptions {
  pub config: Option<PathBuf>,
  pub target: TargetArgs,
  pub source: PathBuf,
  pub install_dir: PathBuf,
  pub download_clang: bool,
  pub depot_tools: Option<PathBuf>,
  pub jobs: Option<usize>,
  pub timeout: Option<Duration>,
}

pub fn cmd_build(options: BuildOptions) -> Result<()> {
  let start = Instant::now();
  let tree = SourceTree::open(&options.source)?;
  let base = load_base(options.config.as_deref())?;
  let mut target = target_descriptor(&options.target)?;
  if options.download_clang && target.clang_base_path.is_none() {
    target = target.with_clang_base_path(bundled_clang_dir(&tree.root));
  }

  debug!(source = %tree.root.display(), target = %target, args = base.len(), "build requested");

  let host = Platform::current().context("Unsupported host platform")?;
  let depot_tools = resolve_depot_tools(options.depot_tools, default_depot_tools_dir());
  debug!(depot_tools = ?depot_tools, "toolchain location");
  let config = ToolchainConfig {
    depot_tools,
    jobs: options.jobs,
    timeout: options.timeout,
    download_clang: options.download_clang,
    ..Default::default()
  };
  let orchestrator = Orchestrator::new(GnNinja::new(config, host));

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let layout = match rt.block_on(orchestrator.build(&tree, &base, &target, &options.install_dir)) {
    Ok(layout) => layout,
    Err(err) => {
      if let Some(failure) = err.toolchain_failure() {
        print_failure_output(&failure.diagnostics());
      }
      return Err(err).with_context(|| format!("Failed to build V8 {} for {target}", tree.version));
    }
  };

  println!();
  print_success(&format!("Installed V8 {} for {} into {}", tree.version, target, layout.root.display()));
  print_stat("Library", &layout.primary_library().display().to_string());
  print_stat("Size", &format_bytes(layout.manifest.primary.size));
  print_stat("Headers", &layout.manifest.headers.files.to_string());
  print_stat("Duration", &format_duration(start.elapsed()));
  Ok(())
}

/// An explicit checkout wins; otherwise the one `v8forge bootstrap` creates, if present.
/// `None` leaves `gn` and `ninja` to `PATH`.
fn resolve_depot_tools(explicit: Option<PathBuf>, default: PathBuf) -> Option<PathBuf> {
  explicit.or_else(|| default.is_dir().then_some(default))
}
