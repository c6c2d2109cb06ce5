//! Implementation of the `v8forge fetch` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use v8forge_lib::platform::Platform;
use v8forge_lib::process::ProcessOptions;
use v8forge_lib::source::{Acquirer, GitFetcher, SourceConfig, VersionSpec};

use crate::output::{format_duration, print_stat, print_success, truncate_hash};

pub fn cmd_fetch(
  version: &str,
  dest: &Path,
  url: Option<String>,
  no_patches: bool,
  conditions: Vec<String>,
) -> Result<()> {
  let start = Instant::now();
  let version: VersionSpec = version.parse().context("Invalid version")?;
  let host = Platform::current().context("Unsupported host platform")?;

  let mut config = SourceConfig::new(host).with_conditions(conditions);
  if let Some(url) = url {
    config = config.with_url(url);
  }
  if no_patches {
    config = config.with_patches(Vec::new());
  }

  let acquirer = Acquirer::new(GitFetcher::new(ProcessOptions::default()), config);
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let tree = rt
    .block_on(acquirer.acquire(&version, dest))
    .with_context(|| format!("Failed to fetch V8 {version}"))?;

  println!();
  print_success(&format!("V8 {} ready at {}", tree.version, tree.root.display()));
  print_stat("Commit", truncate_hash(&tree.commit));
  print_stat("Dependencies", &tree.dependencies.len().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));
  Ok(())
}
