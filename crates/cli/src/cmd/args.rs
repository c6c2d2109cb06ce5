//! `v8forge args` and `v8forge defaults`.

use std::path::Path;

use anyhow::{Context, Result};

use v8forge_lib::args::BuildArgs;
use v8forge_lib::build::effective_args;
use v8forge_lib::platform::Os;
use v8forge_lib::target::{TargetDescriptor, Variant};

use crate::TargetArgs;

/// Base args from `config`, or the built-in monolith defaults.
pub(crate) fn load_base(config: Option<&Path>) -> Result<BuildArgs> {
  match config {
    Some(path) => BuildArgs::load(path).with_context(|| format!("Failed to load base args: {}", path.display())),
    None => Ok(BuildArgs::monolith_defaults()),
  }
}

pub(crate) fn target_descriptor(args: &TargetArgs) -> Result<TargetDescriptor> {
  let os = match args.os {
    Some(os) => os,
    None => Os::current().context("Unsupported host OS; pass --os explicitly")?,
  };
  let variant = if args.debug { Variant::Debug } else { Variant::Release };

  let mut target = TargetDescriptor::new(os, args.arch, variant);
  if let Some(level) = args.symbol_level {
    target = target.with_symbol_level(level);
  }
  if let Some(path) = &args.clang_base_path {
    target = target.with_clang_base_path(path);
  }
  if let Some(wrapper) = &args.cc_wrapper {
    target = target.with_cc_wrapper(wrapper);
  }
  Ok(target)
}

pub fn cmd_args(config: Option<&Path>, target: &TargetArgs) -> Result<()> {
  let base = load_base(config)?;
  let target = target_descriptor(target)?;
  let args = effective_args(&base, &target).with_context(|| format!("Failed to merge args for {target}"))?;
  print!("{}", args.to_gn_string());
  Ok(())
}

pub fn cmd_defaults() {
  print!("{}", BuildArgs::monolith_defaults_text());
}
