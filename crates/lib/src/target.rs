//! Build targets and the override table derived from them.
//!
//! A [`TargetDescriptor`] fully determines which keys are forced on top of the
//! base configuration. Overrides are computed only from the descriptor, never
//! from the host, so the effective args for a given `(base, target)` pair are
//! identical on every machine.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::args::{ArgValue, BuildArgs};
use crate::consts::OUT_DIR;
use crate::platform::Platform;
use crate::platform::arch::Arch;
use crate::platform::os::Os;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
  #[default]
  Release,
  Debug,
}

impl Variant {
  pub fn is_debug(&self) -> bool {
    matches!(self, Self::Debug)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Release => "release",
      Self::Debug => "debug",
    }
  }

  /// Symbol level used when the target does not request one.
  pub fn default_symbol_level(&self) -> u8 {
    match self {
      Self::Release => 0,
      Self::Debug => 1,
    }
  }
}

impl fmt::Display for Variant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Variant {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "release" => Ok(Self::Release),
      "debug" => Ok(Self::Debug),
      other => Err(format!("unknown variant '{other}' (expected release or debug)")),
    }
  }
}

/// Everything that selects target overrides and artifact paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetDescriptor {
  pub platform: Platform,
  pub variant: Variant,
  /// Explicit GN `symbol_level`. Defaults from the variant.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub symbol_level: Option<u8>,
  /// Clang toolchain root. Embedded only when explicitly requested.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub clang_base_path: Option<PathBuf>,
  /// Compiler cache wrapper such as `sccache`. Embedded only when explicitly requested.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cc_wrapper: Option<String>,
}

impl TargetDescriptor {
  /// Create a target, falling back to release where the platform has no debug support.
  pub fn new(os: Os, arch: Arch, variant: Variant) -> Self {
    let platform = Platform::new(os, arch);
    let variant = if variant.is_debug() && !platform.layout().supports_debug() {
      warn!(platform = %platform, "debug builds are not supported on this platform, using release");
      Variant::Release
    } else {
      variant
    };

    Self {
      platform,
      variant,
      symbol_level: None,
      clang_base_path: None,
      cc_wrapper: None,
    }
  }

  pub fn with_symbol_level(mut self, level: u8) -> Self {
    self.symbol_level = Some(level);
    self
  }

  pub fn with_clang_base_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.clang_base_path = Some(path.into());
    self
  }

  pub fn with_cc_wrapper(mut self, wrapper: impl Into<String>) -> Self {
    self.cc_wrapper = Some(wrapper.into());
    self
  }

  /// Directory name scoping this target's intermediate state, e.g. `linux-x64-release`.
  pub fn build_dir_name(&self) -> String {
    format!("{}-{}", self.platform.triple(), self.variant)
  }

  /// Build directory relative to the source root, e.g. `out.gn/linux-x64-release`.
  pub fn build_dir(&self) -> PathBuf {
    PathBuf::from(OUT_DIR).join(self.build_dir_name())
  }

  /// Compute the override table for this target.
  pub fn overrides(&self) -> Result<Overrides, MergeConflict> {
    let cpu = self.platform.arch.as_str();
    let symbol_level = self.symbol_level.unwrap_or_else(|| self.variant.default_symbol_level());

    let mut table = Overrides::default();
    table.push("is_debug", ArgValue::Bool(self.variant.is_debug()), OverrideSource::Variant)?;
    table.push("target_os", ArgValue::str(self.platform.os.as_str()), OverrideSource::Platform)?;
    table.push("target_cpu", ArgValue::str(cpu), OverrideSource::Arch)?;
    table.push("v8_target_cpu", ArgValue::str(cpu), OverrideSource::Arch)?;
    table.push("symbol_level", ArgValue::Int(i64::from(symbol_level)), OverrideSource::Variant)?;

    for (key, value) in self.platform.layout().platform_args() {
      table.push(key, value, OverrideSource::Platform)?;
    }

    if let Some(path) = &self.clang_base_path {
      table.push(
        "clang_base_path",
        ArgValue::str(path.to_string_lossy()),
        OverrideSource::Requested,
      )?;
    }
    if let Some(wrapper) = &self.cc_wrapper {
      table.push("cc_wrapper", ArgValue::str(wrapper.as_str()), OverrideSource::Requested)?;
    }

    Ok(table)
  }
}

impl fmt::Display for TargetDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.platform, self.variant)
  }
}

/// Where an override came from, for conflict reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideSource {
  Arch,
  Variant,
  Platform,
  Requested,
}

impl fmt::Display for OverrideSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Arch => "architecture",
      Self::Variant => "variant",
      Self::Platform => "platform",
      Self::Requested => "explicit request",
    })
  }
}

/// Two override rules assign different values to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("conflicting overrides for '{key}': {first} from {first_source}, {second} from {second_source}")]
pub struct MergeConflict {
  pub key: String,
  pub first: ArgValue,
  pub first_source: OverrideSource,
  pub second: ArgValue,
  pub second_source: OverrideSource,
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
  entries: Vec<(String, ArgValue, OverrideSource)>,
}

impl Overrides {
  /// Add an override. Re-adding a key with the same value is a no-op; a different value is a conflict.
  pub fn push(&mut self, key: &str, value: ArgValue, source: OverrideSource) -> Result<(), MergeConflict> {
    if let Some((_, existing, existing_source)) = self.entries.iter().find(|(k, _, _)| k == key) {
      if *existing == value {
        return Ok(());
      }
      return Err(MergeConflict {
        key: key.to_string(),
        first: existing.clone(),
        first_source: *existing_source,
        second: value,
        second_source: source,
      });
    }
    self.entries.push((key.to_string(), value, source));
    Ok(())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
    self.entries.iter().map(|(k, v, _)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Apply on top of `base`, last writer wins. Base keys not overridden are kept as-is.
  pub fn apply(&self, base: &BuildArgs) -> BuildArgs {
    let mut merged = base.clone();
    for (key, value) in self.iter() {
      merged.set(key, value.clone());
    }
    merged
  }
}

/// Effective args for `target`: the base config with target overrides applied.
pub fn merge(base: &BuildArgs, target: &TargetDescriptor) -> Result<BuildArgs, MergeConflict> {
  Ok(target.overrides()?.apply(base))
}
