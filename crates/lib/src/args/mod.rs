//! Build arguments in GN's `args.gn` format.
//!
//! [`BuildArgs`] is an ordered key/value map: replacing a key keeps its
//! original position, new keys are appended. Serialization is a pure
//! function of the entries, so equal args always produce identical bytes.

mod parse;
mod value;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use parse::ArgsParseError;
pub(crate) use parse::is_identifier;
pub use value::ArgValue;

/// Header line of every serialized args file.
const HEADER: &str = "# Generated by v8forge. Do not edit; regenerate from the base config instead.\n";

/// Defaults for an embeddable, monolithic static V8.
const MONOLITH_DEFAULTS: &str = r#"# Base GN args for a monolithic static V8 library.
# Target-specific keys (is_debug, target_cpu, v8_target_cpu, target_os,
# symbol_level) are derived from the build target and override these.
is_component_build = false
v8_monolithic = true
v8_use_external_startup_data = false
treat_warnings_as_errors = false
v8_enable_sandbox = false
v8_enable_pointer_compression = false
v8_enable_i18n_support = false
v8_enable_temporal_support = false
v8_enable_webassembly = true
enable_rust = false
clang_use_chrome_plugins = false
is_clang = true
use_custom_libcxx = false
"#;

#[derive(Debug, Error)]
pub enum ArgsError {
  #[error("failed to read args file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid args file '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: ArgsParseError,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildArgs {
  entries: Vec<(String, ArgValue)>,
}

impl BuildArgs {
  pub fn new() -> Self {
    Self::default()
  }

  /// The base configuration for a standalone monolithic library.
  pub fn monolith_defaults() -> Self {
    parse::parse(MONOLITH_DEFAULTS).expect("built-in monolith defaults must parse")
  }

  /// Text of the default base configuration, as written by `v8forge defaults`.
  pub fn monolith_defaults_text() -> &'static str {
    MONOLITH_DEFAULTS
  }

  /// Load a base configuration file.
  pub fn load(path: &Path) -> Result<Self, ArgsError> {
    let content = fs::read_to_string(path).map_err(|source| ArgsError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    content.parse().map_err(|source| ArgsError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn get(&self, key: &str) -> Option<&ArgValue> {
    self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  /// Set `key`, replacing any existing value in place.
  ///
  /// Returns the previous value.
  pub fn set(&mut self, key: impl Into<String>, value: ArgValue) -> Option<ArgValue> {
    let key = key.into();
    match self.entries.iter_mut().find(|(k, _)| *k == key) {
      Some((_, slot)) => Some(std::mem::replace(slot, value)),
      None => {
        self.entries.push((key, value));
        None
      }
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Serialize to `args.gn` text.
  pub fn to_gn_string(&self) -> String {
    let mut out = String::from(HEADER);
    for (key, value) in &self.entries {
      out.push_str(key);
      out.push_str(" = ");
      out.push_str(&value.to_string());
      out.push('\n');
    }
    out
  }

  /// SHA-256 of the serialized form, lowercase hex.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_gn_string().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl FromStr for BuildArgs {
  type Err = ArgsParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse::parse(s)
  }
}

impl<K: Into<String>> FromIterator<(K, ArgValue)> for BuildArgs {
  fn from_iter<I: IntoIterator<Item = (K, ArgValue)>>(iter: I) -> Self {
    let mut args = BuildArgs::new();
    for (k, v) in iter {
      args.set(k, v);
    }
    args
  }
}
