//! Dependency manifests derived from `DEPS` files.
//!
//! # Entry forms
//!
//! ```python
//! deps = {
//!   'build': Var('chromium_url') + '/chromium/src/build.git' + '@' + 'e3f1...',
//!   'third_party/icu': {
//!     'url': Var('chromium_url') + '/chromium/deps/icu.git' + '@' + 'a1b2...',
//!     'condition': 'checkout_icu',
//!   },
//!   'buildtools/linux64': { 'packages': [...], 'dep_type': 'cipd' },
//! }
//! ```
//!
//! Git entries become a [`Dependency`]. CIPD and GCS entries hold prebuilt
//! binaries the monolith build does not use and are skipped, as are entries
//! whose condition is false and entries whose url is `None`.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::deps::{DepsError, DepsFile, Value, eval_condition};
use crate::args::{ArgValue, BuildArgs};
use crate::platform::Platform;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error(transparent)]
  Deps(#[from] DepsError),

  #[error("dependency '{path}' has no pinned revision ('{spec}')")]
  MissingRevision { path: String, spec: String },

  #[error("dependency '{path}': {message}")]
  InvalidEntry { path: String, message: String },

  #[error("dependency '{path}' is declared both as {first} and as {second}")]
  Conflict { path: String, first: String, second: String },

  #[error("dependency path '{path}' is outside the source tree")]
  InvalidPath { path: String },

  #[error("dependency '{path}' pins revision '{rev}', which does not exist in '{url}'")]
  RevisionNotFound { path: String, url: String, rev: String },
}

/// A git dependency pinned to a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
  /// Checkout location relative to the source root, `/`-separated.
  pub path: String,
  pub url: String,
  pub rev: String,
}

impl Dependency {
  /// The `url@rev` form used in `DEPS`.
  pub fn spec(&self) -> String {
    format!("{}@{}", self.url, self.rev)
  }
}

/// All dependencies of a source tree, in resolution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyManifest {
  entries: Vec<Dependency>,
}

impl DependencyManifest {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a dependency.
  ///
  /// Returns `Ok(false)` if the same path is already pinned to the same
  /// `url@rev`, and a [`ManifestError::Conflict`] if it is pinned differently.
  pub fn insert(&mut self, dep: Dependency) -> Result<bool, ManifestError> {
    if let Some(existing) = self.get(&dep.path) {
      if existing.url == dep.url && existing.rev == dep.rev {
        return Ok(false);
      }
      return Err(ManifestError::Conflict {
        path: dep.path.clone(),
        first: existing.spec(),
        second: dep.spec(),
      });
    }
    self.entries.push(dep);
    Ok(true)
  }

  pub fn get(&self, path: &str) -> Option<&Dependency> {
    self.entries.iter().find(|d| d.path == path)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Inputs to condition evaluation.
#[derive(Debug, Clone, Copy)]
pub struct DepsContext<'a> {
  /// Platform providing `host_os`, `host_cpu` and the default `checkout_*` flags.
  pub host: Platform,
  /// Extra identifiers forced true, e.g. `checkout_google_benchmark`.
  pub conditions: &'a [String],
  /// gclient solution name, the prefix of paths when `use_relative_paths` is off.
  pub solution: &'a str,
}

/// The parts of one `DEPS` file that drive acquisition.
#[derive(Debug, Clone, Default)]
pub struct ParsedDeps {
  /// Selected dependencies, paths relative to the source root.
  pub dependencies: Vec<Dependency>,
  /// Source-root-relative paths of dependencies whose own `DEPS` is followed.
  pub recursedeps: Vec<String>,
  /// `gclient_gn_args_file`: a GN file generated from selected vars.
  pub gn_args: Option<(String, BuildArgs)>,
}

/// Evaluate the `DEPS` file `source` found in `dir` (relative to the source root).
pub fn parse_deps(source: &str, dir: &str, ctx: &DepsContext<'_>) -> Result<ParsedDeps, ManifestError> {
  let file = DepsFile::parse(source)?;
  let relative = matches!(file.get("use_relative_paths"), Some(Value::Bool(true)));
  let locate = |declared: &str| resolve_path(dir, declared, relative, ctx.solution);

  let mut parsed = ParsedDeps::default();

  match file.get("deps") {
    None | Some(Value::None) => {}
    Some(Value::Dict(entries)) => {
      for (declared, entry) in entries {
        if let Some((url, rev)) = select_entry(&file, declared, entry, ctx)? {
          parsed.dependencies.push(Dependency {
            path: locate(declared)?,
            url,
            rev,
          });
        }
      }
    }
    Some(other) => {
      return Err(DepsError::Type(format!("'deps' must be a dict, found {}", other.type_name())).into());
    }
  }

  if let Some(Value::List(items)) = file.get("recursedeps") {
    for item in items {
      // Older files use `('path', 'DEPS.chromium')` pairs.
      let declared = match item {
        Value::Str(s) => s.as_str(),
        Value::List(pair) => pair.first().and_then(Value::as_str).unwrap_or_default(),
        _ => "",
      };
      if declared.is_empty() {
        return Err(DepsError::Type(format!("invalid recursedeps entry {item}")).into());
      }
      parsed.recursedeps.push(locate(declared)?);
    }
  }

  if let Some(Value::Str(gn_file)) = file.get("gclient_gn_args_file") {
    let mut args = BuildArgs::new();
    if let Some(Value::List(names)) = file.get("gclient_gn_args") {
      for name in names.iter().filter_map(Value::as_str) {
        let value = file
          .var(name)
          .ok_or_else(|| DepsError::UndefinedVariable(name.to_string()))?;
        let value = match value {
          Value::Bool(b) => ArgValue::Bool(*b),
          Value::Int(i) => ArgValue::Int(*i),
          Value::Str(s) => ArgValue::str(s.as_str()),
          other => {
            return Err(DepsError::Type(format!("gn arg '{name}' cannot be a {}", other.type_name())).into());
          }
        };
        args.set(name, value);
      }
    }
    parsed.gn_args = Some((locate(gn_file)?, args));
  }

  Ok(parsed)
}

/// Decide whether `entry` is a git dependency to fetch, and split its `url@rev`.
fn select_entry(
  file: &DepsFile,
  path: &str,
  entry: &Value,
  ctx: &DepsContext<'_>,
) -> Result<Option<(String, String)>, ManifestError> {
  let invalid = |message: String| ManifestError::InvalidEntry {
    path: path.to_string(),
    message,
  };

  let url = match entry {
    Value::None => return Ok(None),
    Value::Str(url) => url.as_str(),
    Value::Dict(_) => {
      match entry.get("dep_type") {
        None => {}
        Some(Value::Str(t)) if t == "git" => {}
        Some(Value::Str(t)) => {
          debug!(path, dep_type = %t, "skipping non-git dependency");
          return Ok(None);
        }
        Some(other) => return Err(invalid(format!("dep_type must be a str, found {}", other.type_name()))),
      }

      match entry.get("condition") {
        None => {}
        Some(Value::Str(condition)) => {
          if !eval_condition(condition, |name| lookup(file, ctx, name))? {
            debug!(path, condition = %condition, "condition is false, skipping");
            return Ok(None);
          }
        }
        Some(other) => return Err(invalid(format!("condition must be a str, found {}", other.type_name()))),
      }

      match entry.get("url") {
        None | Some(Value::None) => return Ok(None),
        Some(Value::Str(url)) => url.as_str(),
        Some(other) => return Err(invalid(format!("url must be a str, found {}", other.type_name()))),
      }
    }
    other => return Err(invalid(format!("expected a str or dict, found {}", other.type_name()))),
  };

  let spec = file.interpolate(url)?;
  match spec.rsplit_once('@') {
    Some((url, rev)) if !url.is_empty() && !rev.is_empty() && !rev.contains('/') => {
      Ok(Some((url.to_string(), rev.to_string())))
    }
    _ => Err(ManifestError::MissingRevision {
      path: path.to_string(),
      spec,
    }),
  }
}

/// Resolve a condition identifier: forced conditions, then `vars`, then gclient builtins.
fn lookup(file: &DepsFile, ctx: &DepsContext<'_>, name: &str) -> Result<Value, DepsError> {
  if ctx.conditions.iter().any(|c| c == name) {
    return Ok(Value::Bool(true));
  }
  if let Some(value) = file.var(name) {
    return Ok(value.clone());
  }

  let os = ctx.host.os.as_str();
  let cpu = ctx.host.arch.as_str();
  match name {
    "host_os" => Ok(Value::Str(os.to_string())),
    "host_cpu" => Ok(Value::Str(cpu.to_string())),
    _ => match name.strip_prefix("checkout_") {
      Some(suffix) => Ok(Value::Bool(suffix == os || suffix == cpu)),
      None => Err(DepsError::UndefinedVariable(name.to_string())),
    },
  }
}

/// Map a declared `DEPS` path to a `/`-separated path relative to the source root.
fn resolve_path(dir: &str, declared: &str, relative: bool, solution: &str) -> Result<String, ManifestError> {
  let invalid = || ManifestError::InvalidPath {
    path: declared.to_string(),
  };

  let rooted = if relative {
    declared.to_string()
  } else {
    declared
      .strip_prefix(solution)
      .and_then(|rest| rest.strip_prefix('/'))
      .ok_or_else(invalid)?
      .to_string()
  };

  let mut parts: Vec<&str> = if relative && !dir.is_empty() {
    dir.split('/').collect()
  } else {
    Vec::new()
  };
  for component in Path::new(&rooted).components() {
    match component {
      Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
      Component::CurDir => {}
      _ => return Err(invalid()),
    }
  }

  if parts.is_empty() {
    return Err(invalid());
  }
  Ok(parts.join("/"))
}
