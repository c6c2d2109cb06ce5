//! Source acquisition.
//!
//! Fetches a pinned V8 revision plus the git dependencies its `DEPS` file
//! declares into one directory, then records a version marker. A tree with a
//! marker is complete: acquisition stages everything beside the destination
//! and swaps it in only after the marker is written.
//!
//! # Layout
//!
//! ```text
//! <destination>/
//! ├── .git/                   primary checkout
//! ├── .v8forge-source.json    version marker
//! ├── DEPS
//! ├── include/                public headers
//! ├── build/                  dependency (own .git)
//! └── third_party/...         dependencies
//! ```

mod acquire;
pub mod deps;
pub mod fetch;
pub mod manifest;
pub mod marker;
pub mod patch;
mod version;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use acquire::Acquirer;
pub use fetch::{FetchError, Fetcher, GitFetcher};
pub use manifest::{Dependency, DependencyManifest, ManifestError};
pub use marker::{LockedDependency, MarkerError, SourceMarker};
pub use patch::{PatchError, SourcePatch};
pub use version::{InvalidVersion, VersionSpec};

use crate::consts::{DEFAULT_V8_URL, DEPS_FILENAME, SOURCE_MARKER};
use crate::lock::LockError;
use crate::platform::Platform;
use crate::target::TargetDescriptor;

#[derive(Debug, Error)]
pub enum AcquireError {
  #[error("V8 version '{version}' not found in '{url}'")]
  VersionNotFound { version: VersionSpec, url: String },

  #[error("dependency resolution failed for V8 {version} ({}): {source}", file.display())]
  DependencyResolution {
    version: VersionSpec,
    file: PathBuf,
    #[source]
    source: ManifestError,
  },

  #[error("failed to fetch V8 {version}: {source}")]
  Fetch {
    version: VersionSpec,
    #[source]
    source: FetchError,
  },

  #[error("failed to fetch dependency '{path}' of V8 {version}: {source}")]
  DependencyFetch {
    version: VersionSpec,
    path: String,
    #[source]
    source: FetchError,
  },

  #[error("failed to patch V8 {version}: {source}")]
  Patch {
    version: VersionSpec,
    #[source]
    source: PatchError,
  },

  #[error("I/O error acquiring V8 {version} at '{}': {source}", path.display())]
  Io {
    version: VersionSpec,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("'{}' is not an acquired source tree (no {SOURCE_MARKER}); run `v8forge fetch` first", path.display())]
  NotAcquired { path: PathBuf },

  #[error(transparent)]
  Marker(#[from] MarkerError),

  #[error(transparent)]
  Lock(#[from] LockError),
}

/// Explicit acquisition settings.
#[derive(Debug, Clone)]
pub struct SourceConfig {
  /// Primary repository.
  pub url: String,
  /// Manifest file name in each checkout.
  pub deps_file: String,
  /// gclient solution name.
  pub solution: String,
  /// Platform answering `host_os`, `host_cpu` and `checkout_*` conditions.
  pub host: Platform,
  /// Condition names forced true.
  pub conditions: Vec<String>,
  pub patches: Vec<SourcePatch>,
}

impl SourceConfig {
  pub fn new(host: Platform) -> Self {
    Self {
      url: DEFAULT_V8_URL.to_string(),
      deps_file: DEPS_FILENAME.to_string(),
      solution: "v8".to_string(),
      host,
      conditions: Vec::new(),
      patches: SourcePatch::defaults(),
    }
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = url.into();
    self
  }

  pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
    self.conditions = conditions;
    self
  }

  pub fn with_patches(mut self, patches: Vec<SourcePatch>) -> Self {
    self.patches = patches;
    self
  }
}

/// A complete, marker-validated source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
  pub root: PathBuf,
  pub version: VersionSpec,
  pub url: String,
  pub commit: String,
  pub dependencies: Vec<LockedDependency>,
}

impl SourceTree {
  /// Open a previously acquired tree, validating its marker.
  pub fn open(root: &Path) -> Result<Self, AcquireError> {
    let marker = SourceMarker::load(root)?.ok_or_else(|| AcquireError::NotAcquired {
      path: root.to_path_buf(),
    })?;
    let root = dunce::canonicalize(root).map_err(|source| AcquireError::Io {
      version: marker.version.clone(),
      path: root.to_path_buf(),
      source,
    })?;
    Ok(Self::from_marker(root, marker))
  }

  pub(crate) fn from_marker(root: PathBuf, marker: SourceMarker) -> Self {
    Self {
      root,
      version: marker.version,
      url: marker.url,
      commit: marker.commit,
      dependencies: marker.dependencies,
    }
  }

  /// Public header tree.
  pub fn include_dir(&self) -> PathBuf {
    self.root.join("include")
  }

  /// Scoped build directory for `target`.
  pub fn build_dir(&self, target: &TargetDescriptor) -> PathBuf {
    self.root.join(target.build_dir())
  }
}
