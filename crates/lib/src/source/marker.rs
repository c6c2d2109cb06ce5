//! Version marker recorded at the root of an acquired source tree.
//!
//! Written last, just before the staged tree is swapped into place, so its
//! presence means acquisition completed. Contents are deterministic (no
//! timestamps) so two acquisitions of the same version produce identical
//! trees.
//!
//! ```json
//! {
//!   "format": 1,
//!   "version": "14.2.231.17",
//!   "url": "https://chromium.googlesource.com/v8/v8.git",
//!   "commit": "4a1b...",
//!   "dependencies": [
//!     { "path": "build", "url": "https://...", "rev": "e3f1...", "commit": "e3f1..." }
//!   ]
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::VersionSpec;
use crate::consts::SOURCE_MARKER;

pub const MARKER_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMarker {
  pub format: u32,
  pub version: VersionSpec,
  pub url: String,
  /// Commit the primary checkout resolved to.
  pub commit: String,
  pub dependencies: Vec<LockedDependency>,
}

/// A fetched dependency and the commit it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
  pub path: String,
  pub url: String,
  pub rev: String,
  pub commit: String,
}

#[derive(Debug, Error)]
pub enum MarkerError {
  #[error("failed to read source marker '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write source marker '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("corrupt source marker '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported source marker format {found} in '{path}', expected {MARKER_FORMAT}")]
  UnsupportedFormat { path: PathBuf, found: u32 },
}

impl SourceMarker {
  pub fn path(root: &Path) -> PathBuf {
    root.join(SOURCE_MARKER)
  }

  /// Load the marker from `root`. `Ok(None)` if there is none.
  pub fn load(root: &Path) -> Result<Option<Self>, MarkerError> {
    let path = Self::path(root);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(MarkerError::Read { path, source }),
    };

    let marker: SourceMarker = serde_json::from_str(&content).map_err(|source| MarkerError::Parse {
      path: path.clone(),
      source,
    })?;
    if marker.format != MARKER_FORMAT {
      return Err(MarkerError::UnsupportedFormat {
        path,
        found: marker.format,
      });
    }

    Ok(Some(marker))
  }

  pub fn save(&self, root: &Path) -> Result<(), MarkerError> {
    let path = Self::path(root);
    let mut content = serde_json::to_string_pretty(self).map_err(|e| MarkerError::Write {
      path: path.clone(),
      source: io::Error::other(e),
    })?;
    content.push('\n');
    fs::write(&path, content).map_err(|source| MarkerError::Write { path, source })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn sample() -> SourceMarker {
    SourceMarker {
      format: MARKER_FORMAT,
      version: VersionSpec::new("14.2.231.17").unwrap(),
      url: "https://example.com/v8.git".into(),
      commit: "c0ffee".into(),
      dependencies: vec![LockedDependency {
        path: "build".into(),
        url: "https://example.com/build.git".into(),
        rev: "b1".into(),
        commit: "b1".into(),
      }],
    }
  }

  #[test]
  fn missing_marker_is_none() {
    let temp = TempDir::new().unwrap();
    assert!(SourceMarker::load(temp.path()).unwrap().is_none());
  }

  #[test]
  fn save_then_load() {
    let temp = TempDir::new().unwrap();
    sample().save(temp.path()).unwrap();
    assert_eq!(SourceMarker::load(temp.path()).unwrap(), Some(sample()));
  }

  #[test]
  fn corrupt_marker_is_an_error() {
    let temp = TempDir::new().unwrap();
    fs::write(SourceMarker::path(temp.path()), "{ not json").unwrap();
    assert!(matches!(
      SourceMarker::load(temp.path()),
      Err(MarkerError::Parse { .. })
    ));
  }

  #[test]
  fn future_format_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut marker = sample();
    marker.format = 99;
    marker.save(temp.path()).unwrap();
    assert!(matches!(
      SourceMarker::load(temp.path()),
      Err(MarkerError::UnsupportedFormat { found: 99, .. })
    ));
  }
}
