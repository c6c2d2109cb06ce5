//! Textual edits applied to a freshly fetched tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PatchError {
  #[error("patch '{name}': failed to read '{path}': {source}")]
  Read {
    name: String,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("patch '{name}': failed to write '{path}': {source}")]
  Write {
    name: String,
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Remove (or replace) an exact snippet of a file in the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePatch {
  pub name: String,
  /// File relative to the source root.
  pub file: PathBuf,
  pub find: String,
  pub replace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
  Applied,
  /// The snippet was not found, so the file is already patched or upstream changed.
  AlreadyApplied,
  FileMissing,
}

impl SourcePatch {
  /// Drops `-Wa,--crel,--allow-experimental-crel`, which older linkers and
  /// assemblers reject.
  pub fn remove_crel_flag() -> Self {
    Self {
      name: "remove-experimental-crel".to_string(),
      file: PathBuf::from("build/config/compiler/BUILD.gn"),
      find: "      cflags += [ \"-Wa,--crel,--allow-experimental-crel\" ]\n".to_string(),
      replace: String::new(),
    }
  }

  /// The patches applied unless disabled.
  pub fn defaults() -> Vec<Self> {
    vec![Self::remove_crel_flag()]
  }

  pub fn apply(&self, root: &Path) -> Result<PatchOutcome, PatchError> {
    let path = root.join(&self.file);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        warn!(patch = %self.name, file = %self.file.display(), "file not found, skipping patch");
        return Ok(PatchOutcome::FileMissing);
      }
      Err(source) => {
        return Err(PatchError::Read {
          name: self.name.clone(),
          path,
          source,
        });
      }
    };

    if !content.contains(&self.find) {
      info!(patch = %self.name, "snippet not found or already removed");
      return Ok(PatchOutcome::AlreadyApplied);
    }

    let patched = content.replace(&self.find, &self.replace);
    fs::write(&path, patched).map_err(|source| PatchError::Write {
      name: self.name.clone(),
      path,
      source,
    })?;
    info!(patch = %self.name, file = %self.file.display(), "patched");
    Ok(PatchOutcome::Applied)
  }
}
