//! Content hashing for install manifests.
//!
//! - `hash_file()`: single file hashing (archives)
//! - `hash_directory()`: deterministic directory hashing (header trees)
//! - `hash_bytes()`: arbitrary byte hashing

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

/// A full 64-character lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Error)]
pub enum HashError {
  #[error("failed to walk directory '{path}': {source}")]
  WalkDir {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Compute a deterministic hash of a directory's contents.
///
/// Covers file contents, directory structure and symlink targets; ignores
/// timestamps and permissions. Entries are visited in file-name order.
pub fn hash_directory(path: &Path) -> Result<ContentHash, HashError> {
  let mut hasher = Sha256::new();

  for entry in WalkDir::new(path).sort_by_file_name() {
    let entry = entry.map_err(|source| HashError::WalkDir {
      path: path.to_path_buf(),
      source,
    })?;
    let entry_path = entry.path();

    // Forward slashes so the same tree hashes the same on Windows.
    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let line = if file_type.is_file() {
      format!("F:{}:{}", rel_path, hash_file(entry_path)?)
    } else if file_type.is_dir() {
      format!("D:{rel_path}")
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|source| HashError::Read {
        path: entry_path.to_path_buf(),
        source,
      })?;
      format!("L:{}:{}", rel_path, hash_bytes(target.to_string_lossy().as_bytes()))
    } else {
      continue;
    };

    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |source| HashError::Read {
    path: path.to_path_buf(),
    source,
  };
  let mut file = fs::File::open(path).map_err(read_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 64 * 1024];
  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn hash_is_deterministic() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("v8.h"), "// v8").unwrap();
    fs::create_dir(temp.path().join("cppgc")).unwrap();
    fs::write(temp.path().join("cppgc/heap.h"), "// heap").unwrap();

    let hash1 = hash_directory(temp.path()).unwrap();
    let hash2 = hash_directory(temp.path()).unwrap();

    assert_eq!(hash1, hash2);
    assert_eq!(hash1.0.len(), 64);
  }

  #[test]
  fn hash_changes_with_content() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("v8.h"), "original").unwrap();
    let hash1 = hash_directory(temp.path()).unwrap();

    fs::write(temp.path().join("v8.h"), "modified").unwrap();
    let hash2 = hash_directory(temp.path()).unwrap();

    assert_ne!(hash1, hash2);
  }

  #[test]
  fn same_content_different_structure_different_hash() {
    let temp1 = tempdir().unwrap();
    fs::write(temp1.path().join("file.h"), "content").unwrap();

    let temp2 = tempdir().unwrap();
    fs::create_dir(temp2.path().join("sub")).unwrap();
    fs::write(temp2.path().join("sub/file.h"), "content").unwrap();

    assert_ne!(
      hash_directory(temp1.path()).unwrap(),
      hash_directory(temp2.path()).unwrap()
    );
  }

  #[test]
  fn file_hash_matches_byte_hash() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("libv8_monolith.a");
    fs::write(&path, b"!<arch>\n").unwrap();

    assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"!<arch>\n"));
  }
}
