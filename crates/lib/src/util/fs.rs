//! Filesystem helpers for all-or-nothing directory updates.
//!
//! Both source acquisition and install populate a staging directory next to
//! their destination and then swap it into place with [`replace_dir`]. The
//! staging directory lives on the same filesystem as the destination so the
//! final step is a rename.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Create an empty staging directory beside `dest`.
///
/// The directory is deleted when the returned guard drops, unless it has been
/// moved into place by [`replace_dir`] first.
pub fn staging_dir_for(dest: &Path) -> io::Result<TempDir> {
  let parent = parent_of(dest);
  fs::create_dir_all(parent)?;
  let name = dest
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  tempfile::Builder::new()
    .prefix(&format!(".{name}.staging-"))
    .tempdir_in(parent)
}

/// Atomically replace `dest` with the contents of `staging`.
///
/// An existing `dest` is first renamed aside and only deleted after the new
/// tree is in place. If the second rename fails, the old tree is restored.
pub fn replace_dir(staging: TempDir, dest: &Path) -> io::Result<()> {
  let staged = staging.keep();

  if !dest.exists() {
    return fs::rename(&staged, dest).inspect_err(|_| {
      let _ = fs::remove_dir_all(&staged);
    });
  }

  let backup = backup_path_for(dest);
  if backup.exists() {
    fs::remove_dir_all(&backup)?;
  }

  if let Err(e) = fs::rename(dest, &backup) {
    let _ = fs::remove_dir_all(&staged);
    return Err(e);
  }

  if let Err(e) = fs::rename(&staged, dest) {
    warn!(dest = %dest.display(), error = %e, "swap failed, restoring previous directory");
    let _ = fs::rename(&backup, dest);
    let _ = fs::remove_dir_all(&staged);
    return Err(e);
  }

  if let Err(e) = fs::remove_dir_all(&backup) {
    warn!(path = %backup.display(), error = %e, "failed to remove previous directory");
  }
  debug!(dest = %dest.display(), "directory replaced");
  Ok(())
}

fn backup_path_for(dest: &Path) -> PathBuf {
  let name = dest
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  parent_of(dest).join(format!(".{name}.previous"))
}

fn parent_of(path: &Path) -> &Path {
  match path.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  }
}

/// Recursively copy `src` into `dst`, creating `dst`. Symlinks are followed.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<u64> {
  let mut files = 0;
  fs::create_dir_all(dst)?;

  for entry in WalkDir::new(src).follow_links(true).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(rel);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&target)?;
    } else {
      fs::copy(entry.path(), &target)?;
      files += 1;
    }
  }

  Ok(files)
}

/// Write `content` unless the file already holds exactly that.
///
/// Returns whether the file was written. Leaves mtimes alone for unchanged
/// files so incremental tools do not see spurious changes.
pub fn write_if_changed(path: &Path, content: &str) -> io::Result<bool> {
  match fs::read_to_string(path) {
    Ok(existing) if existing == content => Ok(false),
    _ => {
      fs::write(path, content)?;
      Ok(true)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn replace_creates_missing_dest() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("install");

    let staging = staging_dir_for(&dest).unwrap();
    fs::write(staging.path().join("new.txt"), "new").unwrap();
    replace_dir(staging, &dest).unwrap();

    assert_eq!(fs::read_to_string(dest.join("new.txt")).unwrap(), "new");
  }

  #[test]
  fn replace_swaps_existing_dest() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("install");
    fs::create_dir(&dest).unwrap();
    fs::write(dest.join("old.txt"), "old").unwrap();

    let staging = staging_dir_for(&dest).unwrap();
    fs::write(staging.path().join("new.txt"), "new").unwrap();
    replace_dir(staging, &dest).unwrap();

    assert!(!dest.join("old.txt").exists());
    assert!(dest.join("new.txt").exists());
    let leftovers: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1, "no staging or backup dirs left behind");
  }

  #[test]
  fn dropped_staging_is_removed() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    let staging_path = {
      let staging = staging_dir_for(&dest).unwrap();
      fs::write(staging.path().join("partial"), "x").unwrap();
      staging.path().to_path_buf()
    };

    assert!(!staging_path.exists());
    assert!(!dest.exists());
  }

  #[test]
  fn copy_dir_all_copies_tree() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("include");
    fs::create_dir_all(src.join("cppgc/internal")).unwrap();
    fs::write(src.join("v8.h"), "a").unwrap();
    fs::write(src.join("cppgc/internal/api.h"), "b").unwrap();

    let dst = temp.path().join("out");
    let copied = copy_dir_all(&src, &dst).unwrap();

    assert_eq!(copied, 2);
    assert_eq!(fs::read_to_string(dst.join("cppgc/internal/api.h")).unwrap(), "b");
  }

  #[test]
  fn write_if_changed_skips_identical() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("args.gn");

    assert!(write_if_changed(&path, "a = 1\n").unwrap());
    assert!(!write_if_changed(&path, "a = 1\n").unwrap());
    assert!(write_if_changed(&path, "a = 2\n").unwrap());
  }
}
