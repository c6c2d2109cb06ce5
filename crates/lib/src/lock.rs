//! Advisory file locks serializing writers of a directory.
//!
//! Acquisition holds an exclusive lock on its destination; builds hold a
//! shared lock on the source tree and an exclusive lock on their own build
//! directory. Locks are non-blocking: contention is reported immediately with
//! the metadata of the most recent holder rather than waited out. Callers that
//! must wait poll [`DirLock::acquire`] themselves.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
  Shared,
  #[default]
  Exclusive,
}

impl fmt::Display for LockMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      LockMode::Shared => "shared",
      LockMode::Exclusive => "exclusive",
    })
  }
}

/// Written by every holder, so a contended acquire can name who is in the way.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub target: PathBuf,
  #[serde(default)]
  pub mode: LockMode,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "{target} is locked by another process: {command} ({mode} lock, PID {pid}, started {started_at})\n\
             If you're sure no v8forge process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    target: PathBuf,
    command: String,
    mode: LockMode,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "{target} is locked (could not read lock metadata)\n\
             If you're sure no v8forge process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { target: PathBuf, lock_path: PathBuf },

  #[error("failed to create lock directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to open lock file '{path}': {source}")]
  OpenFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Lock file guarding `dir`: a hidden sibling, so the directory itself can be replaced wholesale.
pub fn lock_path_for(dir: &Path) -> PathBuf {
  let name = dir
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "root".to_string());
  let parent = dir.parent().unwrap_or_else(|| Path::new("."));
  parent.join(format!(".{name}.lock"))
}

/// A held lock. Released when dropped.
#[derive(Debug)]
pub struct DirLock {
  file: File,
  lock_path: PathBuf,
}

impl DirLock {
  /// Reads the lock metadata from the held file handle.
  ///
  /// Reads through the held handle because opening a second one fails on
  /// Windows under mandatory locking.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  /// Try to lock `dir` without blocking.
  pub fn acquire(dir: &Path, mode: LockMode, command: &str) -> Result<Self, LockError> {
    let lock_path = lock_path_for(dir);

    if let Some(parent) = lock_path.parent()
      && !parent.exists()
    {
      std::fs::create_dir_all(parent).map_err(|source| LockError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(|source| LockError::OpenFile {
        path: lock_path.clone(),
        source,
      })?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(Self::read_contention_error(dir, &lock_path));
      }
      return Err(LockError::LockFailed(err));
    }

    // Shared holders write best-effort: Windows refuses writes inside a range locked shared.
    match Self::write_metadata(&file, mode, command, dir) {
      Err(err) if mode == LockMode::Shared => debug!(error = %err, "shared lock metadata not recorded"),
      result => result?,
    }

    Ok(DirLock { file, lock_path })
  }

  fn write_metadata(file: &File, mode: LockMode, command: &str, target: &Path) -> Result<(), LockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      command: command.to_string(),
      target: target.to_path_buf(),
      mode,
    };

    file.set_len(0).map_err(LockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(LockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(target: &Path, lock_path: &Path) -> LockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return LockError::Contention {
          target: target.to_path_buf(),
          command: metadata.command,
          mode: metadata.mode,
          pid: metadata.pid,
          started_at: format!("Unix timestamp {}", metadata.started_at_unix),
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    LockError::ContentionUnknown {
      target: target.to_path_buf(),
      lock_path: lock_path.to_path_buf(),
    }
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
