//! Fetching pinned git revisions.
//!
//! [`Fetcher`] is the seam between acquisition and the network: the real
//! implementation shells out to `git`, tests substitute a fake that writes
//! files directly.
//!
//! [`GitFetcher`] materializes exactly one revision per directory:
//! `git init`, a depth-1 fetch of the requested ref or commit, and a detached
//! checkout of `FETCH_HEAD`. The checked-out commit is read back with gix
//! rather than trusted from git's output.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::process::{self, CommandSpec, ProcessError, ProcessOptions, ProcessOutput};

#[derive(Debug, Error)]
pub enum FetchError {
  /// The remote has no such ref or commit.
  #[error("revision '{rev}' not found in '{url}'")]
  RevisionNotFound { url: String, rev: String },

  #[error("failed to create checkout directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("`{command}` failed with exit code {code:?}:\n{stderr}")]
  Git {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  #[error("failed to resolve HEAD in '{path}': {message}")]
  ResolveHead { path: PathBuf, message: String },

  #[error("'{url}' at '{rev}' checked out commit {commit}")]
  CommitMismatch { url: String, rev: String, commit: String },
}

/// Source of pinned checkouts.
pub trait Fetcher: Send + Sync {
  /// Populate `dest` with `url` at `rev` and return the checked-out commit.
  ///
  /// `dest` may not exist yet. Fails with [`FetchError::RevisionNotFound`]
  /// when `rev` does not resolve.
  fn fetch(&self, url: &str, rev: &str, dest: &Path) -> impl Future<Output = Result<String, FetchError>> + Send;

  /// Commit currently checked out in `dir`.
  fn head(&self, dir: &Path) -> Result<String, FetchError>;
}

/// [`Fetcher`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitFetcher {
  git: PathBuf,
  options: ProcessOptions,
}

impl Default for GitFetcher {
  fn default() -> Self {
    Self::new(ProcessOptions::default())
  }
}

impl GitFetcher {
  pub fn new(options: ProcessOptions) -> Self {
    Self {
      git: PathBuf::from("git"),
      options,
    }
  }

  /// Use a specific `git` executable instead of the one on `PATH`.
  pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
    self.git = git.into();
    self
  }

  async fn run(&self, cwd: &Path, args: &[&str]) -> Result<ProcessOutput, FetchError> {
    let spec = CommandSpec::new(&self.git, cwd).args(args.iter().copied());
    let output = process::run(&spec, &self.options).await?;
    if !output.success() {
      return Err(FetchError::Git {
        command: spec.to_string(),
        code: output.code(),
        stderr: output.stderr,
      });
    }
    Ok(output)
  }
}

impl Fetcher for GitFetcher {
  async fn fetch(&self, url: &str, rev: &str, dest: &Path) -> Result<String, FetchError> {
    fs::create_dir_all(dest).map_err(|source| FetchError::CreateDir {
      path: dest.to_path_buf(),
      source,
    })?;

    debug!(url, rev, dest = %dest.display(), "fetching");
    self.run(dest, &["init", "--quiet"]).await?;

    match self
      .run(dest, &["fetch", "--quiet", "--depth", "1", "--no-tags", url, rev])
      .await
    {
      Err(FetchError::Git { stderr, .. }) if is_missing_ref(&stderr) => {
        return Err(FetchError::RevisionNotFound {
          url: url.to_string(),
          rev: rev.to_string(),
        });
      }
      other => {
        other?;
      }
    }

    self
      .run(
        dest,
        &["-c", "advice.detachedHead=false", "checkout", "--quiet", "--detach", "FETCH_HEAD"],
      )
      .await?;

    let commit = self.head(dest)?;
    if is_full_hash(rev) && !commit.eq_ignore_ascii_case(rev) {
      return Err(FetchError::CommitMismatch {
        url: url.to_string(),
        rev: rev.to_string(),
        commit,
      });
    }

    info!(url, rev, commit = %commit, "checked out");
    Ok(commit)
  }

  fn head(&self, dir: &Path) -> Result<String, FetchError> {
    let repo = gix::open(dir).map_err(|e| FetchError::Open {
      path: dir.to_path_buf(),
      source: Box::new(e),
    })?;

    let resolve_err = |message: String| FetchError::ResolveHead {
      path: dir.to_path_buf(),
      message,
    };
    let mut head = repo.head().map_err(|e| resolve_err(e.to_string()))?;
    let commit = head.peel_to_commit().map_err(|e| resolve_err(e.to_string()))?;

    Ok(commit.id.to_string())
  }
}

/// Whether git's stderr says the requested ref or object does not exist on the remote.
fn is_missing_ref(stderr: &str) -> bool {
  const PATTERNS: &[&str] = &[
    "couldn't find remote ref",
    "not our ref",
    "no such remote ref",
    "unadvertised object",
    "Could not find remote branch",
  ];
  PATTERNS.iter().any(|p| stderr.contains(p))
}

fn is_full_hash(rev: &str) -> bool {
  rev.len() == 40 && rev.bytes().all(|b| b.is_ascii_hexdigit())
}
