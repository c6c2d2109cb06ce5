//! Transactional acquisition of a source tree.
//!
//! # Algorithm
//!
//! 1. Lock the destination exclusively (sibling `.<name>.lock`)
//! 2. If the marker records the requested version and the checkout's HEAD
//!    still matches the recorded commit, return the existing tree
//! 3. Fetch the primary repository into a staging directory beside the
//!    destination
//! 4. Breadth-first over `DEPS` files: fetch each selected dependency, then
//!    follow `recursedeps`
//! 5. Apply source patches, write the gclient GN args file and the marker
//! 6. Swap the staging directory into place
//!
//! Any failure before step 6 drops the staging directory, leaving the
//! destination exactly as it was.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::fetch::{FetchError, Fetcher};
use super::manifest::{DependencyManifest, DepsContext, ManifestError, parse_deps};
use super::marker::{LockedDependency, MARKER_FORMAT, SourceMarker};
use super::{AcquireError, SourceConfig, SourceTree, VersionSpec};
use crate::lock::{DirLock, LockMode};
use crate::util::fs::{replace_dir, staging_dir_for};

pub struct Acquirer<F> {
  fetcher: F,
  config: SourceConfig,
}

impl<F: Fetcher> Acquirer<F> {
  pub fn new(fetcher: F, config: SourceConfig) -> Self {
    Self { fetcher, config }
  }

  pub fn fetcher(&self) -> &F {
    &self.fetcher
  }

  pub fn config(&self) -> &SourceConfig {
    &self.config
  }

  /// Materialize `version` at `destination`.
  ///
  /// A no-op when `destination` already holds a validated tree for `version`.
  pub async fn acquire(&self, version: &VersionSpec, destination: &Path) -> Result<SourceTree, AcquireError> {
    let io_err = |path: &Path| {
      let path = path.to_path_buf();
      move |source: io::Error| AcquireError::Io {
        version: version.clone(),
        path,
        source,
      }
    };

    let resolved = resolve_destination(destination).map_err(io_err(destination))?;
    let destination = resolved.as_path();
    let _lock = DirLock::acquire(destination, LockMode::Exclusive, &format!("fetch {version}"))?;

    if let Some(tree) = self.existing(version, destination) {
      info!(version = %version, path = %destination.display(), "source tree already acquired");
      return Ok(tree);
    }

    info!(version = %version, url = %self.config.url, path = %destination.display(), "acquiring source tree");
    let staging = staging_dir_for(destination).map_err(io_err(destination))?;
    let marker = self.populate(version, staging.path()).await?;
    replace_dir(staging, destination).map_err(io_err(destination))?;

    let root = dunce::canonicalize(destination).map_err(io_err(destination))?;
    info!(version = %version, commit = %marker.commit, dependencies = marker.dependencies.len(), "source tree ready");
    Ok(SourceTree::from_marker(root, marker))
  }

  /// The tree at `destination` if its marker and HEAD both match `version`.
  fn existing(&self, version: &VersionSpec, destination: &Path) -> Option<SourceTree> {
    let marker = match SourceMarker::load(destination) {
      Ok(Some(marker)) => marker,
      Ok(None) => return None,
      Err(e) => {
        warn!(error = %e, "ignoring unreadable source marker");
        return None;
      }
    };

    if marker.version != *version {
      info!(found = %marker.version, requested = %version, "source tree holds another version, replacing");
      return None;
    }

    match self.fetcher.head(destination) {
      Ok(head) if head == marker.commit => {
        let root = dunce::canonicalize(destination).ok()?;
        Some(SourceTree::from_marker(root, marker))
      }
      Ok(head) => {
        warn!(expected = %marker.commit, found = %head, "checkout moved since acquisition, refetching");
        None
      }
      Err(e) => {
        warn!(error = %e, "cannot verify checkout, refetching");
        None
      }
    }
  }

  /// Fill `root` with the primary checkout and its dependencies and write the marker.
  async fn populate(&self, version: &VersionSpec, root: &Path) -> Result<SourceMarker, AcquireError> {
    let commit = self
      .fetcher
      .fetch(&self.config.url, version.as_str(), root)
      .await
      .map_err(|e| match e {
        FetchError::RevisionNotFound { .. } => AcquireError::VersionNotFound {
          version: version.clone(),
          url: self.config.url.clone(),
        },
        source => AcquireError::Fetch {
          version: version.clone(),
          source,
        },
      })?;

    let dependencies = self.fetch_dependencies(version, root).await?;

    for patch in &self.config.patches {
      patch.apply(root).map_err(|source| AcquireError::Patch {
        version: version.clone(),
        source,
      })?;
    }

    let marker = SourceMarker {
      format: MARKER_FORMAT,
      version: version.clone(),
      url: self.config.url.clone(),
      commit,
      dependencies,
    };
    marker.save(root)?;
    Ok(marker)
  }

  async fn fetch_dependencies(
    &self,
    version: &VersionSpec,
    root: &Path,
  ) -> Result<Vec<LockedDependency>, AcquireError> {
    let ctx = DepsContext {
      host: self.config.host,
      conditions: &self.config.conditions,
      solution: &self.config.solution,
    };
    let mut manifest = DependencyManifest::new();
    let mut locked = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = VecDeque::from([String::new()]);

    while let Some(dir) = pending.pop_front() {
      if !visited.insert(dir.clone()) {
        continue;
      }

      let deps_path = root.join(&dir).join(&self.config.deps_file);
      let source = match fs::read_to_string(&deps_path) {
        Ok(source) => source,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
          debug!(dir = %dir, "no DEPS file");
          continue;
        }
        Err(source) => {
          return Err(AcquireError::Io {
            version: version.clone(),
            path: deps_path,
            source,
          });
        }
      };

      let resolution_err = |source: ManifestError| AcquireError::DependencyResolution {
        version: version.clone(),
        file: display_path(&dir, &self.config.deps_file),
        source,
      };

      let parsed = parse_deps(&source, &dir, &ctx).map_err(resolution_err)?;
      debug!(dir = %dir, count = parsed.dependencies.len(), "resolved DEPS");

      for dep in parsed.dependencies {
        if !manifest.insert(dep.clone()).map_err(resolution_err)? {
          continue;
        }

        let commit = self
          .fetcher
          .fetch(&dep.url, &dep.rev, &root.join(&dep.path))
          .await
          .map_err(|e| match e {
            FetchError::RevisionNotFound { url, rev } => resolution_err(ManifestError::RevisionNotFound {
              path: dep.path.clone(),
              url,
              rev,
            }),
            source => AcquireError::DependencyFetch {
              version: version.clone(),
              path: dep.path.clone(),
              source,
            },
          })?;

        locked.push(LockedDependency {
          path: dep.path,
          url: dep.url,
          rev: dep.rev,
          commit,
        });
      }

      for path in parsed.recursedeps {
        if manifest.get(&path).is_some() {
          pending.push_back(path);
        } else {
          debug!(path = %path, "recursedeps entry was not selected, skipping");
        }
      }

      if dir.is_empty()
        && let Some((file, args)) = parsed.gn_args
      {
        let mut content = format!("# Generated from '{}' by v8forge.\n", self.config.deps_file);
        for (key, value) in args.iter() {
          content.push_str(&format!("{key} = {value}\n"));
        }
        let path = root.join(&file);
        let write = || -> io::Result<()> {
          if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
          }
          fs::write(&path, &content)
        };
        write().map_err(|source| AcquireError::Io {
          version: version.clone(),
          path: path.clone(),
          source,
        })?;
      }
    }

    Ok(locked)
  }
}

/// `destination` as `build` will see it once acquired, so both lock the same file.
///
/// An existing tree resolves through symlinks; otherwise the parent is
/// created and resolved.
fn resolve_destination(destination: &Path) -> io::Result<PathBuf> {
  if let Ok(path) = dunce::canonicalize(destination) {
    return Ok(path);
  }
  let name = destination
    .file_name()
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no directory name"))?;
  let parent = match destination.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  fs::create_dir_all(parent)?;
  Ok(dunce::canonicalize(parent)?.join(name))
}

fn display_path(dir: &str, file: &str) -> PathBuf {
  if dir.is_empty() {
    PathBuf::from(file)
  } else {
    PathBuf::from(dir).join(file)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::{Arch, Os, Platform};
  use crate::source::SourcePatch;
  use std::collections::HashMap;
  use std::sync::Mutex;
  use tempfile::TempDir;

  const HEAD_FILE: &str = ".fake-head";

  /// In-memory remotes: url -> rev -> files.
  #[derive(Default)]
  struct FakeFetcher {
    repos: HashMap<String, HashMap<String, Vec<(String, String)>>>,
    fail_url: Option<String>,
    calls: Mutex<Vec<String>>,
  }

  impl FakeFetcher {
    fn repo(mut self, url: &str, rev: &str, files: &[(&str, &str)]) -> Self {
      self.repos.entry(url.to_string()).or_default().insert(
        rev.to_string(),
        files.iter().map(|(p, c)| (p.to_string(), c.to_string())).collect(),
      );
      self
    }

    fn failing(mut self, url: &str) -> Self {
      self.fail_url = Some(url.to_string());
      self
    }

    fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }
  }

  impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, rev: &str, dest: &Path) -> Result<String, FetchError> {
      self.calls.lock().unwrap().push(format!("{url}@{rev}"));

      if self.fail_url.as_deref() == Some(url) {
        return Err(FetchError::Git {
          command: format!("git fetch {url} {rev}"),
          code: Some(128),
          stderr: "fatal: the remote end hung up unexpectedly".into(),
        });
      }

      let files = self
        .repos
        .get(url)
        .and_then(|revs| revs.get(rev))
        .ok_or_else(|| FetchError::RevisionNotFound {
          url: url.to_string(),
          rev: rev.to_string(),
        })?;

      fs::create_dir_all(dest).unwrap();
      for (path, content) in files {
        let path = dest.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
      }
      let commit = format!("{rev}-commit");
      fs::write(dest.join(HEAD_FILE), &commit).unwrap();
      Ok(commit)
    }

    fn head(&self, dir: &Path) -> Result<String, FetchError> {
      fs::read_to_string(dir.join(HEAD_FILE)).map_err(|e| FetchError::ResolveHead {
        path: dir.to_path_buf(),
        message: e.to_string(),
      })
    }
  }

  const V8: &str = "https://example.com/v8.git";
  const BUILD: &str = "https://example.com/build.git";
  const GTEST: &str = "https://example.com/googletest.git";
  const ZLIB: &str = "https://example.com/zlib.git";

  const V8_DEPS: &str = r#"
use_relative_paths = True
gclient_gn_args_file = 'build/config/gclient_args.gni'
gclient_gn_args = [ 'checkout_google_benchmark' ]
vars = {
  'example_url': 'https://example.com',
  'checkout_google_benchmark': False,
}
deps = {
  'build': Var('example_url') + '/build.git' + '@' + 'b1',
  'third_party/googletest/src': Var('example_url') + '/googletest.git' + '@' + 'g1',
  'third_party/android_ndk': {
    'url': Var('example_url') + '/ndk.git' + '@' + 'n1',
    'condition': 'checkout_android',
  },
}
recursedeps = [ 'build' ]
"#;

  const BUILD_DEPS: &str = r#"
use_relative_paths = True
deps = {
  'third_party/zlib': 'https://example.com/zlib.git@z1',
}
"#;

  const BUILD_GN: &str = "if (x) {\n      cflags += [ \"-Wa,--crel,--allow-experimental-crel\" ]\n}\n";

  fn fetcher() -> FakeFetcher {
    FakeFetcher::default()
      .repo(
        V8,
        "14.2.231.17",
        &[("DEPS", V8_DEPS), ("include/v8.h", "// 14.2"), ("src/api.cc", "")],
      )
      .repo(
        V8,
        "14.3.0",
        &[("DEPS", V8_DEPS), ("include/v8.h", "// 14.3"), ("src/api.cc", "")],
      )
      .repo(
        BUILD,
        "b1",
        &[("DEPS", BUILD_DEPS), ("config/compiler/BUILD.gn", BUILD_GN)],
      )
      .repo(GTEST, "g1", &[("README.md", "googletest")])
      .repo(ZLIB, "z1", &[("zlib.h", "zlib")])
  }

  fn acquirer(fetcher: FakeFetcher) -> Acquirer<FakeFetcher> {
    let config = SourceConfig::new(Platform::new(Os::Linux, Arch::X64)).with_url(V8);
    Acquirer::new(fetcher, config)
  }

  fn version(v: &str) -> VersionSpec {
    VersionSpec::new(v).unwrap()
  }

  /// Entries of `dir` other than lock files.
  fn siblings(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .filter(|n| !n.ends_with(".lock"))
      .collect();
    names.sort();
    names
  }

  #[tokio::test]
  async fn acquires_primary_and_recursive_dependencies() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    let acquirer = acquirer(fetcher());

    let tree = acquirer.acquire(&version("14.2.231.17"), &dest).await.unwrap();

    assert_eq!(tree.commit, "14.2.231.17-commit");
    let deps: Vec<_> = tree.dependencies.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(deps, vec!["build", "third_party/googletest/src", "build/third_party/zlib"]);
    assert!(dest.join("include/v8.h").exists());
    assert!(dest.join("build/third_party/zlib/zlib.h").exists());
    assert!(!dest.join("third_party/android_ndk").exists());

    let gni = fs::read_to_string(dest.join("build/config/gclient_args.gni")).unwrap();
    assert!(gni.contains("checkout_google_benchmark = false\n"));

    let build_gn = fs::read_to_string(dest.join("build/config/compiler/BUILD.gn")).unwrap();
    assert!(!build_gn.contains("crel"));

    assert_eq!(SourceTree::open(&dest).unwrap(), tree);
    assert_eq!(siblings(temp.path()), vec!["v8"]);
  }

  #[tokio::test]
  async fn second_acquire_only_checks_marker() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    let acquirer = acquirer(fetcher());

    let first = acquirer.acquire(&version("14.2.231.17"), &dest).await.unwrap();
    let fetches = acquirer.fetcher().calls().len();
    let second = acquirer.acquire(&version("14.2.231.17"), &dest).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(acquirer.fetcher().calls().len(), fetches);
  }

  #[tokio::test]
  async fn directory_presence_alone_is_not_trusted() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    fs::create_dir_all(dest.join("include")).unwrap();
    fs::write(dest.join("include/v8.h"), "stale").unwrap();
    let acquirer = acquirer(fetcher());

    acquirer.acquire(&version("14.2.231.17"), &dest).await.unwrap();

    assert_eq!(fs::read_to_string(dest.join("include/v8.h")).unwrap(), "// 14.2");
  }

  #[tokio::test]
  async fn moved_head_triggers_refetch() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    let acquirer = acquirer(fetcher());

    acquirer.acquire(&version("14.2.231.17"), &dest).await.unwrap();
    fs::write(dest.join(HEAD_FILE), "someone-else").unwrap();
    let fetches = acquirer.fetcher().calls().len();

    let tree = acquirer.acquire(&version("14.2.231.17"), &dest).await.unwrap();

    assert!(acquirer.fetcher().calls().len() > fetches);
    assert_eq!(tree.commit, "14.2.231.17-commit");
  }

  #[tokio::test]
  async fn new_version_replaces_tree() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    let acquirer = acquirer(fetcher());

    acquirer.acquire(&version("14.2.231.17"), &dest).await.unwrap();
    let tree = acquirer.acquire(&version("14.3.0"), &dest).await.unwrap();

    assert_eq!(tree.version.as_str(), "14.3.0");
    assert_eq!(fs::read_to_string(dest.join("include/v8.h")).unwrap(), "// 14.3");
    assert_eq!(siblings(temp.path()), vec!["v8"]);
  }

  #[tokio::test]
  async fn unknown_version_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    let acquirer = acquirer(fetcher());

    let err = acquirer.acquire(&version("99.0.0"), &dest).await.unwrap_err();

    assert!(matches!(err, AcquireError::VersionNotFound { .. }), "{err:?}");
    assert!(!dest.exists());
    assert!(siblings(temp.path()).is_empty());
  }

  #[tokio::test]
  async fn failed_dependency_fetch_keeps_previous_tree() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");

    acquirer(fetcher())
      .acquire(&version("14.2.231.17"), &dest)
      .await
      .unwrap();
    let before = SourceTree::open(&dest).unwrap();

    let err = acquirer(fetcher().failing(ZLIB))
      .acquire(&version("14.3.0"), &dest)
      .await
      .unwrap_err();

    assert!(
      matches!(&err, AcquireError::DependencyFetch { path, .. } if path == "build/third_party/zlib"),
      "{err:?}"
    );
    assert_eq!(SourceTree::open(&dest).unwrap(), before);
    assert_eq!(fs::read_to_string(dest.join("include/v8.h")).unwrap(), "// 14.2");
    assert!(dest.join("build/third_party/zlib/zlib.h").exists());
    assert_eq!(siblings(temp.path()), vec!["v8"]);
  }

  #[tokio::test]
  async fn failed_first_acquire_leaves_no_destination() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");

    let err = acquirer(fetcher().failing(GTEST))
      .acquire(&version("14.2.231.17"), &dest)
      .await
      .unwrap_err();

    assert!(matches!(err, AcquireError::DependencyFetch { .. }));
    assert!(!dest.exists());
    assert!(siblings(temp.path()).is_empty());
  }

  #[tokio::test]
  async fn missing_dependency_revision_is_resolution_error() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    let fetcher = FakeFetcher::default()
      .repo(
        V8,
        "1.0",
        &[("DEPS", "use_relative_paths = True\ndeps = { 'build': 'https://example.com/build.git@nope' }")],
      )
      .repo(BUILD, "b1", &[]);

    let err = acquirer(fetcher).acquire(&version("1.0"), &dest).await.unwrap_err();

    assert!(
      matches!(
        &err,
        AcquireError::DependencyResolution {
          source: ManifestError::RevisionNotFound { .. },
          ..
        }
      ),
      "{err:?}"
    );
    assert!(!dest.exists());
  }

  #[tokio::test]
  async fn conflicting_pins_are_resolution_errors() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    let root_deps = r#"
deps = {
  'v8/build': 'https://example.com/build.git@b1',
  'v8/third_party/zlib': 'https://example.com/zlib.git@z1',
}
recursedeps = [ 'v8/build' ]
"#;
    let build_deps = "deps = { 'v8/third_party/zlib': 'https://example.com/zlib.git@z2' }";
    let fetcher = FakeFetcher::default()
      .repo(V8, "1.0", &[("DEPS", root_deps)])
      .repo(BUILD, "b1", &[("DEPS", build_deps)])
      .repo(ZLIB, "z1", &[])
      .repo(ZLIB, "z2", &[]);

    let err = acquirer(fetcher).acquire(&version("1.0"), &dest).await.unwrap_err();

    match err {
      AcquireError::DependencyResolution {
        file,
        source: ManifestError::Conflict { path, .. },
        ..
      } => {
        assert_eq!(path, "third_party/zlib");
        assert_eq!(file, PathBuf::from("build").join("DEPS"));
      }
      other => panic!("expected conflict, got {other:?}"),
    }
    assert!(!dest.exists());
  }

  #[tokio::test]
  async fn patches_can_be_disabled() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v8");
    let config = SourceConfig::new(Platform::new(Os::Linux, Arch::X64))
      .with_url(V8)
      .with_patches(Vec::<SourcePatch>::new());

    Acquirer::new(fetcher(), config)
      .acquire(&version("14.2.231.17"), &dest)
      .await
      .unwrap();

    let build_gn = fs::read_to_string(dest.join("build/config/compiler/BUILD.gn")).unwrap();
    assert!(build_gn.contains("crel"));
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn concurrent_acquire_is_rejected() {
    let temp = TempDir::new().unwrap();
    let dest = dunce::canonicalize(temp.path()).unwrap().join("v8");
    let _held = DirLock::acquire(&dest, LockMode::Exclusive, "fetch other").unwrap();

    let err = acquirer(fetcher())
      .acquire(&version("14.2.231.17"), &dest)
      .await
      .unwrap_err();

    assert!(matches!(err, AcquireError::Lock(_)), "{err:?}");
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn lock_follows_symlinked_destination() {
    let temp = TempDir::new().unwrap();
    let real = temp.path().join("real");
    fs::create_dir(&real).unwrap();
    std::os::unix::fs::symlink(&real, temp.path().join("link")).unwrap();
    let canonical = dunce::canonicalize(&real).unwrap().join("v8");
    let _held = DirLock::acquire(&canonical, LockMode::Exclusive, "build linux-x64-release").unwrap();

    let err = acquirer(fetcher())
      .acquire(&version("14.2.231.17"), &temp.path().join("link/./v8"))
      .await
      .unwrap_err();

    assert!(matches!(err, AcquireError::Lock(_)), "{err:?}");
    assert!(!real.join("v8").exists());
  }

  #[test]
  fn destination_resolves_through_parent() {
    let temp = TempDir::new().unwrap();
    let resolved = resolve_destination(&temp.path().join("nested/../v8")).unwrap();
    assert_eq!(resolved, dunce::canonicalize(temp.path()).unwrap().join("v8"));
  }
}
