//! Install layout assembly.
//!
//! ```text
//! <install_dir>/
//! ├── lib/
//! │   ├── libv8_monolith.a     (v8_monolith.lib on Windows)
//! │   └── libv8_libbase.a ...  auxiliary archives the build produced
//! ├── include/                 verbatim copy of <source>/include
//! ├── args.gn                  effective args
//! └── build.json               InstallManifest
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::args::BuildArgs;
use crate::consts::{ARGS_FILENAME, INSTALL_MANIFEST, MONOLITH_TARGET};
use crate::source::{SourceTree, VersionSpec};
use crate::target::TargetDescriptor;
use crate::util::fs::{copy_dir_all, replace_dir, staging_dir_for};
use crate::util::hash::{ContentHash, hash_directory, hash_file};

pub const INSTALL_FORMAT: u32 = 1;

/// Contents of `build.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallManifest {
  pub format: u32,
  pub version: VersionSpec,
  pub commit: String,
  pub target: TargetDescriptor,
  /// SHA-256 of `args.gn`.
  pub args_digest: String,
  pub primary: ArtifactRecord,
  pub auxiliary: Vec<ArtifactRecord>,
  pub headers: HeaderRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
  /// File name under `lib/`.
  pub name: String,
  pub size: u64,
  pub sha256: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
  pub files: u64,
  /// Deterministic hash of the `include/` tree.
  pub sha256: ContentHash,
}

impl InstallManifest {
  pub fn load(install_dir: &Path) -> io::Result<Self> {
    let content = fs::read_to_string(install_dir.join(INSTALL_MANIFEST))?;
    serde_json::from_str(&content).map_err(io::Error::other)
  }
}

/// An installed target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
  pub root: PathBuf,
  pub manifest: InstallManifest,
}

impl InstallLayout {
  pub fn lib_dir(&self) -> PathBuf {
    self.root.join("lib")
  }

  pub fn primary_library(&self) -> PathBuf {
    self.lib_dir().join(&self.manifest.primary.name)
  }

  pub fn auxiliary_libraries(&self) -> Vec<PathBuf> {
    let lib = self.lib_dir();
    self.manifest.auxiliary.iter().map(|a| lib.join(&a.name)).collect()
  }

  pub fn include_dir(&self) -> PathBuf {
    self.root.join("include")
  }

  pub fn args_file(&self) -> PathBuf {
    self.root.join(ARGS_FILENAME)
  }

  pub fn manifest_file(&self) -> PathBuf {
    self.root.join(INSTALL_MANIFEST)
  }
}

/// An I/O failure and the path it happened at.
#[derive(Debug)]
pub(super) struct InstallFailure {
  pub path: PathBuf,
  pub source: io::Error,
}

fn at(path: &Path) -> impl FnOnce(io::Error) -> InstallFailure + '_ {
  move |source| InstallFailure {
    path: path.to_path_buf(),
    source,
  }
}

/// Stage and swap in the install layout for a compiled `build_dir`.
pub(super) fn install(
  tree: &SourceTree,
  target: &TargetDescriptor,
  args: &BuildArgs,
  build_dir: &Path,
  install_dir: &Path,
) -> Result<InstallLayout, InstallFailure> {
  let layout = target.platform.layout();
  let obj_dir = build_dir.join("obj");

  let primary_src = obj_dir.join(layout.static_lib_name(MONOLITH_TARGET));
  if !primary_src.is_file() {
    return Err(InstallFailure {
      path: primary_src,
      source: io::Error::new(io::ErrorKind::NotFound, "primary archive was not produced by the build"),
    });
  }

  let staging = staging_dir_for(install_dir).map_err(at(install_dir))?;
  let lib_dir = staging.path().join("lib");
  fs::create_dir_all(&lib_dir).map_err(at(&lib_dir))?;

  let primary = copy_artifact(&primary_src, &lib_dir)?;
  let mut auxiliary = Vec::new();
  for stem in layout.auxiliary_archives() {
    let src = obj_dir.join(layout.static_lib_name(stem));
    if src.is_file() {
      auxiliary.push(copy_artifact(&src, &lib_dir)?);
    } else {
      debug!(archive = %src.display(), "auxiliary archive not built, skipping");
    }
  }

  let include_src = tree.include_dir();
  let include_dst = staging.path().join("include");
  let files = copy_dir_all(&include_src, &include_dst).map_err(at(&include_src))?;
  let headers = HeaderRecord {
    files,
    sha256: hash_directory(&include_dst).map_err(|e| InstallFailure {
      path: include_dst.clone(),
      source: io::Error::other(e),
    })?,
  };

  let args_text = args.to_gn_string();
  let args_path = staging.path().join(ARGS_FILENAME);
  fs::write(&args_path, &args_text).map_err(at(&args_path))?;

  let manifest = InstallManifest {
    format: INSTALL_FORMAT,
    version: tree.version.clone(),
    commit: tree.commit.clone(),
    target: target.clone(),
    args_digest: args.digest(),
    primary,
    auxiliary,
    headers,
  };
  let manifest_path = staging.path().join(INSTALL_MANIFEST);
  let mut json = serde_json::to_string_pretty(&manifest).map_err(|e| InstallFailure {
    path: manifest_path.clone(),
    source: io::Error::other(e),
  })?;
  json.push('\n');
  fs::write(&manifest_path, json).map_err(at(&manifest_path))?;

  replace_dir(staging, install_dir).map_err(at(install_dir))?;
  info!(
    path = %install_dir.display(),
    library = %manifest.primary.name,
    auxiliary = manifest.auxiliary.len(),
    headers = manifest.headers.files,
    "installed"
  );

  Ok(InstallLayout {
    root: install_dir.to_path_buf(),
    manifest,
  })
}

fn copy_artifact(src: &Path, lib_dir: &Path) -> Result<ArtifactRecord, InstallFailure> {
  let name = src
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let dst = lib_dir.join(&name);
  let size = fs::copy(src, &dst).map_err(at(src))?;
  let sha256 = hash_file(&dst).map_err(|e| InstallFailure {
    path: dst.clone(),
    source: io::Error::other(e),
  })?;
  Ok(ArtifactRecord { name, size, sha256 })
}
