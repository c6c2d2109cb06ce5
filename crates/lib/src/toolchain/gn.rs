use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{FailureReason, Toolchain, ToolchainConfig, ToolchainFailure, ToolchainStep};
use crate::args::{ArgValue, BuildArgs};
use crate::consts::MONOLITH_TARGET;
use crate::lock::{DirLock, LockError, LockMode};
use crate::platform::{Platform, PlatformLayout};
use crate::process::{self, CommandSpec, ProcessOptions, tool_path};

const CLANG_LOCK_POLL: Duration = Duration::from_millis(250);

/// Where `prepare` downloads Chromium's clang. Also GN's default `clang_base_path`.
pub fn bundled_clang_dir(source: &Path) -> PathBuf {
  source.join("third_party").join("llvm-build").join("Release+Asserts")
}

/// `gn gen` + `ninja`, run from the source root.
pub struct GnNinja {
  config: ToolchainConfig,
  layout: &'static dyn PlatformLayout,
}

impl GnNinja {
  /// `host` selects tool names and environment for the machine running the build.
  pub fn new(config: ToolchainConfig, host: Platform) -> Self {
    Self {
      config,
      layout: host.layout(),
    }
  }

  pub fn config(&self) -> &ToolchainConfig {
    &self.config
  }

  fn options(&self) -> ProcessOptions {
    ProcessOptions {
      timeout: self.config.timeout,
    }
  }

  /// Base command for `program`, with depot_tools on `PATH` and the toolchain env.
  fn command(&self, program: impl Into<PathBuf>, cwd: &Path) -> CommandSpec {
    let mut spec = CommandSpec::new(program, cwd);
    if let Some(dir) = &self.config.depot_tools {
      spec = spec.path_prepend(dir);
    }
    for (key, value) in self.layout.toolchain_env() {
      spec = spec.env(key, value);
    }
    for (key, value) in &self.config.env {
      spec = spec.env(key.as_str(), value.as_str());
    }
    spec
  }

  fn tool(&self, name: &str, cwd: &Path) -> CommandSpec {
    let program = tool_path(self.config.depot_tools.as_deref(), &self.layout.tool_name(name));
    self.command(program, cwd)
  }

  async fn run(&self, step: ToolchainStep, spec: CommandSpec) -> Result<(), ToolchainFailure> {
    let output = process::run(&spec, &self.options())
      .await
      .map_err(|e| ToolchainFailure::from_process(step, e))?;

    if !output.success() {
      return Err(ToolchainFailure::from_output(step, spec.to_string(), output));
    }
    Ok(())
  }

  fn executable(&self, dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{}", self.layout.exe_suffix()))
  }

  fn clang_binary(&self, dir: &Path) -> PathBuf {
    self.executable(&dir.join("bin"), "clang")
  }

  /// Binaries `gn gen` and `ninja` will look for that are not in place.
  ///
  /// The depot_tools `gn` and `ninja` wrappers only dispatch to the copies
  /// pinned inside the checkout. Clang is needed unless `is_clang = false`.
  pub fn missing_binaries(&self, source: &Path, args: &BuildArgs) -> Vec<PathBuf> {
    let mut required = Vec::new();
    if self.config.depot_tools.is_some() {
      required.push(self.executable(&source.join("buildtools").join(self.layout.buildtools_dir()), "gn"));
      required.push(self.executable(&source.join("third_party").join("ninja"), "ninja"));
    }
    if args.get("is_clang") != Some(&ArgValue::Bool(false)) {
      let clang_root = match args.get("clang_base_path") {
        Some(ArgValue::Str(path)) => match path.strip_prefix("//") {
          Some(rel) => source.join(rel),
          None => PathBuf::from(path),
        },
        _ => bundled_clang_dir(source),
      };
      required.push(self.clang_binary(&clang_root));
    }
    required.retain(|path| !path.is_file());
    required
  }

  /// Exclusive lock on the clang directory, waiting out other downloads.
  async fn lock_clang_dir(&self, clang_dir: &Path) -> Result<DirLock, ToolchainFailure> {
    let started = Instant::now();
    loop {
      let err = match DirLock::acquire(clang_dir, LockMode::Exclusive, "download clang") {
        Ok(lock) => return Ok(lock),
        Err(err @ (LockError::Contention { .. } | LockError::ContentionUnknown { .. })) => err,
        Err(err) => {
          return Err(ToolchainFailure::new(
            ToolchainStep::Prepare,
            "download clang",
            FailureReason::NotStarted(err.to_string()),
          ));
        }
      };
      if let Some(limit) = self.config.timeout
        && started.elapsed() >= limit
      {
        return Err(ToolchainFailure::new(
          ToolchainStep::Prepare,
          "download clang",
          FailureReason::TimedOut(limit),
        ));
      }
      debug!(error = %err, "waiting for another clang download");
      tokio::time::sleep(CLANG_LOCK_POLL).await;
    }
  }
}

/// `build_dir` relative to `source` when it is inside it; GN prefers that form.
fn relative_to(source: &Path, build_dir: &Path) -> String {
  build_dir
    .strip_prefix(source)
    .unwrap_or(build_dir)
    .to_string_lossy()
    .into_owned()
}

impl Toolchain for GnNinja {
  async fn prepare(&self, source: &Path) -> Result<(), ToolchainFailure> {
    if !self.config.download_clang {
      return Ok(());
    }

    let clang_dir = bundled_clang_dir(source);
    if self.clang_binary(&clang_dir).is_file() {
      debug!(path = %clang_dir.display(), "clang already present");
      return Ok(());
    }

    let _lock = self.lock_clang_dir(&clang_dir).await?;
    // Whoever held the lock may have just finished the download.
    if self.clang_binary(&clang_dir).is_file() {
      debug!(path = %clang_dir.display(), "clang downloaded by another build");
      return Ok(());
    }

    info!(path = %clang_dir.display(), "downloading Chromium clang");
    let python = self.config.python.clone().unwrap_or_else(|| PathBuf::from("python3"));
    let script = source.join("tools").join("clang").join("scripts").join("update.py");
    let spec = self.command(python, source).args([
      script.to_string_lossy().into_owned(),
      "--output-dir".to_string(),
      clang_dir.to_string_lossy().into_owned(),
    ]);
    self.run(ToolchainStep::Prepare, spec).await
  }

  async fn configure(&self, source: &Path, build_dir: &Path, args: &BuildArgs) -> Result<(), ToolchainFailure> {
    let spec = self.tool("gn", source).args(["gen".to_string(), relative_to(source, build_dir)]);

    let missing = self.missing_binaries(source, args);
    if !missing.is_empty() {
      let list = missing
        .iter()
        .map(|path| path.strip_prefix(source).unwrap_or(path).display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
      return Err(ToolchainFailure::new(
        ToolchainStep::Configure,
        spec.to_string(),
        FailureReason::NotStarted(format!(
          "missing binaries: {list} (populate the checkout's CIPD packages with `gclient sync`, \
           and download clang or set clang_base_path)"
        )),
      ));
    }

    info!(dir = %build_dir.display(), args = args.len(), "running gn gen");
    self.run(ToolchainStep::Configure, spec).await
  }

  async fn compile(&self, source: &Path, build_dir: &Path) -> Result<(), ToolchainFailure> {
    info!(dir = %build_dir.display(), jobs = ?self.config.jobs, "running ninja");
    let mut spec = self
      .tool("ninja", source)
      .args(["-C".to_string(), relative_to(source, build_dir)]);
    if let Some(jobs) = self.config.jobs {
      spec = spec.args(["-j".to_string(), jobs.to_string()]);
    }
    spec = spec.arg(MONOLITH_TARGET);
    self.run(ToolchainStep::Compile, spec).await
  }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
  use super::*;
  use crate::platform::{Arch, Os};
  use std::fs;
  use std::os::unix::fs::PermissionsExt;
  use tempfile::TempDir;

  /// A fake depot_tools whose `gn` and `ninja` record their arguments.
  fn fake_depot_tools(temp: &TempDir, ninja_exit: i32) -> PathBuf {
    let dir = temp.path().join("depot_tools");
    fs::create_dir(&dir).unwrap();
    let log = temp.path().join("calls.log");
    for (tool, exit) in [("gn", 0), ("ninja", ninja_exit)] {
      let script = format!(
        "#!/bin/sh\necho \"{tool} $*\" >> '{}'\necho \"{tool} output\"\necho \"{tool} diagnostics\" >&2\nexit {exit}\n",
        log.display()
      );
      let path = dir.join(tool);
      fs::write(&path, script).unwrap();
      fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    dir
  }

  /// The checkout binaries `gn gen` and `ninja` dispatch to.
  fn fake_checkout(source: &Path) {
    for path in [
      source.join("buildtools/linux64/gn"),
      source.join("third_party/ninja/ninja"),
      bundled_clang_dir(source).join("bin/clang"),
    ] {
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(path, "").unwrap();
    }
  }

  /// A python stand-in that takes a while to "download" clang and logs each run.
  fn slow_clang_downloader(temp: &TempDir) -> PathBuf {
    let path = temp.path().join("python3");
    let script = format!(
      "#!/bin/sh\necho download >> '{}'\nsleep 1\nmkdir -p \"$3/bin\"\ntouch \"$3/bin/clang\"\n",
      temp.path().join("downloads.log").display()
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  fn toolchain(depot_tools: PathBuf, jobs: Option<usize>) -> GnNinja {
    let config = ToolchainConfig {
      depot_tools: Some(depot_tools),
      jobs,
      ..Default::default()
    };
    GnNinja::new(config, Platform::new(Os::Linux, Arch::X64))
  }

  #[tokio::test]
  async fn runs_gn_then_ninja_with_relative_build_dir() {
    let temp = TempDir::new().unwrap();
    let gn_ninja = toolchain(fake_depot_tools(&temp, 0), Some(8));
    let source = temp.path().join("v8");
    let build_dir = source.join("out.gn/linux-x64-release");
    fs::create_dir_all(&build_dir).unwrap();
    fake_checkout(&source);

    gn_ninja.configure(&source, &build_dir, &BuildArgs::new()).await.unwrap();
    gn_ninja.compile(&source, &build_dir).await.unwrap();

    let calls = fs::read_to_string(temp.path().join("calls.log")).unwrap();
    assert_eq!(
      calls,
      "gn gen out.gn/linux-x64-release\nninja -C out.gn/linux-x64-release -j 8 v8_monolith\n"
    );
  }

  #[tokio::test]
  async fn failure_carries_exit_code_and_output() {
    let temp = TempDir::new().unwrap();
    let gn_ninja = toolchain(fake_depot_tools(&temp, 2), None);
    let source = temp.path().join("v8");
    fs::create_dir_all(&source).unwrap();

    let failure = gn_ninja.compile(&source, &source.join("out.gn/x")).await.unwrap_err();

    assert_eq!(failure.step, ToolchainStep::Compile);
    assert_eq!(failure.code(), Some(2));
    assert_eq!(failure.stdout, "ninja output\n");
    assert_eq!(failure.stderr, "ninja diagnostics\n");
    assert!(failure.command.ends_with("ninja -C out.gn/x v8_monolith"));
  }

  #[tokio::test]
  async fn missing_tool_is_not_started() {
    let temp = TempDir::new().unwrap();
    let gn_ninja = toolchain(temp.path().join("no-depot-tools"), None);
    fake_checkout(temp.path());

    let failure = gn_ninja
      .configure(temp.path(), &temp.path().join("out"), &BuildArgs::new())
      .await
      .unwrap_err();

    assert!(matches!(failure.reason, FailureReason::NotStarted(_)));
  }

  #[tokio::test]
  async fn configure_names_missing_checkout_binaries() {
    let temp = TempDir::new().unwrap();
    let gn_ninja = toolchain(fake_depot_tools(&temp, 0), None);
    let source = temp.path().join("v8");
    fs::create_dir_all(&source).unwrap();

    let failure = gn_ninja
      .configure(&source, &source.join("out.gn/x"), &BuildArgs::new())
      .await
      .unwrap_err();

    assert_eq!(failure.step, ToolchainStep::Configure);
    let FailureReason::NotStarted(message) = &failure.reason else {
      panic!("expected a not-started failure, got {:?}", failure.reason);
    };
    assert!(message.contains("buildtools/linux64/gn"), "{message}");
    assert!(message.contains("third_party/ninja/ninja"), "{message}");
    assert!(message.contains("llvm-build/Release+Asserts/bin/clang"), "{message}");
    assert!(!temp.path().join("calls.log").exists(), "gn must not run");
  }

  #[tokio::test]
  async fn configure_checks_clang_only_for_clang_builds() {
    let temp = TempDir::new().unwrap();
    let gn_ninja = toolchain(fake_depot_tools(&temp, 0), None);
    let source = temp.path().join("v8");
    fs::create_dir_all(source.join("buildtools/linux64")).unwrap();
    fs::write(source.join("buildtools/linux64/gn"), "").unwrap();
    fs::create_dir_all(source.join("third_party/ninja")).unwrap();
    fs::write(source.join("third_party/ninja/ninja"), "").unwrap();

    let mut args = BuildArgs::new();
    args.set("clang_base_path", ArgValue::str("//tools/clang"));
    assert_eq!(gn_ninja.missing_binaries(&source, &args), vec![source.join("tools/clang/bin/clang")]);

    args.set("is_clang", ArgValue::Bool(false));
    gn_ninja.configure(&source, &source.join("out.gn/x"), &args).await.unwrap();
  }

  #[tokio::test]
  async fn concurrent_prepares_download_clang_once() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("v8");
    fs::create_dir_all(&source).unwrap();
    let config = ToolchainConfig {
      download_clang: true,
      python: Some(slow_clang_downloader(&temp)),
      ..Default::default()
    };
    let a = GnNinja::new(config.clone(), Platform::new(Os::Linux, Arch::X64));
    let b = GnNinja::new(config, Platform::new(Os::Linux, Arch::X64));

    let (first, second) = tokio::join!(a.prepare(&source), b.prepare(&source));

    first.unwrap();
    second.unwrap();
    assert!(bundled_clang_dir(&source).join("bin/clang").is_file());
    let downloads = fs::read_to_string(temp.path().join("downloads.log")).unwrap();
    assert_eq!(downloads.lines().count(), 1);
  }

  #[tokio::test]
  async fn prepare_gives_up_waiting_after_timeout() {
    let temp = TempDir::new().unwrap();
    let _held = DirLock::acquire(&bundled_clang_dir(temp.path()), LockMode::Exclusive, "download clang").unwrap();
    let config = ToolchainConfig {
      download_clang: true,
      timeout: Some(Duration::from_millis(300)),
      python: Some(PathBuf::from("/definitely/not/python")),
      ..Default::default()
    };

    let failure = GnNinja::new(config, Platform::new(Os::Linux, Arch::X64))
      .prepare(temp.path())
      .await
      .unwrap_err();

    assert_eq!(failure.step, ToolchainStep::Prepare);
    assert!(matches!(failure.reason, FailureReason::TimedOut(_)));
  }

  #[tokio::test]
  async fn prepare_skips_existing_clang() {
    let temp = TempDir::new().unwrap();
    let clang = bundled_clang_dir(temp.path()).join("bin");
    fs::create_dir_all(&clang).unwrap();
    fs::write(clang.join("clang"), "").unwrap();
    let config = ToolchainConfig {
      download_clang: true,
      python: Some(PathBuf::from("/definitely/not/python")),
      ..Default::default()
    };

    GnNinja::new(config, Platform::new(Os::Linux, Arch::X64))
      .prepare(temp.path())
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn prepare_is_a_no_op_unless_requested() {
    let temp = TempDir::new().unwrap();
    GnNinja::new(ToolchainConfig::default(), Platform::new(Os::Linux, Arch::X64))
      .prepare(temp.path())
      .await
      .unwrap();
    assert!(!bundled_clang_dir(temp.path()).exists());
  }
}
