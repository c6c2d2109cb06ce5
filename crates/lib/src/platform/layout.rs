//! Per-platform naming and toggle strategies.
//!
//! Everything that differs between Linux, macOS and Windows builds lives
//! behind [`PlatformLayout`] so the merge and install code never branches on
//! the OS directly.

use crate::args::ArgValue;

/// Static archives built alongside the monolith that are installed when present.
const AUXILIARY_ARCHIVES: &[&str] = &["v8_libbase", "v8_libplatform"];

pub trait PlatformLayout: Send + Sync {
  /// File name of a static archive with the given stem.
  fn static_lib_name(&self, stem: &str) -> String;

  /// Stems of auxiliary archives copied into the install layout if the build produced them.
  fn auxiliary_archives(&self) -> &'static [&'static str] {
    AUXILIARY_ARCHIVES
  }

  /// GN args only this platform needs. Applied after variant/arch overrides.
  fn platform_args(&self) -> Vec<(&'static str, ArgValue)> {
    Vec::new()
  }

  /// Whether debug builds are supported on this platform.
  fn supports_debug(&self) -> bool {
    true
  }

  /// Executable name of a depot_tools entry point (`gn`, `ninja`, ...).
  fn tool_name(&self, tool: &str) -> String {
    tool.to_string()
  }

  /// Environment the toolchain needs on this platform.
  fn toolchain_env(&self) -> Vec<(&'static str, &'static str)> {
    Vec::new()
  }

  /// Suffix of native executables.
  fn exe_suffix(&self) -> &'static str {
    ""
  }

  /// Directory under `buildtools/` where the checkout keeps this host's `gn`.
  fn buildtools_dir(&self) -> &'static str;
}

pub struct LinuxLayout;

impl PlatformLayout for LinuxLayout {
  fn static_lib_name(&self, stem: &str) -> String {
    format!("lib{stem}.a")
  }

  // The bundled Debian sysroot ships a libstdc++ without C++20 support.
  fn platform_args(&self) -> Vec<(&'static str, ArgValue)> {
    vec![("use_sysroot", ArgValue::Bool(false))]
  }

  fn buildtools_dir(&self) -> &'static str {
    "linux64"
  }
}

pub struct MacLayout;

impl PlatformLayout for MacLayout {
  fn static_lib_name(&self, stem: &str) -> String {
    format!("lib{stem}.a")
  }

  fn buildtools_dir(&self) -> &'static str {
    "mac"
  }
}

pub struct WindowsLayout;

impl PlatformLayout for WindowsLayout {
  fn static_lib_name(&self, stem: &str) -> String {
    format!("{stem}.lib")
  }

  fn supports_debug(&self) -> bool {
    false
  }

  fn tool_name(&self, tool: &str) -> String {
    format!("{tool}.bat")
  }

  /// Use the locally installed Visual Studio instead of Google's hermetic toolchain.
  fn toolchain_env(&self) -> Vec<(&'static str, &'static str)> {
    vec![("DEPOT_TOOLS_WIN_TOOLCHAIN", "0")]
  }

  fn exe_suffix(&self) -> &'static str {
    ".exe"
  }

  fn buildtools_dir(&self) -> &'static str {
    "win"
  }
}
