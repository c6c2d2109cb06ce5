//! Crate-wide constants.

pub const APP_NAME: &str = "v8forge";

/// Upstream V8 repository.
pub const DEFAULT_V8_URL: &str = "https://chromium.googlesource.com/v8/v8.git";

/// Chromium's depot_tools (provides `gn` and `ninja`).
pub const DEPOT_TOOLS_URL: &str = "https://chromium.googlesource.com/chromium/tools/depot_tools.git";

/// gclient dependency manifest at the root of a V8 checkout.
pub const DEPS_FILENAME: &str = "DEPS";

/// Version marker written at the root of an acquired source tree.
pub const SOURCE_MARKER: &str = ".v8forge-source.json";

/// Directory (relative to the source root) holding per-target build directories.
pub const OUT_DIR: &str = "out.gn";

/// GN target producing the monolithic static library.
pub const MONOLITH_TARGET: &str = "v8_monolith";

/// Effective args file name, both inside a build dir and in an install layout.
pub const ARGS_FILENAME: &str = "args.gn";

/// Install manifest file name.
pub const INSTALL_MANIFEST: &str = "build.json";
