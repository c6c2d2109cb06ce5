pub mod arch;
pub mod layout;
pub mod os;
pub mod paths;

pub use arch::Arch;
pub use os::Os;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use layout::PlatformLayout;

/// Platform identifier combining OS and architecture (e.g., "linux-x64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
  pub os: Os,
  pub arch: Arch,
}

impl Platform {
  pub fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      os: Os::current()?,
      arch: Arch::current()?,
    })
  }

  /// Returns the platform string used in build directory names (e.g., "mac-arm64")
  pub fn triple(&self) -> String {
    format!("{}-{}", self.os, self.arch)
  }

  pub fn layout(&self) -> &'static dyn PlatformLayout {
    self.os.layout()
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}
