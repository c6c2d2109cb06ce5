use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::layout::{LinuxLayout, MacLayout, PlatformLayout, WindowsLayout};

/// Operating systems V8 can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
  Linux,
  #[serde(rename = "mac")]
  MacOs,
  #[serde(rename = "win")]
  Windows,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the GN `target_os` token for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "mac",
      Self::Windows => "win",
    }
  }

  /// Naming and toggle strategy for this OS.
  pub fn layout(&self) -> &'static dyn PlatformLayout {
    match self {
      Self::Linux => &LinuxLayout,
      Self::MacOs => &MacLayout,
      Self::Windows => &WindowsLayout,
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Os {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "linux" => Ok(Self::Linux),
      "mac" | "macos" | "darwin" => Ok(Self::MacOs),
      "win" | "windows" => Ok(Self::Windows),
      other => Err(format!("unsupported OS '{other}' (expected linux, mac or win)")),
    }
  }
}
