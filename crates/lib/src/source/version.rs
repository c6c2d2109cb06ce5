use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A pinned upstream revision: a tag such as `14.2.231.17` or a commit hash.
///
/// Opaque apart from basic validation; whether it resolves is only known
/// once the fetcher asks the remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionSpec(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidVersion {
  #[error("version must not be empty")]
  Empty,

  #[error("version '{0}' contains whitespace")]
  Whitespace(String),

  #[error("version '{0}' must not start with '-'")]
  LeadingDash(String),
}

impl VersionSpec {
  pub fn new(spec: impl Into<String>) -> Result<Self, InvalidVersion> {
    let spec = spec.into();
    if spec.is_empty() {
      return Err(InvalidVersion::Empty);
    }
    if spec.contains(char::is_whitespace) {
      return Err(InvalidVersion::Whitespace(spec));
    }
    // Would be read as an option by git.
    if spec.starts_with('-') {
      return Err(InvalidVersion::LeadingDash(spec));
    }
    Ok(Self(spec))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Whether this is a full 40-character commit hash rather than a ref name.
  pub fn is_commit(&self) -> bool {
    self.0.len() == 40 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
  }
}

impl FromStr for VersionSpec {
  type Err = InvalidVersion;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::new(s.trim())
  }
}

impl TryFrom<String> for VersionSpec {
  type Error = InvalidVersion;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::new(value)
  }
}

impl From<VersionSpec> for String {
  fn from(value: VersionSpec) -> Self {
    value.0
  }
}

impl fmt::Display for VersionSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_tags_and_commits() {
    assert_eq!("14.2.231.17".parse::<VersionSpec>().unwrap().as_str(), "14.2.231.17");
    let sha = "a".repeat(40);
    assert!(VersionSpec::new(sha).unwrap().is_commit());
    assert!(!VersionSpec::new("14.2.231.17").unwrap().is_commit());
  }

  #[test]
  fn rejects_malformed() {
    assert_eq!(VersionSpec::new(""), Err(InvalidVersion::Empty));
    assert!(matches!(VersionSpec::new("14.2 beta"), Err(InvalidVersion::Whitespace(_))));
    assert!(matches!(VersionSpec::new("--upload-pack=x"), Err(InvalidVersion::LeadingDash(_))));
  }

  #[test]
  fn deserialization_validates() {
    assert!(serde_json::from_str::<VersionSpec>("\"\"").is_err());
    let v: VersionSpec = serde_json::from_str("\"main\"").unwrap();
    assert_eq!(v.as_str(), "main");
  }
}
