use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar GN build argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ArgValue {
  Bool(bool),
  Int(i64),
  Str(String),
  /// Bare identifier, e.g. `target_cpu = host_cpu`. Emitted unquoted.
  Token(String),
}

impl ArgValue {
  pub fn str(s: impl Into<String>) -> Self {
    Self::Str(s.into())
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Bool(_) => "bool",
      Self::Int(_) => "int",
      Self::Str(_) => "string",
      Self::Token(_) => "identifier",
    }
  }
}

/// Renders the value in GN syntax: booleans as `true`/`false`, strings quoted and escaped.
impl fmt::Display for ArgValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bool(b) => write!(f, "{b}"),
      Self::Int(i) => write!(f, "{i}"),
      Self::Token(t) => f.write_str(t),
      Self::Str(s) => {
        f.write_str("\"")?;
        for c in s.chars() {
          match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '$' => f.write_str("\\$")?,
            c => write!(f, "{c}")?,
          }
        }
        f.write_str("\"")
      }
    }
  }
}

impl From<bool> for ArgValue {
  fn from(b: bool) -> Self {
    Self::Bool(b)
  }
}

impl From<i64> for ArgValue {
  fn from(i: i64) -> Self {
    Self::Int(i)
  }
}

impl From<&str> for ArgValue {
  fn from(s: &str) -> Self {
    Self::Str(s.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_uses_gn_syntax() {
    assert_eq!(ArgValue::Bool(true).to_string(), "true");
    assert_eq!(ArgValue::Int(-3).to_string(), "-3");
    assert_eq!(ArgValue::str("x64").to_string(), "\"x64\"");
    assert_eq!(ArgValue::Token("host_cpu".into()).to_string(), "host_cpu");
  }

  #[test]
  fn strings_are_escaped() {
    assert_eq!(ArgValue::str(r#"C:\clang "x" $y"#).to_string(), r#""C:\\clang \"x\" \$y""#);
  }
}
