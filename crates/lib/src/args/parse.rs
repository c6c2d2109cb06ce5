//! Parser for GN `args.gn` files.
//!
//! Accepts one `key = value` assignment per line, `#` comments and blank
//! lines. Values are `true`/`false`, decimal integers, double-quoted strings
//! (with `\"`, `\\` and `\$` escapes) or bare identifiers.

use thiserror::Error;

use super::{ArgValue, BuildArgs};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsParseError {
  #[error("line {line}: expected `key = value`, found '{text}'")]
  MissingAssignment { line: usize, text: String },

  #[error("line {line}: invalid argument name '{name}'")]
  InvalidKey { line: usize, name: String },

  #[error("line {line}: missing value for '{key}'")]
  MissingValue { line: usize, key: String },

  #[error("line {line}: unterminated string for '{key}'")]
  UnterminatedString { line: usize, key: String },

  #[error("line {line}: invalid escape '\\{escape}' in string for '{key}'")]
  InvalidEscape { line: usize, key: String, escape: char },

  #[error("line {line}: unsupported value for '{key}': {text} (only bool, int, string and identifiers are allowed)")]
  UnsupportedValue { line: usize, key: String, text: String },

  #[error("line {line}: unexpected trailing text after value of '{key}': {text}")]
  TrailingText { line: usize, key: String, text: String },

  #[error("line {line}: '{key}' is already assigned on line {first_line}")]
  DuplicateKey { line: usize, key: String, first_line: usize },
}

pub(super) fn parse(content: &str) -> Result<BuildArgs, ArgsParseError> {
  let mut args = BuildArgs::new();
  let mut first_seen: Vec<(String, usize)> = Vec::new();

  for (idx, raw) in content.lines().enumerate() {
    let line = idx + 1;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
      continue;
    }

    let Some((key, rest)) = trimmed.split_once('=') else {
      return Err(ArgsParseError::MissingAssignment {
        line,
        text: trimmed.to_string(),
      });
    };
    let key = key.trim();
    if !is_identifier(key) {
      return Err(ArgsParseError::InvalidKey {
        line,
        name: key.to_string(),
      });
    }

    let value = parse_value(rest.trim(), key, line)?;

    if let Some((_, first_line)) = first_seen.iter().find(|(k, _)| k == key) {
      return Err(ArgsParseError::DuplicateKey {
        line,
        key: key.to_string(),
        first_line: *first_line,
      });
    }
    first_seen.push((key.to_string(), line));
    args.set(key, value);
  }

  Ok(args)
}

fn parse_value(text: &str, key: &str, line: usize) -> Result<ArgValue, ArgsParseError> {
  if text.is_empty() || text.starts_with('#') {
    return Err(ArgsParseError::MissingValue {
      line,
      key: key.to_string(),
    });
  }

  if let Some(body) = text.strip_prefix('"') {
    let (value, rest) = parse_string(body, key, line)?;
    expect_end(rest, key, line)?;
    return Ok(ArgValue::Str(value));
  }

  let end = text.find(|c: char| c.is_whitespace() || c == '#').unwrap_or(text.len());
  let (word, rest) = text.split_at(end);

  let value = match word {
    "true" => ArgValue::Bool(true),
    "false" => ArgValue::Bool(false),
    _ => match word.parse::<i64>() {
      Ok(i) => ArgValue::Int(i),
      Err(_) if is_identifier(word) => ArgValue::Token(word.to_string()),
      Err(_) => {
        return Err(ArgsParseError::UnsupportedValue {
          line,
          key: key.to_string(),
          text: text.to_string(),
        });
      }
    },
  };

  expect_end(rest, key, line)?;
  Ok(value)
}

/// Parses the body of a string after its opening quote.
///
/// Returns the unescaped value and the text after the closing quote.
fn parse_string<'a>(body: &'a str, key: &str, line: usize) -> Result<(String, &'a str), ArgsParseError> {
  let mut value = String::new();
  let mut chars = body.char_indices();

  while let Some((idx, c)) = chars.next() {
    match c {
      '"' => return Ok((value, &body[idx + 1..])),
      '\\' => match chars.next() {
        Some((_, escaped @ ('"' | '\\' | '$'))) => value.push(escaped),
        Some((_, escape)) => {
          return Err(ArgsParseError::InvalidEscape {
            line,
            key: key.to_string(),
            escape,
          });
        }
        None => break,
      },
      c => value.push(c),
    }
  }

  Err(ArgsParseError::UnterminatedString {
    line,
    key: key.to_string(),
  })
}

fn expect_end(rest: &str, key: &str, line: usize) -> Result<(), ArgsParseError> {
  let rest = rest.trim_start();
  if rest.is_empty() || rest.starts_with('#') {
    Ok(())
  } else {
    Err(ArgsParseError::TrailingText {
      line,
      key: key.to_string(),
      text: rest.to_string(),
    })
  }
}

pub(crate) fn is_identifier(s: &str) -> bool {
  let mut chars = s.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_all_scalar_kinds() {
    let args = parse(
      r#"
# comment
is_debug = false
symbol_level = 1
target_cpu = "x86"   # trailing comment
target_os = host_os
"#,
    )
    .unwrap();

    assert_eq!(args.get("is_debug"), Some(&ArgValue::Bool(false)));
    assert_eq!(args.get("symbol_level"), Some(&ArgValue::Int(1)));
    assert_eq!(args.get("target_cpu"), Some(&ArgValue::str("x86")));
    assert_eq!(args.get("target_os"), Some(&ArgValue::Token("host_os".into())));
    assert_eq!(args.len(), 4);
  }

  #[test]
  fn preserves_file_order() {
    let args = parse("b = 1\na = 2\nc = 3\n").unwrap();
    let keys: Vec<_> = args.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["b", "a", "c"]);
  }

  #[test]
  fn unescapes_strings() {
    let args = parse(r#"cc_wrapper = "a \"b\" \\ \$c""#).unwrap();
    assert_eq!(args.get("cc_wrapper"), Some(&ArgValue::str(r#"a "b" \ $c"#)));
  }

  #[test]
  fn hash_inside_string_is_not_a_comment() {
    let args = parse(r#"x = "a#b""#).unwrap();
    assert_eq!(args.get("x"), Some(&ArgValue::str("a#b")));
  }

  #[test]
  fn rejects_duplicate_keys() {
    let err = parse("is_debug = true\nis_debug = false\n").unwrap_err();
    assert_eq!(
      err,
      ArgsParseError::DuplicateKey {
        line: 2,
        key: "is_debug".into(),
        first_line: 1
      }
    );
  }

  #[test]
  fn rejects_lists() {
    let err = parse(r#"extra = [ "a" ]"#).unwrap_err();
    assert!(matches!(err, ArgsParseError::UnsupportedValue { line: 1, .. }));
  }

  #[test]
  fn rejects_import_statements() {
    let err = parse(r#"import("//build/args.gni")"#).unwrap_err();
    assert!(matches!(err, ArgsParseError::MissingAssignment { line: 1, .. }));
  }

  #[test]
  fn rejects_unterminated_string() {
    let err = parse("target_cpu = \"x64").unwrap_err();
    assert!(matches!(err, ArgsParseError::UnterminatedString { .. }));
  }

  #[test]
  fn rejects_trailing_text() {
    let err = parse("a = 1 b = 2").unwrap_err();
    assert!(matches!(err, ArgsParseError::TrailingText { .. }));
  }

  #[test]
  fn rejects_missing_value() {
    assert!(matches!(
      parse("a =  # nothing").unwrap_err(),
      ArgsParseError::MissingValue { .. }
    ));
  }
}
