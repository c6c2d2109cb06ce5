//! Evaluator for gclient `DEPS` files.
//!
//! A `DEPS` file is a Python module, but in practice only a small literal
//! subset is used:
//!
//! - `name = expr` assignments at top level
//! - strings (single or double quoted, adjacent literals concatenate),
//!   integers, `True`, `False`, `None`, lists, tuples and dicts
//! - `+` between strings or between lists
//! - `Var('name')` referring to an entry of the `vars` dict, and `Str('x')`
//!
//! Nothing is executed. Anything outside the subset is a syntax error.
//!
//! gclient conditions (`'checkout_linux and host_cpu == "x64"'`) use a second
//! small language, evaluated by [`eval_condition`].

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DepsError {
  #[error("line {line}: {message}")]
  Syntax { line: usize, message: String },

  #[error("undefined variable '{0}'")]
  UndefinedVariable(String),

  #[error("type error: {0}")]
  Type(String),

  #[error("invalid condition '{condition}': {message}")]
  Condition { condition: String, message: String },
}

/// An evaluated literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
  None,
  Bool(bool),
  Int(i64),
  Str(String),
  List(Vec<Value>),
  /// Insertion-ordered. Keys are strings in every `DEPS` file in the wild.
  Dict(Vec<(String, Value)>),
}

impl Value {
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::None => "None",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Str(_) => "str",
      Value::List(_) => "list",
      Value::Dict(_) => "dict",
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  /// Look up a key when this is a dict.
  pub fn get(&self, key: &str) -> Option<&Value> {
    match self {
      Value::Dict(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
      _ => None,
    }
  }
}

/// Python `str()` rendering, used for `{var}` interpolation.
impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::None => f.write_str("None"),
      Value::Bool(true) => f.write_str("True"),
      Value::Bool(false) => f.write_str("False"),
      Value::Int(i) => write!(f, "{i}"),
      Value::Str(s) => f.write_str(s),
      Value::List(items) => {
        f.write_str("[")?;
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{item}")?;
        }
        f.write_str("]")
      }
      Value::Dict(_) => f.write_str("{...}"),
    }
  }
}

/// Top-level assignments of a `DEPS` file, evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepsFile {
  globals: Vec<(String, Value)>,
}

impl DepsFile {
  /// Parse and evaluate `source`.
  ///
  /// `vars` is evaluated first so `Var()` references anywhere else in the
  /// file resolve regardless of assignment order.
  pub fn parse(source: &str) -> Result<Self, DepsError> {
    let tokens = tokenize(source)?;
    let assignments = Parser::new(&tokens).file()?;

    let vars = match assignments.iter().find(|(name, _)| name == "vars") {
      Some((_, expr)) => expr.eval(&Value::Dict(Vec::new()))?,
      None => Value::Dict(Vec::new()),
    };
    if !matches!(vars, Value::Dict(_)) {
      return Err(DepsError::Type(format!("'vars' must be a dict, found {}", vars.type_name())));
    }

    let mut globals: Vec<(String, Value)> = Vec::new();
    for (name, expr) in &assignments {
      let value = if name == "vars" { vars.clone() } else { expr.eval(&vars)? };
      // Python semantics: a later assignment rebinds the name.
      match globals.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = value,
        None => globals.push((name.clone(), value)),
      }
    }

    Ok(Self { globals })
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.globals.iter().find(|(n, _)| n == name).map(|(_, v)| v)
  }

  /// The `vars` dict, or an empty one.
  pub fn vars(&self) -> &[(String, Value)] {
    match self.get("vars") {
      Some(Value::Dict(entries)) => entries,
      _ => &[],
    }
  }

  pub fn var(&self, name: &str) -> Option<&Value> {
    self.vars().iter().find(|(n, _)| n == name).map(|(_, v)| v)
  }

  /// Expand `{name}` references in `text` from `vars`. `{{` and `}}` escape braces.
  pub fn interpolate(&self, text: &str) -> Result<String, DepsError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
      match c {
        '{' if chars.peek() == Some(&'{') => {
          chars.next();
          out.push('{');
        }
        '}' if chars.peek() == Some(&'}') => {
          chars.next();
          out.push('}');
        }
        '{' => {
          let mut name = String::new();
          loop {
            match chars.next() {
              Some('}') => break,
              Some(c) => name.push(c),
              None => return Err(DepsError::Type(format!("unterminated '{{' in '{text}'"))),
            }
          }
          let value = self.var(&name).ok_or_else(|| DepsError::UndefinedVariable(name.clone()))?;
          out.push_str(&value.to_string());
        }
        c => out.push(c),
      }
    }

    Ok(out)
  }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
  Str(String),
  Int(i64),
  Ident(String),
  Punct(char),
  EqEq,
  NotEq,
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Token::Str(s) => write!(f, "string '{s}'"),
      Token::Int(i) => write!(f, "integer {i}"),
      Token::Ident(name) => write!(f, "'{name}'"),
      Token::Punct(c) => write!(f, "'{c}'"),
      Token::EqEq => f.write_str("'=='"),
      Token::NotEq => f.write_str("'!='"),
    }
  }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, DepsError> {
  let chars: Vec<char> = source.chars().collect();
  let mut tokens = Vec::new();
  let mut line = 1;
  let mut i = 0;

  let syntax = |line: usize, message: String| DepsError::Syntax { line, message };

  while i < chars.len() {
    let c = chars[i];
    match c {
      '\n' => {
        line += 1;
        i += 1;
      }
      c if c.is_whitespace() => i += 1,
      '\\' if chars.get(i + 1) == Some(&'\n') => {
        line += 1;
        i += 2;
      }
      '#' => {
        while i < chars.len() && chars[i] != '\n' {
          i += 1;
        }
      }
      '\'' | '"' => {
        let start_line = line;
        let quote = c;
        let mut value = String::new();
        i += 1;
        loop {
          let Some(&c) = chars.get(i) else {
            return Err(syntax(start_line, "unterminated string".into()));
          };
          i += 1;
          match c {
            c if c == quote => break,
            '\n' => return Err(syntax(start_line, "unterminated string".into())),
            '\\' => {
              let Some(&escaped) = chars.get(i) else {
                return Err(syntax(start_line, "unterminated string".into()));
              };
              i += 1;
              match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '\\' | '\'' | '"' => value.push(escaped),
                '\n' => line += 1,
                // Python keeps unknown escapes verbatim.
                other => {
                  value.push('\\');
                  value.push(other);
                }
              }
            }
            c => value.push(c),
          }
        }
        tokens.push((Token::Str(value), start_line));
      }
      c if c.is_ascii_digit() => {
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
          i += 1;
        }
        let text: String = chars[start..i].iter().collect();
        let value = text
          .parse::<i64>()
          .map_err(|e| syntax(line, format!("invalid integer '{text}': {e}")))?;
        tokens.push((Token::Int(value), line));
      }
      c if c.is_ascii_alphabetic() || c == '_' => {
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
          i += 1;
        }
        tokens.push((Token::Ident(chars[start..i].iter().collect()), line));
      }
      '=' if chars.get(i + 1) == Some(&'=') => {
        tokens.push((Token::EqEq, line));
        i += 2;
      }
      '!' if chars.get(i + 1) == Some(&'=') => {
        tokens.push((Token::NotEq, line));
        i += 2;
      }
      '{' | '}' | '[' | ']' | '(' | ')' | ':' | ',' | '=' | '+' | '-' => {
        tokens.push((Token::Punct(c), line));
        i += 1;
      }
      other => return Err(syntax(line, format!("unexpected character '{other}'"))),
    }
  }

  Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Expr {
  Literal(Value),
  List(Vec<Expr>),
  Dict(Vec<(Expr, Expr)>),
  Add(Box<Expr>, Box<Expr>),
  Var(Box<Expr>),
  Str(Box<Expr>),
}

impl Expr {
  fn eval(&self, vars: &Value) -> Result<Value, DepsError> {
    match self {
      Expr::Literal(value) => Ok(value.clone()),
      Expr::List(items) => Ok(Value::List(
        items.iter().map(|item| item.eval(vars)).collect::<Result<_, _>>()?,
      )),
      Expr::Dict(entries) => {
        let mut out: Vec<(String, Value)> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
          let key = match key.eval(vars)? {
            Value::Str(s) => s,
            other => return Err(DepsError::Type(format!("dict keys must be str, found {}", other.type_name()))),
          };
          let value = value.eval(vars)?;
          match out.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => out.push((key, value)),
          }
        }
        Ok(Value::Dict(out))
      }
      Expr::Add(lhs, rhs) => match (lhs.eval(vars)?, rhs.eval(vars)?) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Value::Int(a), Value::Int(b)) => a
          .checked_add(b)
          .map(Value::Int)
          .ok_or_else(|| DepsError::Type("integer overflow".into())),
        (Value::List(mut a), Value::List(b)) => {
          a.extend(b);
          Ok(Value::List(a))
        }
        (a, b) => Err(DepsError::Type(format!(
          "cannot add {} and {}",
          a.type_name(),
          b.type_name()
        ))),
      },
      Expr::Var(name) => {
        let name = match name.eval(vars)? {
          Value::Str(s) => s,
          other => return Err(DepsError::Type(format!("Var() takes a str, found {}", other.type_name()))),
        };
        vars
          .get(&name)
          .cloned()
          .ok_or(DepsError::UndefinedVariable(name))
      }
      Expr::Str(inner) => match inner.eval(vars)? {
        Value::Str(s) => Ok(Value::Str(s)),
        other => Err(DepsError::Type(format!("Str() takes a str, found {}", other.type_name()))),
      },
    }
  }
}

struct Parser<'a> {
  tokens: &'a [(Token, usize)],
  pos: usize,
}

impl<'a> Parser<'a> {
  fn new(tokens: &'a [(Token, usize)]) -> Self {
    Self { tokens, pos: 0 }
  }

  fn peek(&self) -> Option<&'a Token> {
    self.tokens.get(self.pos).map(|(t, _)| t)
  }

  fn line(&self) -> usize {
    self
      .tokens
      .get(self.pos)
      .or_else(|| self.tokens.last())
      .map(|(_, line)| *line)
      .unwrap_or(1)
  }

  fn next(&mut self) -> Option<&'a Token> {
    let token = self.tokens.get(self.pos).map(|(t, _)| t);
    if token.is_some() {
      self.pos += 1;
    }
    token
  }

  fn error(&self, message: impl Into<String>) -> DepsError {
    DepsError::Syntax {
      line: self.line(),
      message: message.into(),
    }
  }

  fn unexpected(&self, expected: &str) -> DepsError {
    match self.peek() {
      Some(token) => self.error(format!("expected {expected}, found {token}")),
      None => self.error(format!("expected {expected}, found end of file")),
    }
  }

  fn eat(&mut self, punct: char) -> bool {
    if self.peek() == Some(&Token::Punct(punct)) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn expect(&mut self, punct: char) -> Result<(), DepsError> {
    if self.eat(punct) {
      Ok(())
    } else {
      Err(self.unexpected(&format!("'{punct}'")))
    }
  }

  fn file(&mut self) -> Result<Vec<(String, Expr)>, DepsError> {
    let mut assignments = Vec::new();
    while let Some(token) = self.peek() {
      let Token::Ident(name) = token else {
        return Err(self.unexpected("an assignment"));
      };
      self.pos += 1;
      self.expect('=')?;
      let expr = self.expr()?;
      assignments.push((name.clone(), expr));
    }
    Ok(assignments)
  }

  fn expr(&mut self) -> Result<Expr, DepsError> {
    let mut lhs = self.term()?;
    while self.eat('+') {
      let rhs = self.term()?;
      lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
  }

  fn term(&mut self) -> Result<Expr, DepsError> {
    match self.peek() {
      Some(Token::Str(_)) => {
        let mut value = String::new();
        while let Some(Token::Str(s)) = self.peek() {
          value.push_str(s);
          self.pos += 1;
        }
        Ok(Expr::Literal(Value::Str(value)))
      }
      Some(Token::Int(i)) => {
        self.pos += 1;
        Ok(Expr::Literal(Value::Int(*i)))
      }
      Some(Token::Punct('-')) => {
        self.pos += 1;
        match self.next() {
          Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(-i))),
          _ => Err(self.error("expected integer after '-'")),
        }
      }
      Some(Token::Punct('[')) => {
        self.pos += 1;
        Ok(Expr::List(self.sequence(']')?))
      }
      Some(Token::Punct('(')) => {
        self.pos += 1;
        let items = self.sequence(')')?;
        // `(x)` is grouping; `(x,)` and `(x, y)` are tuples, read as lists.
        match <[Expr; 1]>::try_from(items) {
          Ok([single]) if !self.previous_was_trailing_comma() => Ok(single),
          Ok([single]) => Ok(Expr::List(vec![single])),
          Err(items) => Ok(Expr::List(items)),
        }
      }
      Some(Token::Punct('{')) => {
        self.pos += 1;
        self.dict()
      }
      Some(Token::Ident(name)) => {
        self.pos += 1;
        match name.as_str() {
          "True" => Ok(Expr::Literal(Value::Bool(true))),
          "False" => Ok(Expr::Literal(Value::Bool(false))),
          "None" => Ok(Expr::Literal(Value::None)),
          "Var" | "Str" => {
            self.expect('(')?;
            let arg = Box::new(self.expr()?);
            self.eat(',');
            self.expect(')')?;
            Ok(if name == "Var" { Expr::Var(arg) } else { Expr::Str(arg) })
          }
          other => Err(DepsError::Syntax {
            line: self.tokens[self.pos - 1].1,
            message: format!("unsupported name '{other}' (only Var() and Str() calls are allowed)"),
          }),
        }
      }
      _ => Err(self.unexpected("a value")),
    }
  }

  fn previous_was_trailing_comma(&self) -> bool {
    self.pos >= 2 && self.tokens[self.pos - 2].0 == Token::Punct(',')
  }

  fn sequence(&mut self, close: char) -> Result<Vec<Expr>, DepsError> {
    let mut items = Vec::new();
    loop {
      if self.eat(close) {
        return Ok(items);
      }
      items.push(self.expr()?);
      if !self.eat(',') {
        self.expect(close)?;
        return Ok(items);
      }
    }
  }

  fn dict(&mut self) -> Result<Expr, DepsError> {
    let mut entries = Vec::new();
    loop {
      if self.eat('}') {
        return Ok(Expr::Dict(entries));
      }
      let key = self.expr()?;
      self.expect(':')?;
      let value = self.expr()?;
      entries.push((key, value));
      if !self.eat(',') {
        self.expect('}')?;
        return Ok(Expr::Dict(entries));
      }
    }
  }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Evaluate a gclient condition string.
///
/// Supports `and`, `or`, `not`, `==`, `!=`, parentheses, string literals,
/// `True`/`False` and identifiers resolved through `lookup`.
pub fn eval_condition<F>(condition: &str, lookup: F) -> Result<bool, DepsError>
where
  F: Fn(&str) -> Result<Value, DepsError>,
{
  let wrap = |e: DepsError| match e {
    DepsError::UndefinedVariable(_) => e,
    other => DepsError::Condition {
      condition: condition.to_string(),
      message: other.to_string(),
    },
  };

  let tokens = tokenize(condition).map_err(wrap)?;
  let mut eval = CondEval {
    parser: Parser::new(&tokens),
    lookup: &lookup,
  };
  let value = eval.or().map_err(wrap)?;
  if eval.parser.peek().is_some() {
    return Err(wrap(eval.parser.unexpected("end of condition")));
  }
  truthy(&value).map_err(wrap)
}

struct CondEval<'a, F> {
  parser: Parser<'a>,
  lookup: &'a F,
}

impl<F> CondEval<'_, F>
where
  F: Fn(&str) -> Result<Value, DepsError>,
{
  fn keyword(&mut self, word: &str) -> bool {
    if matches!(self.parser.peek(), Some(Token::Ident(w)) if w == word) {
      self.parser.pos += 1;
      true
    } else {
      false
    }
  }

  fn or(&mut self) -> Result<Value, DepsError> {
    let mut value = self.and()?;
    while self.keyword("or") {
      let rhs = self.and()?;
      value = Value::Bool(truthy(&value)? || truthy(&rhs)?);
    }
    Ok(value)
  }

  fn and(&mut self) -> Result<Value, DepsError> {
    let mut value = self.not()?;
    while self.keyword("and") {
      let rhs = self.not()?;
      value = Value::Bool(truthy(&value)? && truthy(&rhs)?);
    }
    Ok(value)
  }

  fn not(&mut self) -> Result<Value, DepsError> {
    if self.keyword("not") {
      return Ok(Value::Bool(!truthy(&self.not()?)?));
    }
    self.comparison()
  }

  fn comparison(&mut self) -> Result<Value, DepsError> {
    let lhs = self.atom()?;
    match self.parser.peek() {
      Some(Token::EqEq) => {
        self.parser.pos += 1;
        Ok(Value::Bool(lhs == self.atom()?))
      }
      Some(Token::NotEq) => {
        self.parser.pos += 1;
        Ok(Value::Bool(lhs != self.atom()?))
      }
      _ => Ok(lhs),
    }
  }

  fn atom(&mut self) -> Result<Value, DepsError> {
    match self.parser.next() {
      Some(Token::Str(s)) => Ok(Value::Str(s.clone())),
      Some(Token::Ident(name)) => match name.as_str() {
        "True" => Ok(Value::Bool(true)),
        "False" => Ok(Value::Bool(false)),
        _ => (self.lookup)(name),
      },
      Some(Token::Punct('(')) => {
        let value = self.or()?;
        self.parser.expect(')')?;
        Ok(value)
      }
      Some(_) => {
        self.parser.pos -= 1;
        Err(self.parser.unexpected("a value"))
      }
      None => Err(self.parser.unexpected("a value")),
    }
  }
}

fn truthy(value: &Value) -> Result<bool, DepsError> {
  match value {
    Value::Bool(b) => Ok(*b),
    other => Err(DepsError::Type(format!("expected bool, found {} '{other}'", other.type_name()))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
# Comment
use_relative_paths = True

gclient_gn_args_file = 'build/config/gclient_args.gni'
gclient_gn_args = [
  'checkout_google_benchmark',
]

vars = {
  'chromium_url': 'https://chromium.googlesource.com',
  'checkout_google_benchmark' : False,
  'build_revision': 'e3f1',
  'ninja_version': 'version:2@1.12.1.chromium.4',
}

deps = {
  'build':
    Var('chromium_url') + '/chromium/src/build.git' + '@' + Var('build_revision'),
  'third_party/ninja': {
    'packages': [
      {
        'package': 'infra/3pp/tools/ninja/${{platform}}',
        'version': Var('ninja_version'),
      }
    ],
    'dep_type': 'cipd',
    'condition': 'host_cpu != "s390" and host_os != "zos"',
  },
  'tools/clang':
    '{chromium_url}/chromium/src/tools/clang.git' + '@' + 'a1b2',
}

recursedeps = [
  'build',
]
"#;

  #[test]
  fn evaluates_sample() {
    let deps = DepsFile::parse(SAMPLE).unwrap();

    assert_eq!(deps.get("use_relative_paths"), Some(&Value::Bool(true)));
    assert_eq!(
      deps.var("chromium_url"),
      Some(&Value::Str("https://chromium.googlesource.com".into()))
    );

    let build = deps.get("deps").unwrap().get("build").unwrap();
    assert_eq!(
      build.as_str(),
      Some("https://chromium.googlesource.com/chromium/src/build.git@e3f1")
    );

    let ninja = deps.get("deps").unwrap().get("third_party/ninja").unwrap();
    assert_eq!(ninja.get("dep_type"), Some(&Value::Str("cipd".into())));

    assert_eq!(
      deps.get("recursedeps"),
      Some(&Value::List(vec![Value::Str("build".into())]))
    );
  }

  #[test]
  fn preserves_dict_order() {
    let deps = DepsFile::parse("deps = { 'b': 'x@1', 'a': 'y@2', 'c': 'z@3' }").unwrap();
    let Some(Value::Dict(entries)) = deps.get("deps") else {
      panic!("deps is not a dict");
    };
    let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["b", "a", "c"]);
  }

  #[test]
  fn vars_resolve_regardless_of_order() {
    let deps = DepsFile::parse("deps = { 'a': Var('u') }\nvars = { 'u': 'x@1' }").unwrap();
    assert_eq!(deps.get("deps").unwrap().get("a"), Some(&Value::Str("x@1".into())));
  }

  #[test]
  fn implicit_string_concatenation() {
    let deps = DepsFile::parse("x = 'ab' \"cd\"\n  'ef'").unwrap();
    assert_eq!(deps.get("x"), Some(&Value::Str("abcdef".into())));
  }

  #[test]
  fn interpolates_vars() {
    let deps = DepsFile::parse(SAMPLE).unwrap();
    assert_eq!(
      deps.interpolate("{chromium_url}/x.git").unwrap(),
      "https://chromium.googlesource.com/x.git"
    );
    assert_eq!(deps.interpolate("${{platform}}").unwrap(), "${platform}");
    assert_eq!(
      deps.interpolate("{nope}/x").unwrap_err(),
      DepsError::UndefinedVariable("nope".into())
    );
  }

  #[test]
  fn tuples_and_grouping() {
    let deps = DepsFile::parse("a = ('x')\nb = ('x',)\nc = (1, 2)").unwrap();
    assert_eq!(deps.get("a"), Some(&Value::Str("x".into())));
    assert_eq!(deps.get("b"), Some(&Value::List(vec![Value::Str("x".into())])));
    assert_eq!(deps.get("c"), Some(&Value::List(vec![Value::Int(1), Value::Int(2)])));
  }

  #[test]
  fn undefined_var_is_an_error() {
    assert_eq!(
      DepsFile::parse("deps = { 'a': Var('missing') }").unwrap_err(),
      DepsError::UndefinedVariable("missing".into())
    );
  }

  #[test]
  fn rejects_code() {
    let err = DepsFile::parse("import os").unwrap_err();
    assert!(matches!(err, DepsError::Syntax { line: 1, .. }), "{err:?}");

    let err = DepsFile::parse("x = os.system('rm -rf /')").unwrap_err();
    assert!(matches!(err, DepsError::Syntax { .. }), "{err:?}");
  }

  #[test]
  fn reports_line_of_syntax_error() {
    let err = DepsFile::parse("a = 1\nb = {\n  'k' 'v'\n}").unwrap_err();
    assert!(matches!(err, DepsError::Syntax { line: 4, .. }), "{err:?}");
  }

  #[test]
  fn type_errors() {
    assert!(matches!(
      DepsFile::parse("x = 'a' + 1").unwrap_err(),
      DepsError::Type(_)
    ));
  }

  fn host_linux(name: &str) -> Result<Value, DepsError> {
    match name {
      "host_os" => Ok(Value::Str("linux".into())),
      "host_cpu" => Ok(Value::Str("x64".into())),
      "checkout_linux" => Ok(Value::Bool(true)),
      "checkout_mac" => Ok(Value::Bool(false)),
      other => Err(DepsError::UndefinedVariable(other.into())),
    }
  }

  #[test]
  fn conditions() {
    assert!(eval_condition("checkout_linux", host_linux).unwrap());
    assert!(!eval_condition("checkout_mac", host_linux).unwrap());
    assert!(eval_condition("not checkout_mac", host_linux).unwrap());
    assert!(eval_condition("host_os == \"linux\" and host_cpu == 'x64'", host_linux).unwrap());
    assert!(eval_condition("checkout_mac or (host_cpu != \"arm64\")", host_linux).unwrap());
    assert!(!eval_condition("checkout_linux and not checkout_linux", host_linux).unwrap());
  }

  #[test]
  fn condition_errors() {
    assert_eq!(
      eval_condition("checkout_nope", host_linux).unwrap_err(),
      DepsError::UndefinedVariable("checkout_nope".into())
    );
    assert!(matches!(
      eval_condition("host_os", host_linux).unwrap_err(),
      DepsError::Condition { .. }
    ));
    assert!(matches!(
      eval_condition("checkout_linux checkout_mac", host_linux).unwrap_err(),
      DepsError::Condition { .. }
    ));
  }
}
