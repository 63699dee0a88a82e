//! A small `${...}` expression evaluator.
//!
//! Supports integer `+`/`-` arithmetic, string/boolean/null literals and
//! dotted references into the snapshot (`trigger.buildInfo.number`,
//! `images.0.name`). A value that is exactly one expression evaluates to the
//! typed result; expressions embedded in text are interpolated.

use crate::context::ExecutionSnapshot;
use crate::core::{keys, ContextMap};
use crate::evaluation::{
    EvaluationSummary, EvaluatorVersion, ExpressionEvaluator, FailureEntry, FailureLevel,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static EXPRESSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").unwrap());
static WHOLE_EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\$\{([^}]*)\}\s*$").unwrap());

/// Why a single expression failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A reference did not resolve against the snapshot.
    #[error("unresolved reference `{0}`")]
    UnresolvedReference(String),
    /// An operator was applied to a non-integer operand.
    #[error("cannot apply `{op}` to {operand}")]
    TypeMismatch {
        /// The operator.
        op: char,
        /// The offending operand, rendered.
        operand: String,
    },
    /// The expression could not be parsed.
    #[error("syntax error: {0}")]
    Syntax(String),
}

impl TemplateError {
    /// Short name recorded as the failure's exception type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnresolvedReference(_) => "UnresolvedReference",
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::Syntax(_) => "SyntaxError",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Path(String),
    Op(char),
}

/// Reference evaluator for `${...}` templates.
#[derive(Debug, Clone)]
pub struct TemplateEvaluator {
    max_version: EvaluatorVersion,
}

impl Default for TemplateEvaluator {
    fn default() -> Self {
        Self {
            max_version: EvaluatorVersion::V4,
        }
    }
}

struct Resolution {
    value: Value,
    attempted: bool,
    errors: Vec<TemplateError>,
}

impl TemplateEvaluator {
    /// Creates an evaluator supporting every version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the version this evaluator will report as effective.
    #[must_use]
    pub fn with_max_version(mut self, version: EvaluatorVersion) -> Self {
        self.max_version = version;
        self
    }

    /// Evaluates the body of one `${...}` expression.
    pub fn evaluate_expression(
        &self,
        expression: &str,
        snapshot: &ExecutionSnapshot,
    ) -> Result<Value, TemplateError> {
        let tokens = tokenize(expression)?;
        let mut tokens = tokens.into_iter();

        let first = tokens
            .next()
            .ok_or_else(|| TemplateError::Syntax("empty expression".to_string()))?;
        let mut acc = operand(first, snapshot)?;

        while let Some(token) = tokens.next() {
            let Token::Op(op) = token else {
                return Err(TemplateError::Syntax(format!("expected operator in `{expression}`")));
            };
            let rhs = tokens
                .next()
                .ok_or_else(|| TemplateError::Syntax(format!("dangling `{op}`")))?;
            let rhs = operand(rhs, snapshot)?;
            let (Some(a), Some(b)) = (acc.as_i64(), rhs.as_i64()) else {
                let operand = if acc.is_i64() { rhs } else { acc };
                return Err(TemplateError::TypeMismatch {
                    op,
                    operand: operand.to_string(),
                });
            };
            let result = if op == '+' { a.checked_add(b) } else { a.checked_sub(b) };
            acc = Value::from(
                result.ok_or_else(|| TemplateError::Syntax("integer overflow".to_string()))?,
            );
        }

        Ok(acc)
    }

    fn resolve(&self, value: &Value, snapshot: &ExecutionSnapshot) -> Resolution {
        match value {
            Value::String(text) => self.resolve_text(text, snapshot),
            Value::Array(items) => {
                let mut out = Resolution {
                    value: Value::Null,
                    attempted: false,
                    errors: Vec::new(),
                };
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    let r = self.resolve(item, snapshot);
                    out.attempted |= r.attempted;
                    out.errors.extend(r.errors);
                    resolved.push(r.value);
                }
                out.value = Value::Array(resolved);
                out
            }
            Value::Object(map) => {
                let mut out = Resolution {
                    value: Value::Null,
                    attempted: false,
                    errors: Vec::new(),
                };
                let mut resolved = ContextMap::new();
                for (k, v) in map {
                    let r = self.resolve(v, snapshot);
                    out.attempted |= r.attempted;
                    out.errors.extend(r.errors);
                    resolved.insert(k.clone(), r.value);
                }
                out.value = Value::Object(resolved);
                out
            }
            other => Resolution {
                value: other.clone(),
                attempted: false,
                errors: Vec::new(),
            },
        }
    }

    fn resolve_text(&self, text: &str, snapshot: &ExecutionSnapshot) -> Resolution {
        if !EXPRESSION.is_match(text) {
            return Resolution {
                value: Value::String(text.to_string()),
                attempted: false,
                errors: Vec::new(),
            };
        }

        let mut errors = Vec::new();
        let value = if let Some(caps) = WHOLE_EXPRESSION.captures(text) {
            match self.evaluate_expression(&caps[1], snapshot) {
                Ok(v) => v,
                Err(e) => {
                    errors.push(e);
                    Value::String(text.to_string())
                }
            }
        } else {
            let rendered = EXPRESSION.replace_all(text, |caps: &regex::Captures<'_>| {
                match self.evaluate_expression(&caps[1], snapshot) {
                    Ok(Value::String(s)) => s,
                    Ok(v) => v.to_string(),
                    Err(e) => {
                        errors.push(e);
                        caps[0].to_string()
                    }
                }
            });
            if errors.is_empty() {
                Value::String(rendered.into_owned())
            } else {
                Value::String(text.to_string())
            }
        };

        Resolution {
            value,
            attempted: true,
            errors,
        }
    }
}

impl ExpressionEvaluator for TemplateEvaluator {
    fn contains_expression(&self, value: &str) -> bool {
        EXPRESSION.is_match(value)
    }

    fn process(
        &self,
        source: &ContextMap,
        snapshot: &ExecutionSnapshot,
        strict: bool,
        summary: &mut EvaluationSummary,
    ) -> ContextMap {
        let level = if strict {
            FailureLevel::Error
        } else {
            FailureLevel::Warn
        };

        source
            .iter()
            .map(|(key, value)| {
                if keys::is_bookkeeping(key) {
                    return (key.clone(), value.clone());
                }
                let resolution = self.resolve(value, snapshot);
                if resolution.attempted {
                    summary.record_attempt(key.as_str());
                }
                for err in resolution.errors {
                    summary.add_failure(
                        key.as_str(),
                        FailureEntry::new(format!("Failed to evaluate [{key}]: {err}"))
                            .with_exception_type(err.kind())
                            .with_level(level),
                    );
                }
                (key.clone(), resolution.value)
            })
            .collect()
    }

    fn effective_version(&self, requested: Option<EvaluatorVersion>) -> EvaluatorVersion {
        requested.unwrap_or(self.max_version).min(self.max_version)
    }
}

fn operand(token: Token, snapshot: &ExecutionSnapshot) -> Result<Value, TemplateError> {
    match token {
        Token::Int(n) => Ok(Value::from(n)),
        Token::Str(s) => Ok(Value::String(s)),
        Token::Path(path) => match path.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            _ => snapshot
                .lookup(&path)
                .cloned()
                .ok_or(TemplateError::UnresolvedReference(path)),
        },
        Token::Op(op) => Err(TemplateError::Syntax(format!("unexpected `{op}`"))),
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' => {
                chars.next();
                let is_sign = !matches!(tokens.last(), Some(Token::Int(_) | Token::Str(_) | Token::Path(_)));
                if is_sign && c == '-' && chars.peek().is_some_and(char::is_ascii_digit) {
                    let digits = take_while(&mut chars, |c| c.is_ascii_digit());
                    tokens.push(Token::Int(parse_int(&format!("-{digits}"))?));
                } else {
                    tokens.push(Token::Op(c));
                }
            }
            '0'..='9' => {
                let digits = take_while(&mut chars, |c| c.is_ascii_digit());
                tokens.push(Token::Int(parse_int(&digits)?));
            }
            '\'' | '"' => {
                chars.next();
                let literal = take_while(&mut chars, |ch| ch != c);
                if chars.next() != Some(c) {
                    return Err(TemplateError::Syntax("unterminated string literal".to_string()));
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_alphabetic() || c == '_' => {
                let path = take_while(&mut chars, |c| c.is_alphanumeric() || c == '_' || c == '.');
                tokens.push(Token::Path(path));
            }
            other => {
                return Err(TemplateError::Syntax(format!("unexpected character `{other}`")));
            }
        }
    }

    Ok(tokens)
}

fn take_while(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    pred: impl Fn(char) -> bool,
) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if !pred(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

fn parse_int(digits: &str) -> Result<i64, TemplateError> {
    digits
        .parse()
        .map_err(|_| TemplateError::Syntax(format!("invalid integer `{digits}`")))
}
