//! Formula values and the evaluation capability
//!
//! The engine treats a [`Formula`] as an opaque, non-empty source string. It
//! is forwarded to backends, which either translate it natively (e.g. to SQL)
//! or evaluate it row by row through a [`FormulaEvaluator`].
//!
//! [`BasicEvaluator`] covers a tiny subset (literals, `{field}` references and
//! one binary operator) so that the in-memory backend can resolve targets.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A logical row: field name → value
pub type RowView = Map<String, Value>;

/// Opaque formula source
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Formula(Arc<str>);

impl Formula {
    pub fn new(source: impl AsRef<str>) -> Result<Self> {
        let source = source.as_ref();
        if source.trim().is_empty() {
            return Err(CoreError::EmptyFormula);
        }
        Ok(Formula(Arc::from(source)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Formula({:?})", &*self.0)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Formula {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Formula {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Formula::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Capability to evaluate formulas against a logical row
pub trait FormulaEvaluator: fmt::Debug + Send + Sync {
    /// Compute the value of `formula` for `row`
    fn evaluate(&self, formula: &Formula, row: &RowView) -> Result<Value>;

    /// Whether `row` satisfies the predicate `formula`
    fn matches(&self, formula: &Formula, row: &RowView) -> Result<bool> {
        Ok(is_truthy(&self.evaluate(formula, row)?))
    }
}

/// Formula truthiness: blank, `false`, `0` and empty strings/lists are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Total order used for sorting rows by a formula value
///
/// Blanks sort first, then booleans, numbers, strings; arrays and objects
/// compare equal to each other.
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinaryOp {
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Concat,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Literal(Value),
    Field(String),
    Op(BinaryOp),
}

/// Minimal evaluator for the in-memory backend
///
/// Grammar: `operand [op operand]` where an operand is a number, a
/// double-quoted string, `TRUE()`, `FALSE()`, `BLANK()` or `{field name}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicEvaluator;

impl BasicEvaluator {
    pub fn new() -> Self {
        BasicEvaluator
    }

    fn tokenize(source: &str) -> Result<Vec<Token>> {
        let chars: Vec<char> = source.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                c if c.is_whitespace() => i += 1,
                '{' => {
                    let end = chars[i + 1..]
                        .iter()
                        .position(|c| *c == '}')
                        .ok_or_else(|| CoreError::formula("unterminated field reference"))?;
                    tokens.push(Token::Field(chars[i + 1..i + 1 + end].iter().collect()));
                    i += end + 2;
                }
                '"' => {
                    let end = chars[i + 1..]
                        .iter()
                        .position(|c| *c == '"')
                        .ok_or_else(|| CoreError::formula("unterminated string"))?;
                    let s: String = chars[i + 1..i + 1 + end].iter().collect();
                    tokens.push(Token::Literal(Value::String(s)));
                    i += end + 2;
                }
                '=' => {
                    tokens.push(Token::Op(BinaryOp::Eq));
                    i += 1;
                }
                '!' | '<' | '>' => {
                    let next_eq = chars.get(i + 1) == Some(&'=');
                    let op = match (c, next_eq) {
                        ('!', true) => BinaryOp::Neq,
                        ('<', true) => BinaryOp::Le,
                        ('>', true) => BinaryOp::Ge,
                        ('<', false) => BinaryOp::Lt,
                        ('>', false) => BinaryOp::Gt,
                        _ => return Err(CoreError::formula("unexpected '!'")),
                    };
                    tokens.push(Token::Op(op));
                    i += if next_eq { 2 } else { 1 };
                }
                '+' => {
                    tokens.push(Token::Op(BinaryOp::Add));
                    i += 1;
                }
                '-' if !matches!(tokens.last(), None | Some(Token::Op(_))) => {
                    tokens.push(Token::Op(BinaryOp::Sub));
                    i += 1;
                }
                '&' => {
                    tokens.push(Token::Op(BinaryOp::Concat));
                    i += 1;
                }
                c if c.is_ascii_digit() || c == '-' || c == '.' => {
                    let start = i;
                    i += 1;
                    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                        i += 1;
                    }
                    let text: String = chars[start..i].iter().collect();
                    let number: f64 = text
                        .parse()
                        .map_err(|_| CoreError::formula(format!("invalid number {text:?}")))?;
                    tokens.push(Token::Literal(number_value(number)));
                }
                c if c.is_ascii_alphabetic() => {
                    let start = i;
                    while i < chars.len() && chars[i].is_ascii_alphabetic() {
                        i += 1;
                    }
                    let name: String = chars[start..i].iter().collect();
                    if chars.get(i) != Some(&'(') || chars.get(i + 1) != Some(&')') {
                        return Err(CoreError::formula(format!("unsupported function {name}")));
                    }
                    i += 2;
                    let value = match name.to_ascii_uppercase().as_str() {
                        "TRUE" => Value::Bool(true),
                        "FALSE" => Value::Bool(false),
                        "BLANK" => Value::Null,
                        _ => return Err(CoreError::formula(format!("unsupported function {name}"))),
                    };
                    tokens.push(Token::Literal(value));
                }
                other => return Err(CoreError::formula(format!("unexpected character {other:?}"))),
            }
        }

        Ok(tokens)
    }

    fn operand(token: &Token, row: &RowView) -> Result<Value> {
        match token {
            Token::Literal(v) => Ok(v.clone()),
            Token::Field(name) => Ok(row.get(name).cloned().unwrap_or(Value::Null)),
            Token::Op(_) => Err(CoreError::formula("expected operand")),
        }
    }

    fn apply(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
        let ordering = || cmp_values(&left, &right);
        let comparable = std::mem::discriminant(&left) == std::mem::discriminant(&right);
        Ok(match op {
            BinaryOp::Eq => Value::Bool(comparable && ordering() == Ordering::Equal),
            BinaryOp::Neq => Value::Bool(!comparable || ordering() != Ordering::Equal),
            BinaryOp::Lt => Value::Bool(comparable && ordering() == Ordering::Less),
            BinaryOp::Gt => Value::Bool(comparable && ordering() == Ordering::Greater),
            BinaryOp::Le => Value::Bool(comparable && ordering() != Ordering::Greater),
            BinaryOp::Ge => Value::Bool(comparable && ordering() != Ordering::Less),
            BinaryOp::Add | BinaryOp::Sub => {
                let (Some(a), Some(b)) = (as_number(&left), as_number(&right)) else {
                    return Err(CoreError::formula("arithmetic on non-numeric values"));
                };
                number_value(if op == BinaryOp::Add { a + b } else { a - b })
            }
            BinaryOp::Concat => Value::String(format!("{}{}", display(&left), display(&right))),
        })
    }
}

impl FormulaEvaluator for BasicEvaluator {
    fn evaluate(&self, formula: &Formula, row: &RowView) -> Result<Value> {
        let tokens = Self::tokenize(formula.as_str())?;
        match tokens.as_slice() {
            [single] => Self::operand(single, row),
            [left, Token::Op(op), right] => {
                let left = Self::operand(left, row)?;
                let right = Self::operand(right, row)?;
                Self::apply(*op, left, right)
            }
            _ => Err(CoreError::formula(format!(
                "unsupported formula {:?}",
                formula.as_str()
            ))),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Null => Some(0.0),
        _ => None,
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::Number(Number::from(number as i64))
    } else {
        Number::from_f64(number).map_or(Value::Null, Value::Number)
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
