//! Rule expressions and their evaluation.
//!
//! Evaluation is three-valued. `Ok(None)` means *undefined*, which is what a
//! lookup of a missing input field produces; operators propagate it instead of
//! guessing, so a rule over incomplete input falls back to its default.

use std::collections::BTreeMap;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::PolicyError;

/// A node of a rule body, written in YAML as a single-key mapping:
///
/// ```yaml
/// any_of:
///   - contains: [{input: roles}, {rule: role_admin}]
///   - eq: [{input: subject}, {input: user_id}]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Const(Value),
    /// Dotted path into the input document.
    Input(String),
    /// Another rule of the same package.
    Rule(String),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    /// Array membership, or substring when both sides are strings.
    Contains(Box<Expr>, Box<Expr>),
    Intersects(Box<Expr>, Box<Expr>),
    AllOf(Vec<Expr>),
    AnyOf(Vec<Expr>),
    Not(Box<Expr>),
    /// EdDSA signature check of a compact token against a PEM public key.
    JwtVerify { token: Box<Expr>, key: Box<Expr> },
}

impl Expr {
    /// Names of the rules this expression refers to.
    pub fn references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Const(_) | Expr::Input(_) => {}
            Expr::Rule(name) => out.push(name),
            Expr::Eq(a, b) | Expr::Ne(a, b) | Expr::Contains(a, b) | Expr::Intersects(a, b) => {
                a.references(out);
                b.references(out);
            }
            Expr::AllOf(items) | Expr::AnyOf(items) => items.iter().for_each(|e| e.references(out)),
            Expr::Not(inner) => inner.references(out),
            Expr::JwtVerify { token, key } => {
                token.references(out);
                key.references(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(default)]
    pub default: Option<Value>,
    pub body: Expr,
}

/// Evaluates rules of one package against one input document.
pub(crate) struct Evaluator<'a> {
    rules: &'a BTreeMap<String, Rule>,
    input: &'a Map<String, Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(rules: &'a BTreeMap<String, Rule>, input: &'a Map<String, Value>) -> Self {
        Self { rules, input }
    }

    /// Value of the named rule: its body, else its default, else undefined.
    pub fn rule(&self, name: &str) -> Result<Option<Value>, PolicyError> {
        let rule = self
            .rules
            .get(name)
            .ok_or_else(|| PolicyError::Evaluation(format!("rule '{name}' is not defined")))?;

        match self.eval(&rule.body)? {
            Some(value) => Ok(Some(value)),
            None => Ok(rule.default.clone()),
        }
    }

    fn eval(&self, expr: &Expr) -> Result<Option<Value>, PolicyError> {
        let value = match expr {
            Expr::Const(value) => Some(value.clone()),
            Expr::Input(path) => lookup(self.input, path).cloned(),
            Expr::Rule(name) => self.rule(name)?,
            Expr::Eq(a, b) => self.both(a, b)?.map(|(a, b)| Value::Bool(a == b)),
            Expr::Ne(a, b) => self.both(a, b)?.map(|(a, b)| Value::Bool(a != b)),
            Expr::Contains(collection, item) => {
                self.both(collection, item)?.and_then(|(c, i)| contains(&c, &i))
            }
            Expr::Intersects(a, b) => self.both(a, b)?.and_then(|(a, b)| intersects(&a, &b)),
            Expr::AllOf(items) => {
                let mut undefined = false;
                for item in items {
                    match truth(self.eval(item)?)? {
                        Some(false) => return Ok(Some(Value::Bool(false))),
                        Some(true) => {}
                        None => undefined = true,
                    }
                }
                (!undefined).then_some(Value::Bool(true))
            }
            Expr::AnyOf(items) => {
                let mut undefined = false;
                for item in items {
                    match truth(self.eval(item)?)? {
                        Some(true) => return Ok(Some(Value::Bool(true))),
                        Some(false) => {}
                        None => undefined = true,
                    }
                }
                (!undefined).then_some(Value::Bool(false))
            }
            Expr::Not(inner) => truth(self.eval(inner)?)?.map(|b| Value::Bool(!b)),
            Expr::JwtVerify { token, key } => match self.both(token, key)? {
                Some((Value::String(token), Value::String(key))) => {
                    Some(Value::Bool(verify_signature(&token, &key)))
                }
                _ => None,
            },
        };
        Ok(value)
    }

    fn both(&self, a: &Expr, b: &Expr) -> Result<Option<(Value, Value)>, PolicyError> {
        let a = self.eval(a)?;
        let b = self.eval(b)?;
        Ok(a.zip(b))
    }
}

fn lookup<'v>(input: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.');
    let mut current = input.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn truth(value: Option<Value>) -> Result<Option<bool>, PolicyError> {
    match value {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(other) => Err(PolicyError::Evaluation(format!(
            "expected a boolean operand, found {other}"
        ))),
    }
}

fn contains(collection: &Value, item: &Value) -> Option<Value> {
    match (collection, item) {
        (Value::Array(items), item) => Some(Value::Bool(items.contains(item))),
        (Value::String(haystack), Value::String(needle)) => {
            Some(Value::Bool(haystack.contains(needle.as_str())))
        }
        _ => None,
    }
}

fn intersects(a: &Value, b: &Value) -> Option<Value> {
    let (Value::Array(a), Value::Array(b)) = (a, b) else {
        return None;
    };
    Some(Value::Bool(a.iter().any(|item| b.contains(item))))
}

/// Signature and algorithm check only; token times are the authenticator's job.
fn verify_signature(token: &str, public_pem: &str) -> bool {
    let Ok(key) = DecodingKey::from_ed_pem(public_pem.as_bytes()) else {
        return false;
    };

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<Value>(token, &key, &validation).is_ok()
}
