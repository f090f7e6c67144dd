//! Declarative authorization policies.
//!
//! Policies are YAML modules bundled with the service. Each module declares a
//! package and a set of named rules; a query `x = data.<package>.<rule>` is
//! answered by evaluating the rule against a flat JSON input document.
//! Everything is compiled when the engine is built, so a bad module or a
//! policy that points at a missing rule stops the service at startup rather
//! than failing requests later.

mod error;
mod rule;

pub use error::PolicyError;
pub use rule::{Expr, Rule};

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use rule::Evaluator;

/// Name of the binding the engine reads from each result set.
pub const QUERY_BINDING: &str = "x";

const BUNDLED_MODULES: &[(&str, &str)] = &[
    ("authentication.yaml", include_str!("modules/authentication.yaml")),
    ("authorization.yaml", include_str!("modules/authorization.yaml")),
];

/// The closed set of policies the service evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    Authenticate,
    Any,
    AdminOnly,
    UserOnly,
    AdminOrSubject,
}

impl Policy {
    pub const ALL: [Policy; 5] = [
        Policy::Authenticate,
        Policy::Any,
        Policy::AdminOnly,
        Policy::UserOnly,
        Policy::AdminOrSubject,
    ];

    pub fn package(self) -> &'static str {
        match self {
            Policy::Authenticate => "sales.auth",
            _ => "sales.authz",
        }
    }

    pub fn rule(self) -> &'static str {
        match self {
            Policy::Authenticate => "auth",
            Policy::Any => "rule_any",
            Policy::AdminOnly => "rule_admin_only",
            Policy::UserOnly => "rule_user_only",
            Policy::AdminOrSubject => "rule_admin_or_subject",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data.{}.{}", self.package(), self.rule())
    }
}

/// One result set of a query.
pub type Bindings = Map<String, Value>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Module {
    package: String,
    #[serde(default)]
    rules: BTreeMap<String, Rule>,
}

/// Compiled policy modules, immutable after construction.
#[derive(Debug)]
pub struct PolicyEngine {
    packages: HashMap<String, BTreeMap<String, Rule>>,
}

impl PolicyEngine {
    /// Engine over the bundled modules.
    pub fn new() -> Result<Self, PolicyError> {
        Self::with_modules(std::iter::empty::<&str>())
    }

    /// Engine over the bundled modules plus `overrides`.
    ///
    /// An override module merges into the package it names; a rule it defines
    /// replaces the bundled rule of the same name.
    pub fn with_modules<I, S>(overrides: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut packages: HashMap<String, BTreeMap<String, Rule>> = HashMap::new();

        let bundled = BUNDLED_MODULES
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()));
        let overrides = overrides
            .into_iter()
            .enumerate()
            .map(|(i, text)| (format!("override[{i}]"), text.as_ref().to_string()));

        for (name, text) in bundled.chain(overrides) {
            let module = parse_module(&name, &text)?;
            packages.entry(module.package).or_default().extend(module.rules);
        }

        for (package, rules) in &packages {
            check_package(package, rules)?;
        }

        for policy in Policy::ALL {
            let declared = packages
                .get(policy.package())
                .is_some_and(|rules| rules.contains_key(policy.rule()));
            if !declared {
                return Err(PolicyError::compile(
                    policy.package(),
                    format!("policy {policy:?} requires undeclared rule {policy}"),
                ));
            }
        }

        tracing::debug!(
            packages = packages.len(),
            rules = packages.values().map(BTreeMap::len).sum::<usize>(),
            "policy modules compiled"
        );

        Ok(Self { packages })
    }

    /// Run `x = data.<package>.<rule>` and return every result set.
    ///
    /// An undefined rule with no default yields no result sets.
    pub fn query(
        &self,
        package: &str,
        rule: &str,
        input: &Map<String, Value>,
    ) -> Result<Vec<Bindings>, PolicyError> {
        let rules = self
            .packages
            .get(package)
            .filter(|rules| rules.contains_key(rule))
            .ok_or_else(|| PolicyError::unknown_rule(package, rule))?;

        let results = match Evaluator::new(rules, input).rule(rule)? {
            Some(value) => {
                let mut bindings = Bindings::new();
                bindings.insert(QUERY_BINDING.to_string(), value);
                vec![bindings]
            }
            None => Vec::new(),
        };
        Ok(results)
    }

    /// Evaluate a rule and extract its boolean decision.
    pub fn evaluate(
        &self,
        package: &str,
        rule: &str,
        input: &Map<String, Value>,
    ) -> Result<bool, PolicyError> {
        let results = self.query(package, rule, input)?;
        let first = results.first().ok_or_else(|| PolicyError::NoResult {
            package: package.to_string(),
            rule: rule.to_string(),
        })?;

        match first.get(QUERY_BINDING) {
            Some(Value::Bool(decision)) => Ok(*decision),
            Some(other) => Err(PolicyError::BindingType {
                binding: QUERY_BINDING.to_string(),
                found: other.to_string(),
            }),
            None => Err(PolicyError::BindingType {
                binding: QUERY_BINDING.to_string(),
                found: "nothing".to_string(),
            }),
        }
    }

    pub fn check(&self, policy: Policy, input: &Map<String, Value>) -> Result<bool, PolicyError> {
        let decision = self.evaluate(policy.package(), policy.rule(), input);
        tracing::debug!(policy = %policy, decision = ?decision, "policy evaluated");
        decision
    }
}

fn parse_module(name: &str, text: &str) -> Result<Module, PolicyError> {
    // Through serde_json so rule expressions use plain externally tagged maps.
    let value: Value =
        serde_yaml::from_str(text).map_err(|e| PolicyError::compile(name, e.to_string()))?;
    let module: Module =
        serde_json::from_value(value).map_err(|e| PolicyError::compile(name, e.to_string()))?;

    if module.package.is_empty() {
        return Err(PolicyError::compile(name, "package name is empty"));
    }
    Ok(module)
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Every rule reference must resolve inside the package and rules must not recurse.
fn check_package(package: &str, rules: &BTreeMap<String, Rule>) -> Result<(), PolicyError> {
    for (name, rule) in rules {
        let mut refs = Vec::new();
        rule.body.references(&mut refs);
        if let Some(missing) = refs.into_iter().find(|r| !rules.contains_key(*r)) {
            return Err(PolicyError::compile(
                package,
                format!("rule '{name}' references undefined rule '{missing}'"),
            ));
        }
    }

    let mut marks = HashMap::new();
    for name in rules.keys() {
        visit(package, name, rules, &mut marks)?;
    }
    Ok(())
}

fn visit<'a>(
    package: &str,
    name: &'a str,
    rules: &'a BTreeMap<String, Rule>,
    marks: &mut HashMap<&'a str, Mark>,
) -> Result<(), PolicyError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            return Err(PolicyError::compile(package, format!("rule '{name}' is recursive")));
        }
        None => {}
    }

    marks.insert(name, Mark::Visiting);
    if let Some(rule) = rules.get(name) {
        let mut refs = Vec::new();
        rule.body.references(&mut refs);
        for r in refs {
            visit(package, r, rules, marks)?;
        }
    }
    marks.insert(name, Mark::Done);
    Ok(())
}
