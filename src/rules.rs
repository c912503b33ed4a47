//! Rule sets.
//!
//! A rule set is an ordered list of `key => rule` entries. Keys are either a
//! section name (`headers`) or a field path rooted in one
//! (`headers.authorization`). Rules are literals compared with [`equals`] or
//! predicates returning a [`Verdict`].

use crate::error::ConfigError;
use crate::path::FieldPath;
use crate::response::MockResponse;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One facet of an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Params,
    Headers,
    Query,
    Cookies,
    Body,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Params,
        Section::Headers,
        Section::Query,
        Section::Cookies,
        Section::Body,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Section::Params => "params",
            Section::Headers => "headers",
            Section::Query => "query",
            Section::Cookies => "cookies",
            Section::Body => "body",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Whether a rule key reads from this section.
    pub fn is_referenced_by(self, key: &str) -> bool {
        match key.strip_prefix(self.name()) {
            Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
            None => false,
        }
    }

    /// The section a rule key reads from.
    pub fn of_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.is_referenced_by(key))
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    /// Failure with a reason; an empty reason reports a generic failure.
    Fail(String),
    /// Reply with this response instead of a rejection.
    Respond(MockResponse),
}

impl Verdict {
    /// `Pass` when `condition` holds, otherwise fail with `reason`.
    pub fn require(condition: bool, reason: impl Into<String>) -> Self {
        if condition {
            Verdict::Pass
        } else {
            Verdict::Fail(reason.into())
        }
    }
}

impl From<bool> for Verdict {
    fn from(pass: bool) -> Self {
        if pass {
            Verdict::Pass
        } else {
            Verdict::Fail(String::new())
        }
    }
}

impl From<&str> for Verdict {
    fn from(reason: &str) -> Self {
        Verdict::Fail(reason.to_string())
    }
}

impl From<String> for Verdict {
    fn from(reason: String) -> Self {
        Verdict::Fail(reason)
    }
}

impl From<MockResponse> for Verdict {
    fn from(response: MockResponse) -> Self {
        Verdict::Respond(response)
    }
}

pub type PredicateFn = Arc<dyn Fn(Option<&Value>) -> Verdict + Send + Sync>;

/// A single assertion.
#[derive(Clone)]
pub enum Rule {
    /// Expected value; `None` means the field must be absent.
    Literal(Option<Value>),
    /// Custom check on the resolved value.
    Predicate(PredicateFn),
}

impl Rule {
    pub fn literal(value: impl Into<Value>) -> Self {
        Rule::Literal(Some(value.into()))
    }

    /// The field must not be present.
    pub fn absent() -> Self {
        Rule::Literal(None)
    }

    pub fn predicate<F, R>(check: F) -> Self
    where
        F: Fn(Option<&Value>) -> R + Send + Sync + 'static,
        R: Into<Verdict>,
    {
        Rule::Predicate(Arc::new(move |value: Option<&Value>| -> Verdict {
            check(value).into()
        }))
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Literal(expected) => f.debug_tuple("Literal").field(expected).finish(),
            Rule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for Rule {
    fn from(value: &str) -> Self {
        Rule::literal(value)
    }
}

impl From<String> for Rule {
    fn from(value: String) -> Self {
        Rule::literal(value)
    }
}

impl From<Value> for Rule {
    fn from(value: Value) -> Self {
        Rule::Literal(Some(value))
    }
}

impl From<Option<Value>> for Rule {
    fn from(value: Option<Value>) -> Self {
        Rule::Literal(value)
    }
}

impl From<Vec<&str>> for Rule {
    fn from(values: Vec<&str>) -> Self {
        Rule::literal(values)
    }
}

/// Field must be present, with any value.
pub fn defined() -> Rule {
    Rule::predicate(|value: Option<&Value>| value.is_some())
}

/// Field must strictly equal one of `values`.
pub fn one_of<I, V>(values: I) -> Rule
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let allowed: Vec<Value> = values.into_iter().map(Into::into).collect();
    Rule::predicate(move |value: Option<&Value>| {
        value.is_some_and(|v| allowed.iter().any(|a| strict_eq(v, a)))
    })
}

/// Field must be a string matching `pattern`.
pub fn matches(pattern: &str) -> Result<Rule, regex::Error> {
    let regex = Regex::new(pattern)?;
    Ok(Rule::predicate(move |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .is_some_and(|s| regex.is_match(s))
    }))
}

/// String field containing `needle`, or list field holding it as an element.
pub fn contains(needle: impl Into<String>) -> Rule {
    let needle = needle.into();
    Rule::predicate(move |value: Option<&Value>| match value {
        Some(Value::String(s)) => s.contains(needle.as_str()),
        Some(Value::Array(items)) => items.iter().any(|item| item.as_str() == Some(needle.as_str())),
        _ => false,
    })
}

/// Numeric field, or numeric string, within the inclusive bounds.
pub fn within(min: Option<f64>, max: Option<f64>) -> Rule {
    Rule::predicate(move |value: Option<&Value>| {
        let number = match value {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        number.is_some_and(|n| min.map_or(true, |min| n >= min) && max.map_or(true, |max| n <= max))
    })
}

/// Literal comparison.
///
/// Lists match element by element, in order. Everything else uses strict
/// equality, under which two objects or two lists are never equal.
pub fn equals(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match (actual, expected) {
        (None, None) => true,
        (Some(Value::Array(actual)), Some(Value::Array(expected))) => {
            actual.len() == expected.len()
                && actual.iter().zip(expected).all(|(a, e)| strict_eq(a, e))
        }
        (_, Some(Value::Array(_))) => false,
        (Some(actual), Some(expected)) => strict_eq(actual, expected),
        _ => false,
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

/// A rule with its key parsed ahead of evaluation.
#[derive(Debug, Clone)]
pub struct KeyedRule {
    pub key: String,
    pub path: FieldPath,
    pub section: Option<Section>,
    pub rule: Rule,
}

/// Ordered rules for one handler.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<KeyedRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. A repeated key replaces the earlier rule in place.
    pub fn rule(mut self, key: impl Into<String>, rule: impl Into<Rule>) -> Self {
        self.push(key, rule);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, rule: impl Into<Rule>) {
        let key = key.into();
        let rule = rule.into();
        if let Some(existing) = self.rules.iter_mut().find(|r| r.key == key) {
            existing.rule = rule;
            return;
        }
        self.rules.push(KeyedRule {
            path: FieldPath::parse(&key),
            section: Section::of_key(&key),
            key,
            rule,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyedRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether any rule reads from `section`.
    pub fn references(&self, section: Section) -> bool {
        self.rules.iter().any(|r| r.section == Some(section))
    }

    /// Every key must be rooted in a section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.rules.iter().find(|r| r.section.is_none()) {
            Some(r) => Err(ConfigError::UnknownSection(r.key.clone())),
            None => Ok(()),
        }
    }
}
