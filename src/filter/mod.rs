//! Payload filter language.
//!
//! Filters are parsed from JSON into a small AST and evaluated recursively
//! against a point's payload. Two input shapes are accepted:
//!
//! Flat equality, every key must match:
//!
//! ```json
//! {"language": "python", "type": "content"}
//! ```
//!
//! Nested boolean form, recursively nestable:
//!
//! ```json
//! {
//!   "must": [{"key": "language", "match": {"value": "python"}}],
//!   "should": [{"key": "path", "match": {"pattern": "src/**/*.py"}}],
//!   "must_not": [{"key": "type", "match": {"value": "test"}}]
//! }
//! ```
//!
//! Match operators: `value` (exact), `text` (substring), `any` (set
//! membership), `pattern` (glob). `range` takes `gt`/`gte`/`lt`/`lte` bounds,
//! numbers or RFC 3339 timestamps. Keys may be dotted to reach nested payload
//! fields.

use globset::{GlobBuilder, GlobMatcher};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::Payload;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid filter: {0}\nSuggestion: use a flat {{\"key\": value}} map or must/should/must_not clauses")]
    Invalid(String),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

/// Compiled glob over `/`-separated paths.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    matcher: GlobMatcher,
}

impl GlobPattern {
    /// `**` spans directories, `*` and `?` stay within one segment.
    /// Alternation (`{py,rs}`) and classes (`[ab]`) are supported.
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| FilterError::Pattern {
                pattern: pattern.to_string(),
                reason: e.kind().to_string(),
            })?;
        Ok(Self {
            source: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

/// Per-field match operator.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Exact equality
    Value(Value),
    /// Substring of a string field
    Text(String),
    /// Equal to any of the values
    Any(Vec<Value>),
    /// Glob match of a string field
    Pattern(GlobPattern),
}

/// Numeric or timestamp interval; unset bounds are open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeBounds {
    pub gt: Option<f64>,
    pub gte: Option<f64>,
    pub lt: Option<f64>,
    pub lte: Option<f64>,
}

impl RangeBounds {
    fn contains(&self, x: f64) -> bool {
        self.gt.is_none_or(|b| x > b)
            && self.gte.is_none_or(|b| x >= b)
            && self.lt.is_none_or(|b| x < b)
            && self.lte.is_none_or(|b| x <= b)
    }
}

/// Filter AST.
#[derive(Debug, Clone)]
pub enum Filter {
    Match { key: String, condition: Condition },
    Range { key: String, bounds: RangeBounds },
    /// All children match
    And(Vec<Filter>),
    /// At least one child matches
    Or(Vec<Filter>),
    /// No child matches
    Not(Vec<Filter>),
}

impl Filter {
    /// Parse either accepted JSON shape.
    pub fn parse(value: &Value) -> Result<Self, FilterError> {
        let object = value
            .as_object()
            .ok_or_else(|| FilterError::Invalid("filter must be a JSON object".to_string()))?;

        if is_clause_object(object) {
            parse_clauses(object)
        } else {
            parse_flat(object)
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, FilterError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| FilterError::Invalid(format!("not valid JSON: {e}")))?;
        Self::parse(&value)
    }

    /// Evaluate against `payload`.
    #[must_use]
    pub fn matches(&self, payload: &Payload) -> bool {
        match self {
            Self::Match { key, condition } => {
                lookup(payload, key).is_some_and(|field| match_field(field, condition))
            }
            Self::Range { key, bounds } => {
                lookup(payload, key).is_some_and(|field| range_field(field, bounds))
            }
            Self::And(children) => children.iter().all(|c| c.matches(payload)),
            Self::Or(children) => children.iter().any(|c| c.matches(payload)),
            Self::Not(children) => !children.iter().any(|c| c.matches(payload)),
        }
    }
}

fn is_clause_object(object: &Map<String, Value>) -> bool {
    ["must", "should", "must_not"]
        .iter()
        .any(|k| object.contains_key(*k))
}

fn parse_clauses(object: &Map<String, Value>) -> Result<Filter, FilterError> {
    let mut parts = Vec::new();
    for (name, value) in object {
        let children = parse_condition_list(name, value)?;
        match name.as_str() {
            "must" => parts.push(Filter::And(children)),
            "should" if !children.is_empty() => parts.push(Filter::Or(children)),
            "should" => {}
            "must_not" => parts.push(Filter::Not(children)),
            other => {
                return Err(FilterError::Invalid(format!(
                    "unknown clause '{other}' next to must/should/must_not"
                )));
            }
        }
    }
    Ok(match parts.len() {
        1 => parts.remove(0),
        _ => Filter::And(parts),
    })
}

fn parse_condition_list(clause: &str, value: &Value) -> Result<Vec<Filter>, FilterError> {
    match value {
        Value::Array(items) => items.iter().map(parse_condition).collect(),
        Value::Object(_) => Ok(vec![parse_condition(value)?]),
        _ => Err(FilterError::Invalid(format!(
            "'{clause}' must be a list of conditions"
        ))),
    }
}

fn parse_condition(value: &Value) -> Result<Filter, FilterError> {
    let object = value
        .as_object()
        .ok_or_else(|| FilterError::Invalid(format!("condition must be an object: {value}")))?;

    if is_clause_object(object) {
        return parse_clauses(object);
    }

    let key = object
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| FilterError::Invalid(format!("condition without 'key': {value}")))?
        .to_string();

    if let Some(spec) = object.get("match") {
        return Ok(Filter::Match {
            key,
            condition: parse_match(spec)?,
        });
    }
    if let Some(spec) = object.get("range") {
        return Ok(Filter::Range {
            key,
            bounds: parse_range(spec)?,
        });
    }
    Err(FilterError::Invalid(format!(
        "condition on '{key}' needs 'match' or 'range'"
    )))
}

fn parse_match(spec: &Value) -> Result<Condition, FilterError> {
    let object = spec
        .as_object()
        .ok_or_else(|| FilterError::Invalid(format!("'match' must be an object: {spec}")))?;

    if let Some(v) = object.get("value") {
        return Ok(Condition::Value(v.clone()));
    }
    if let Some(v) = object.get("text") {
        let text = v
            .as_str()
            .ok_or_else(|| FilterError::Invalid("'text' must be a string".to_string()))?;
        return Ok(Condition::Text(text.to_string()));
    }
    if let Some(v) = object.get("any") {
        let values = v
            .as_array()
            .ok_or_else(|| FilterError::Invalid("'any' must be a list".to_string()))?;
        return Ok(Condition::Any(values.clone()));
    }
    if let Some(v) = object.get("pattern").or_else(|| object.get("glob")) {
        let pattern = v
            .as_str()
            .ok_or_else(|| FilterError::Invalid("'pattern' must be a string".to_string()))?;
        return Ok(Condition::Pattern(GlobPattern::new(pattern)?));
    }
    Err(FilterError::Invalid(format!(
        "unsupported match operator in {spec}"
    )))
}

fn parse_range(spec: &Value) -> Result<RangeBounds, FilterError> {
    let object = spec
        .as_object()
        .ok_or_else(|| FilterError::Invalid(format!("'range' must be an object: {spec}")))?;

    let mut bounds = RangeBounds::default();
    for (name, value) in object {
        let bound = as_ordinal(value).ok_or_else(|| {
            FilterError::Invalid(format!(
                "range bound '{name}' must be a number or RFC 3339 timestamp"
            ))
        })?;
        match name.as_str() {
            "gt" => bounds.gt = Some(bound),
            "gte" => bounds.gte = Some(bound),
            "lt" => bounds.lt = Some(bound),
            "lte" => bounds.lte = Some(bound),
            other => {
                return Err(FilterError::Invalid(format!("unknown range bound '{other}'")));
            }
        }
    }
    Ok(bounds)
}

fn parse_flat(object: &Map<String, Value>) -> Result<Filter, FilterError> {
    let children = object
        .iter()
        .map(|(key, value)| Filter::Match {
            key: key.clone(),
            condition: Condition::Value(value.clone()),
        })
        .collect();
    Ok(Filter::And(children))
}

/// Resolve a dotted key inside the payload.
fn lookup<'a>(payload: &'a Payload, key: &str) -> Option<&'a Value> {
    if let Some(value) = payload.get(key) {
        return Some(value);
    }
    let mut parts = key.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn match_field(field: &Value, condition: &Condition) -> bool {
    // Array fields match when any element does
    if let Value::Array(items) = field {
        if !matches!(condition, Condition::Value(Value::Array(_))) {
            return items.iter().any(|item| match_field(item, condition));
        }
    }

    match condition {
        Condition::Value(expected) => values_equal(field, expected),
        Condition::Text(needle) => field.as_str().is_some_and(|s| s.contains(needle.as_str())),
        Condition::Any(options) => options.iter().any(|o| values_equal(field, o)),
        Condition::Pattern(glob) => field.as_str().is_some_and(|s| glob.is_match(s)),
    }
}

fn range_field(field: &Value, bounds: &RangeBounds) -> bool {
    match field {
        Value::Array(items) => items.iter().any(|item| range_field(item, bounds)),
        other => as_ordinal(other).is_some_and(|x| bounds.contains(x)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Numbers as-is; RFC 3339 strings as Unix seconds.
fn as_ordinal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_millis()) / 1000.0),
        _ => None,
    }
}
