//! The composable filter tree (spec §4.1, §9 "Filter tree"). Expressed as
//! a tagged-variant tree instead of a provider-specific query builder so
//! every adapter implements one translator against the same shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub field: String,
    pub op: ComparisonOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayMatchMode {
    Any,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayContains {
    pub field: String,
    pub values: Vec<Value>,
    pub mode: ArrayMatchMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub r#where: HashMap<String, Value>,
    #[serde(default)]
    pub comparisons: Vec<Comparison>,
    #[serde(default)]
    pub array_contains: Vec<ArrayContains>,
    #[serde(default)]
    pub text_search: Option<String>,
    #[serde(default)]
    pub or: Vec<Filter>,
    #[serde(default)]
    pub and: Vec<Filter>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.r#where.is_empty()
            && self.comparisons.is_empty()
            && self.array_contains.is_empty()
            && self.text_search.is_none()
            && self.or.is_empty()
            && self.and.is_empty()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut f = Filter::default();
        f.r#where.insert(field.into(), value.into());
        f
    }
}

/// Evaluate a filter predicate against a single JSON-shaped record.
/// This is the shared reference semantics every adapter's translation
/// must agree with (spec §8, "Filter tree round-trip").
pub fn matches(filter: &Filter, record: &Value) -> bool {
    if !filter.r#where.is_empty() {
        for (field, expected) in &filter.r#where {
            if get_field(record, field) != Some(expected) {
                return false;
            }
        }
    }

    for cmp in &filter.comparisons {
        if !eval_comparison(cmp, record) {
            return false;
        }
    }

    for arr in &filter.array_contains {
        if !eval_array_contains(arr, record) {
            return false;
        }
    }

    if let Some(text) = &filter.text_search {
        if !eval_text_search(text, record) {
            return false;
        }
    }

    if !filter.and.is_empty() && !filter.and.iter().all(|f| matches(f, record)) {
        return false;
    }

    if !filter.or.is_empty() && !filter.or.iter().any(|f| matches(f, record)) {
        return false;
    }

    true
}

fn get_field<'a>(record: &'a Value, field: &str) -> Option<&'a Value> {
    record.get(field)
}

fn eval_comparison(cmp: &Comparison, record: &Value) -> bool {
    let actual = match get_field(record, &cmp.field) {
        Some(v) => v,
        None => return false,
    };

    match cmp.op {
        ComparisonOp::Eq => actual == &cmp.value,
        ComparisonOp::Ne => actual != &cmp.value,
        ComparisonOp::Gt => compare_numeric(actual, &cmp.value).map_or(false, |o| o.is_gt()),
        ComparisonOp::Gte => compare_numeric(actual, &cmp.value).map_or(false, |o| o.is_ge()),
        ComparisonOp::Lt => compare_numeric(actual, &cmp.value).map_or(false, |o| o.is_lt()),
        ComparisonOp::Lte => compare_numeric(actual, &cmp.value).map_or(false, |o| o.is_le()),
        ComparisonOp::In => cmp
            .value
            .as_array()
            .map_or(false, |values| values.contains(actual)),
        ComparisonOp::Nin => cmp
            .value
            .as_array()
            .map_or(true, |values| !values.contains(actual)),
        ComparisonOp::Regex => match (actual.as_str(), cmp.value.as_str()) {
            (Some(text), Some(pattern)) => regex::Regex::new(pattern)
                .map(|re| re.is_match(text))
                .unwrap_or(false),
            _ => false,
        },
    }
}

fn compare_numeric(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

fn eval_array_contains(arr: &ArrayContains, record: &Value) -> bool {
    let field_values = match get_field(record, &arr.field).and_then(|v| v.as_array()) {
        Some(values) => values,
        None => return false,
    };

    match arr.mode {
        ArrayMatchMode::Any => arr.values.iter().any(|v| field_values.contains(v)),
        ArrayMatchMode::All => arr.values.iter().all(|v| field_values.contains(v)),
    }
}

fn eval_text_search(text: &str, record: &Value) -> bool {
    let needle = text.to_lowercase();
    fn walk(value: &Value, needle: &str) -> bool {
        match value {
            Value::String(s) => s.to_lowercase().contains(needle),
            Value::Array(items) => items.iter().any(|v| walk(v, needle)),
            Value::Object(map) => map.values().any(|v| walk(v, needle)),
            _ => false,
        }
    }
    walk(record, &needle)
}
