//! Conjunctive filter expression grammar
//!
//! Filters arrive from the generation gateway as text of the form
//! `field op value AND field op value ...`. Parsing them into a typed
//! expression makes well-formedness a pure function and lets the backend
//! evaluate them against rows without re-lexing.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

/// One row of backend output
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    BeginsWith,
}

impl CompareOp {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Contains => "contains",
            Self::BeginsWith => "begins_with",
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Text(s) => write!(f, "'{}'", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    pub value: Literal,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op.as_str(), self.value)
    }
}

/// Conjunction of comparison conditions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterExpr {
    pub conditions: Vec<Condition>,
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(" AND "))
    }
}

fn condition_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Longest operators first so ">=" is not lexed as ">" then "=".
        regex::Regex::new(
            r"(?i)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(>=|<=|!=|<>|=|>|<|\bcontains\b|\bbegins_with\b)\s*(.+?)\s*$",
        )
        .expect("condition regex")
    })
}

fn parse_literal(raw: &str) -> Literal {
    let trimmed = raw.trim();
    if (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
        || (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
    {
        return Literal::Text(trimmed[1..trimmed.len() - 1].to_string());
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Literal::Number(n);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => Literal::Bool(true),
        "false" => Literal::Bool(false),
        _ => Literal::Text(trimmed.to_string()),
    }
}

impl FilterExpr {
    /// Parse a conjunctive filter. Empty input parses to an empty filter
    /// that matches every row.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(FilterExpr::default());
        }

        let mut conditions = Vec::new();
        for clause in split_and(input) {
            let clause = clause.trim();
            if clause.is_empty() {
                return Err(Error::MalformedQuery(
                    "Empty clause in filter expression".to_string(),
                ));
            }
            let caps = condition_re().captures(clause).ok_or_else(|| {
                Error::MalformedQuery(format!(
                    "Cannot parse filter clause '{}'; expected 'field op value'",
                    clause
                ))
            })?;

            let op = match caps[2].to_ascii_lowercase().as_str() {
                "=" => CompareOp::Eq,
                "!=" | "<>" => CompareOp::Ne,
                ">" => CompareOp::Gt,
                ">=" => CompareOp::Ge,
                "<" => CompareOp::Lt,
                "<=" => CompareOp::Le,
                "contains" => CompareOp::Contains,
                "begins_with" => CompareOp::BeginsWith,
                other => {
                    return Err(Error::MalformedQuery(format!(
                        "Unsupported operator '{}'",
                        other
                    )))
                }
            };

            conditions.push(Condition {
                field: caps[1].to_string(),
                op,
                value: parse_literal(&caps[3]),
            });
        }

        Ok(FilterExpr { conditions })
    }

    /// Fields referenced by the filter, for schema validation
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.field.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a row; missing fields never match
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| condition_matches(c, row))
    }
}

/// Split on AND outside quotes, case-insensitive
fn split_and(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
                i += 1;
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                    current.push(c);
                    i += 1;
                } else if (c == 'a' || c == 'A')
                    && i + 3 <= chars.len()
                    && chars[i..].len() >= 3
                    && chars[i + 1].eq_ignore_ascii_case(&'n')
                    && chars[i + 2].eq_ignore_ascii_case(&'d')
                    && (i == 0 || chars[i - 1].is_whitespace())
                    && (i + 3 == chars.len() || chars[i + 3].is_whitespace())
                {
                    parts.push(std::mem::take(&mut current));
                    i += 3;
                } else {
                    current.push(c);
                    i += 1;
                }
            }
        }
    }
    parts.push(current);
    parts
}

/// Extract a comparable number from a JSON value; numeric strings coerce
/// (the store serializes decimals as strings)
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn condition_matches(condition: &Condition, row: &Row) -> bool {
    let Some(actual) = row.get(&condition.field) else {
        return false;
    };

    if condition.op.is_ordering() {
        let (Some(lhs), Literal::Number(rhs)) = (numeric_value(actual), &condition.value) else {
            return false;
        };
        return match condition.op {
            CompareOp::Gt => lhs > *rhs,
            CompareOp::Ge => lhs >= *rhs,
            CompareOp::Lt => lhs < *rhs,
            CompareOp::Le => lhs <= *rhs,
            _ => unreachable!(),
        };
    }

    match condition.op {
        CompareOp::Eq | CompareOp::Ne => {
            let equal = match &condition.value {
                Literal::Number(rhs) => numeric_value(actual).map(|lhs| lhs == *rhs),
                Literal::Bool(rhs) => actual.as_bool().map(|lhs| lhs == *rhs),
                Literal::Text(rhs) => string_value(actual).map(|lhs| lhs == *rhs),
            }
            .unwrap_or(false);
            if condition.op == CompareOp::Eq {
                equal
            } else {
                !equal
            }
        }
        CompareOp::Contains => match (&string_value(actual), &condition.value) {
            (Some(lhs), Literal::Text(rhs)) => lhs.to_lowercase().contains(&rhs.to_lowercase()),
            _ => false,
        },
        CompareOp::BeginsWith => match (&string_value(actual), &condition.value) {
            (Some(lhs), Literal::Text(rhs)) => {
                lhs.to_lowercase().starts_with(&rhs.to_lowercase())
            }
            _ => false,
        },
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_single_condition() {
        let filter = FilterExpr::parse("customer_country = 'Germany'").unwrap();
        assert_eq!(filter.conditions.len(), 1);
        assert_eq!(filter.conditions[0].field, "customer_country");
        assert_eq!(filter.conditions[0].op, CompareOp::Eq);
        assert_eq!(
            filter.conditions[0].value,
            Literal::Text("Germany".to_string())
        );
    }

    #[test]
    fn test_parse_conjunction_with_ordering() {
        let filter =
            FilterExpr::parse("unit_price >= 10.5 AND category_name contains 'bever'").unwrap();
        assert_eq!(filter.conditions.len(), 2);
        assert_eq!(filter.conditions[0].op, CompareOp::Ge);
        assert_eq!(filter.conditions[1].op, CompareOp::Contains);
    }

    #[test]
    fn test_parse_empty_is_match_all() {
        let filter = FilterExpr::parse("  ").unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&row(json!({"anything": 1}))));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            FilterExpr::parse("this is not a filter"),
            Err(Error::MalformedQuery(_))
        ));
        assert!(matches!(
            FilterExpr::parse("a = 1 AND AND b = 2"),
            Err(Error::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_and_inside_quotes_not_split() {
        let filter = FilterExpr::parse("company = 'Island Trading and Sons'").unwrap();
        assert_eq!(filter.conditions.len(), 1);
        assert_eq!(
            filter.conditions[0].value,
            Literal::Text("Island Trading and Sons".to_string())
        );
    }

    #[test]
    fn test_matches_numeric_coercion_from_string() {
        // Decimal columns round-trip as strings
        let filter = FilterExpr::parse("line_total > 100").unwrap();
        assert!(filter.matches(&row(json!({"line_total": "250.5"}))));
        assert!(!filter.matches(&row(json!({"line_total": "99.9"}))));
        assert!(!filter.matches(&row(json!({"line_total": "abc"}))));
    }

    #[test]
    fn test_matches_missing_field_is_false() {
        let filter = FilterExpr::parse("country = 'UK'").unwrap();
        assert!(!filter.matches(&row(json!({"city": "London"}))));
    }

    #[test]
    fn test_matches_begins_with_case_insensitive() {
        let filter = FilterExpr::parse("product_name begins_with 'cha'").unwrap();
        assert!(filter.matches(&row(json!({"product_name": "Chai"}))));
        assert!(!filter.matches(&row(json!({"product_name": "Tofu"}))));
    }

    #[test]
    fn test_display_round_trip() {
        let filter = FilterExpr::parse("a >= 3 AND b = 'x'").unwrap();
        let rendered = filter.to_string();
        let reparsed = FilterExpr::parse(&rendered).unwrap();
        assert_eq!(filter, reparsed);
    }
}
