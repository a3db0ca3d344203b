//! Parsing generation-gateway output into a [`StructuredQuery`]

use super::{FilterExpr, QueryOperation, StructuredQuery};
use crate::error::{Error, Result};
use serde::Deserialize;

/// The JSON contract the synthesis prompt asks the model to emit
#[derive(Debug, Deserialize)]
struct RawQuery {
    operation: String,
    table_name: String,
    #[serde(default)]
    key_condition: Option<String>,
    #[serde(default)]
    filter_expression: Option<String>,
    #[serde(default)]
    projection_expression: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Strip Markdown code fences the model may wrap its JSON in
pub fn strip_code_fences(response: &str) -> &str {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse a gateway response into a structured query.
///
/// Any failure here is a malformed-query error: the response was not the
/// JSON contract, named an unknown operation, or carried an expression the
/// filter grammar rejects.
pub fn parse_response(response: &str) -> Result<StructuredQuery> {
    let text = strip_code_fences(response);

    let raw: RawQuery = serde_json::from_str(text).map_err(|e| {
        Error::MalformedQuery(format!("Response is not a valid query JSON object: {}", e))
    })?;

    let operation = match raw.operation.to_ascii_lowercase().as_str() {
        "scan" => QueryOperation::Scan,
        "query" => QueryOperation::Query,
        other => {
            return Err(Error::MalformedQuery(format!(
                "Unsupported operation '{}'; expected 'scan' or 'query'",
                other
            )))
        }
    };

    if raw.table_name.trim().is_empty() {
        return Err(Error::MalformedQuery("Query names no table".to_string()));
    }

    let key_condition = match raw.key_condition.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(text) => Some(FilterExpr::parse(text)?),
    };

    if operation == QueryOperation::Query && key_condition.is_none() {
        return Err(Error::MalformedQuery(
            "Operation 'query' requires a key_condition".to_string(),
        ));
    }

    let filter = match raw.filter_expression.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(text) => Some(FilterExpr::parse(text)?),
    };

    let projection = raw
        .projection_expression
        .unwrap_or_default()
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    Ok(StructuredQuery {
        operation,
        table_name: raw.table_name.trim().to_string(),
        key_condition,
        filter,
        projection,
        limit: raw.limit,
        explanation: raw.explanation.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let query = parse_response(
            r#"{"operation": "scan", "table_name": "sales_transactions",
                "filter_expression": "customer_country = 'Germany'",
                "projection_expression": "customer_name, line_total",
                "limit": 100,
                "explanation": "German sales"}"#,
        )
        .unwrap();

        assert_eq!(query.operation, QueryOperation::Scan);
        assert_eq!(query.table_name, "sales_transactions");
        assert_eq!(query.projection, vec!["customer_name", "line_total"]);
        assert_eq!(query.limit, Some(100));
    }

    #[test]
    fn test_parse_fenced_json() {
        let response = "```json\n{\"operation\": \"scan\", \"table_name\": \"orders\"}\n```";
        let query = parse_response(response).unwrap();
        assert_eq!(query.table_name, "orders");
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_response("I think you should scan the orders table.").unwrap_err();
        assert!(matches!(err, Error::MalformedQuery(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_operation() {
        let err = parse_response(r#"{"operation": "join", "table_name": "orders"}"#).unwrap_err();
        assert!(err.to_string().contains("join"));
    }

    #[test]
    fn test_parse_rejects_query_without_key_condition() {
        let err =
            parse_response(r#"{"operation": "query", "table_name": "orders"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedQuery(_)));
    }

    #[test]
    fn test_parse_rejects_bad_filter_grammar() {
        let err = parse_response(
            r#"{"operation": "scan", "table_name": "orders",
                "filter_expression": "this is not a filter"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedQuery(_)));
    }

    #[test]
    fn test_strip_code_fences_variants() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {} "), "{}");
    }
}
