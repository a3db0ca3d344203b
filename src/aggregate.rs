//! Result aggregation over raw backend rows
//!
//! The backing store only filters and looks up; grouping, summation,
//! ranking, and top-N selection happen here, client-side, guided by the
//! deterministic intent extracted from the question. The operation
//! vocabulary is fixed: group_by, sum, avg, count, min, max, rank, top_n,
//! time_bucket. Anything outside it degrades to a raw-row preview with a
//! warning instead of failing the workflow.

use crate::intent::{AggregateFunction, AnalysisIntent, TimeBucket};
use crate::query::{numeric_value, Row};
use crate::schema::{ColumnType, SchemaDocument};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One record of the aggregated summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub dimension: String,
    pub metric: f64,
    /// Rows contributing to this record
    pub count: usize,
}

/// Derived, immutable aggregation output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub summary_table: Vec<SummaryRow>,
    /// Operations applied, e.g. `group_by:customer_id`, `sum:order_value`
    pub applied_operations: Vec<String>,
    /// Raw-row preview when no summary could be produced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preview_rows: Vec<Row>,
}

/// Aggregation outcome plus any degradation warnings
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub result: AggregatedResult,
    pub warnings: Vec<String>,
}

/// Knobs the orchestrator passes through from configuration
#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    /// Rows kept when degrading to a raw preview
    pub preview_rows: usize,
    /// N applied when the question ranks without an explicit number
    pub default_top_n: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            preview_rows: 10,
            default_top_n: 10,
        }
    }
}

/// Metric synonyms: question vocabulary -> preferred column names
fn metric_synonyms(token: &str) -> &'static [&'static str] {
    match token {
        "revenue" | "sales" | "spend" | "spent" => &["line_total", "order_value", "total"],
        "value" | "total" => &["order_value", "line_total"],
        "price" | "expensive" | "cheapest" | "cost" => &["unit_price", "price"],
        "freight" | "shipping" => &["freight"],
        "quantity" | "units" | "sold" => &["quantity"],
        "discount" => &["discount"],
        _ => &[],
    }
}

fn singularize(token: &str) -> &str {
    token.strip_suffix('s').unwrap_or(token)
}

fn name_parts(column: &str) -> impl Iterator<Item = &str> {
    column.split('_').filter(|p| !p.is_empty())
}

/// Token-overlap score between a question and a column name
fn match_score(column: &str, tokens: &[String]) -> usize {
    let mut score = 0;
    for token in tokens {
        let singular = singularize(token);
        if metric_synonyms(token).contains(&column) || metric_synonyms(singular).contains(&column)
        {
            score += 3;
        }
        if name_parts(column).any(|part| singularize(part) == singular) {
            score += 1;
        }
    }
    score
}

struct ColumnInfo {
    name: String,
    numeric: bool,
    timestamp: bool,
}

/// Columns actually present in the rows, typed from the schema context when
/// available and from the row values otherwise
fn available_columns(rows: &[Row], context: &[Arc<SchemaDocument>]) -> Vec<ColumnInfo> {
    let mut names: Vec<String> = Vec::new();
    for row in rows.iter().take(50) {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }

    names
        .into_iter()
        .map(|name| {
            let declared = context
                .iter()
                .find_map(|doc| doc.column(&name).map(|c| c.data_type));
            let numeric = match declared {
                Some(t) => t == ColumnType::Number,
                None => rows
                    .iter()
                    .take(50)
                    .filter_map(|r| r.get(&name))
                    .any(|v| !matches!(v, Value::Null) && numeric_value(v).is_some()),
            };
            let timestamp = declared == Some(ColumnType::Timestamp)
                || name.contains("date") || name.contains("time");
            ColumnInfo {
                name,
                numeric,
                timestamp,
            }
        })
        .collect()
}

fn best_column<'a>(
    columns: impl Iterator<Item = &'a ColumnInfo>,
    tokens: &[String],
    suffix_preference: &[&str],
) -> Option<String> {
    let mut best: Option<(usize, usize, &ColumnInfo)> = None;
    for info in columns {
        let score = match_score(&info.name, tokens);
        if score == 0 {
            continue;
        }
        // Lower rank is better; unknown suffixes sort last
        let rank = suffix_preference
            .iter()
            .position(|s| info.name.ends_with(s))
            .unwrap_or(suffix_preference.len());
        match &best {
            Some((best_score, best_rank, _))
                if *best_score > score || (*best_score == score && *best_rank <= rank) => {}
            _ => best = Some((score, rank, info)),
        }
    }
    best.map(|(_, _, info)| info.name.clone())
}

fn string_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(unknown)".to_string(),
        other => other.to_string(),
    }
}

fn bucket_label(value: &Value, bucket: TimeBucket) -> Option<String> {
    let text = value.as_str()?;
    let date = NaiveDate::parse_from_str(text.get(0..10)?, "%Y-%m-%d").ok()?;
    Some(match bucket {
        TimeBucket::Day => date.format("%Y-%m-%d").to_string(),
        TimeBucket::Month => date.format("%Y-%m").to_string(),
        TimeBucket::Year => date.format("%Y").to_string(),
    })
}

fn raw_preview(mut rows: Vec<Row>, limit: usize) -> Vec<Row> {
    rows.truncate(limit);
    rows
}

/// Apply the intent's aggregation to the raw row set.
pub fn aggregate(
    intent: &AnalysisIntent,
    context: &[Arc<SchemaDocument>],
    rows: Vec<Row>,
    options: AggregateOptions,
) -> Aggregation {
    let mut warnings = Vec::new();

    if rows.is_empty() {
        return Aggregation {
            result: AggregatedResult::default(),
            warnings,
        };
    }

    if !intent.wants_aggregation() {
        return Aggregation {
            result: AggregatedResult {
                summary_table: Vec::new(),
                applied_operations: Vec::new(),
                preview_rows: raw_preview(rows, options.preview_rows),
            },
            warnings,
        };
    }

    let columns = available_columns(&rows, context);
    let function = intent.function.unwrap_or({
        // A bare ranking ("top customers by order value") implies summation
        if intent.ranked {
            AggregateFunction::Sum
        } else {
            AggregateFunction::Count
        }
    });

    let metric = best_column(columns.iter().filter(|c| c.numeric), &intent.tokens, &[]);
    // A table's own key uniquely identifies rows; grouping by it is never
    // what the question means
    let key_attributes: std::collections::HashSet<&str> = context
        .iter()
        .filter_map(|doc| doc.key_attribute.as_deref())
        .collect();
    let dimension = best_column(
        columns.iter().filter(|c| {
            !c.numeric && !c.timestamp && !key_attributes.contains(c.name.as_str())
        }),
        &intent.tokens,
        &["_id", "_name"],
    );
    let time_column = intent
        .time_bucket
        .and_then(|_| columns.iter().find(|c| c.timestamp).map(|c| c.name.clone()));

    if function != AggregateFunction::Count && metric.is_none() {
        warnings.push(format!(
            "No numeric column matched the requested {} aggregation; returning raw rows",
            function.as_str()
        ));
        return Aggregation {
            result: AggregatedResult {
                summary_table: Vec::new(),
                applied_operations: Vec::new(),
                preview_rows: raw_preview(rows, options.preview_rows),
            },
            warnings,
        };
    }

    if intent.time_bucket.is_some() && time_column.is_none() {
        warnings.push(
            "No timestamp column available for the requested time bucketing; grouping without it"
                .to_string(),
        );
    }

    let mut operations = Vec::new();
    let limit = intent
        .top_n
        .or(if intent.ranked { Some(options.default_top_n) } else { None });

    // Grouping key: time bucket wins, then the matched dimension column
    let summary = if let (Some(bucket), Some(column)) = (intent.time_bucket, &time_column) {
        operations.push(format!("time_bucket:{}:{}", bucket.as_str(), column));
        group_rows(&rows, |row| {
            row.get(column).and_then(|v| bucket_label(v, bucket))
        }, &metric, function, &mut operations)
    } else if let Some(column) = &dimension {
        operations.push(format!("group_by:{}", column));
        group_rows(
            &rows,
            |row| row.get(column).map(string_label),
            &metric,
            function,
            &mut operations,
        )
    } else if function == AggregateFunction::Count {
        operations.push("count".to_string());
        vec![SummaryRow {
            dimension: "all rows".to_string(),
            metric: rows.len() as f64,
            count: rows.len(),
        }]
    } else if intent.ranked {
        // Per-row ranking: no grouping, sort individual rows by the metric
        let metric_column = metric.clone().expect("metric checked above");
        operations.push(format!(
            "rank:{}:{}",
            if intent.descending { "desc" } else { "asc" },
            metric_column
        ));
        let label_column = columns
            .iter()
            .find(|c| !c.numeric && c.name.ends_with("_name"))
            .or_else(|| columns.iter().find(|c| !c.numeric && !c.timestamp))
            .map(|c| c.name.clone());
        rows.iter()
            .filter_map(|row| {
                let value = numeric_value(row.get(&metric_column)?)?;
                let dimension = label_column
                    .as_ref()
                    .and_then(|l| row.get(l))
                    .map(string_label)
                    .unwrap_or_else(|| "(row)".to_string());
                Some(SummaryRow {
                    dimension,
                    metric: value,
                    count: 1,
                })
            })
            .collect()
    } else {
        // Single aggregate over the whole set
        let metric_column = metric.clone().expect("metric checked above");
        operations.push(format!("{}:{}", function.as_str(), metric_column));
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.get(&metric_column).and_then(numeric_value))
            .collect();
        vec![SummaryRow {
            dimension: metric_column,
            metric: fold_values(&values, function),
            count: values.len(),
        }]
    };

    let mut summary = summary;
    summary.sort_by(|a, b| {
        let ordering = a.metric.partial_cmp(&b.metric).unwrap_or(std::cmp::Ordering::Equal);
        if intent.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });

    if intent.ranked || limit.is_some() {
        operations.push(format!(
            "rank:{}",
            if intent.descending { "desc" } else { "asc" }
        ));
    }
    if let Some(n) = limit {
        operations.push(format!("top_n:{}", n));
        summary.truncate(n);
    }

    operations.dedup();
    debug!(
        "Aggregated {} rows into {} summary records ({})",
        rows.len(),
        summary.len(),
        operations.join(", ")
    );

    Aggregation {
        result: AggregatedResult {
            summary_table: summary,
            applied_operations: operations,
            preview_rows: Vec::new(),
        },
        warnings,
    }
}

fn group_rows(
    rows: &[Row],
    key: impl Fn(&Row) -> Option<String>,
    metric: &Option<String>,
    function: AggregateFunction,
    operations: &mut Vec<String>,
) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
    for row in rows {
        let Some(label) = key(row) else { continue };
        groups.entry(label).or_default().push(row);
    }

    match (&metric, function) {
        (Some(column), f) if f != AggregateFunction::Count => {
            operations.push(format!("{}:{}", f.as_str(), column));
        }
        _ => operations.push("count".to_string()),
    }

    groups
        .into_iter()
        .map(|(label, members)| {
            let count = members.len();
            let metric_value = match (&metric, function) {
                (_, AggregateFunction::Count) | (None, _) => count as f64,
                (Some(column), f) => {
                    let values: Vec<f64> = members
                        .iter()
                        .filter_map(|row| row.get(column).and_then(numeric_value))
                        .collect();
                    fold_values(&values, f)
                }
            };
            SummaryRow {
                dimension: label,
                metric: metric_value,
                count,
            }
        })
        .collect()
}

fn fold_values(values: &[f64], function: AggregateFunction) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    match function {
        AggregateFunction::Sum => values.iter().sum(),
        AggregateFunction::Avg => values.iter().sum::<f64>() / values.len() as f64,
        AggregateFunction::Count => values.len() as f64,
        AggregateFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::parse_intent;
    use crate::schema::{ColumnDescriptor, SchemaDocument};
    use serde_json::json;

    fn sales_context() -> Vec<Arc<SchemaDocument>> {
        let columns = vec![
            ("transaction_id", ColumnType::Text),
            ("customer_id", ColumnType::Text),
            ("customer_name", ColumnType::Text),
            ("customer_country", ColumnType::Text),
            ("product_name", ColumnType::Text),
            ("order_date", ColumnType::Timestamp),
            ("order_value", ColumnType::Number),
            ("unit_price", ColumnType::Number),
        ]
        .into_iter()
        .map(|(name, data_type)| ColumnDescriptor {
            name: name.to_string(),
            data_type,
            description: String::new(),
        })
        .collect();
        vec![Arc::new(
            SchemaDocument::new("sales_transactions", columns)
                .with_key_attribute("transaction_id"),
        )]
    }

    fn sales_rows() -> Vec<Row> {
        let customers = [
            ("c1", "Alfreds", "Germany"),
            ("c2", "Bottom-Dollar", "Canada"),
            ("c3", "Chop-suey", "Switzerland"),
            ("c4", "Du monde", "France"),
            ("c5", "Ernst Handel", "Austria"),
            ("c6", "Folk och fä", "Sweden"),
        ];
        let mut rows = Vec::new();
        for (i, (id, name, country)) in customers.iter().enumerate() {
            // Two transactions per customer; value grows with index so the
            // expected ranking is c6 > c5 > ... > c1
            for j in 0..2 {
                rows.push(
                    json!({
                        "transaction_id": format!("t{}-{}", i, j),
                        "customer_id": id,
                        "customer_name": name,
                        "customer_country": country,
                        "product_name": "Chai",
                        "order_date": format!("1997-0{}-15", (i % 6) + 1),
                        "order_value": ((i + 1) * 100 + j * 10) as f64,
                        "unit_price": 18.0
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                );
            }
        }
        rows
    }

    #[test]
    fn test_top_5_customers_by_order_value() {
        let intent = parse_intent("What are the top 5 customers by order value?");
        let aggregation = aggregate(
            &intent,
            &sales_context(),
            sales_rows(),
            AggregateOptions::default(),
        );

        let result = &aggregation.result;
        assert!(aggregation.warnings.is_empty());
        assert_eq!(result.summary_table.len(), 5);
        // Sorted by descending summed order value
        assert_eq!(result.summary_table[0].dimension, "c6");
        assert_eq!(result.summary_table[0].metric, 1210.0);
        for pair in result.summary_table.windows(2) {
            assert!(pair[0].metric >= pair[1].metric);
        }
        // Plan matches the fixed vocabulary
        assert!(result.applied_operations.contains(&"group_by:customer_id".to_string()));
        assert!(result.applied_operations.contains(&"sum:order_value".to_string()));
        assert!(result.applied_operations.contains(&"rank:desc".to_string()));
        assert!(result.applied_operations.contains(&"top_n:5".to_string()));
    }

    #[test]
    fn test_count_by_country() {
        let intent = parse_intent("How many transactions per country?");
        let aggregation = aggregate(
            &intent,
            &sales_context(),
            sales_rows(),
            AggregateOptions::default(),
        );

        let result = &aggregation.result;
        assert!(result.applied_operations.contains(&"group_by:customer_country".to_string()));
        assert!(result.applied_operations.contains(&"count".to_string()));
        assert!(result.summary_table.iter().all(|r| r.metric == 2.0));
    }

    #[test]
    fn test_monthly_revenue_time_bucket() {
        let intent = parse_intent("Show total revenue by month");
        let aggregation = aggregate(
            &intent,
            &sales_context(),
            sales_rows(),
            AggregateOptions::default(),
        );

        let result = &aggregation.result;
        assert!(result
            .applied_operations
            .iter()
            .any(|op| op == "time_bucket:month:order_date"));
        assert_eq!(result.summary_table.len(), 6);
        assert!(result.summary_table.iter().any(|r| r.dimension == "1997-01"));
    }

    #[test]
    fn test_unsupported_aggregation_degrades_to_preview() {
        let intent = parse_intent("What is the average sentiment?");
        let aggregation = aggregate(
            &intent,
            &sales_context(),
            sales_rows(),
            AggregateOptions {
                preview_rows: 3,
                default_top_n: 10,
            },
        );

        assert_eq!(aggregation.warnings.len(), 1);
        assert!(aggregation.result.summary_table.is_empty());
        assert_eq!(aggregation.result.preview_rows.len(), 3);
    }

    #[test]
    fn test_no_aggregation_returns_preview_without_warning() {
        let intent = parse_intent("List transactions shipped to Germany");
        let aggregation = aggregate(
            &intent,
            &sales_context(),
            sales_rows(),
            AggregateOptions::default(),
        );

        assert!(aggregation.warnings.is_empty());
        assert!(aggregation.result.applied_operations.is_empty());
        assert_eq!(aggregation.result.preview_rows.len(), 10);
    }

    #[test]
    fn test_rank_without_group_sorts_rows() {
        let intent = parse_intent("Which products are the most expensive?");
        let rows = vec![
            json!({"product_name": "Chai", "unit_price": 18.0}),
            json!({"product_name": "Mishi Kobe Niku", "unit_price": 97.0}),
            json!({"product_name": "Chang", "unit_price": 19.0}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();

        let aggregation = aggregate(
            &intent,
            &sales_context(),
            rows,
            AggregateOptions::default(),
        );

        let result = &aggregation.result;
        assert_eq!(result.summary_table[0].dimension, "Mishi Kobe Niku");
        assert_eq!(result.summary_table[0].metric, 97.0);
    }

    #[test]
    fn test_empty_rows_yield_empty_result() {
        let intent = parse_intent("top 5 customers by order value");
        let aggregation = aggregate(
            &intent,
            &sales_context(),
            Vec::new(),
            AggregateOptions::default(),
        );
        assert!(aggregation.result.summary_table.is_empty());
        assert!(aggregation.result.preview_rows.is_empty());
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let intent = parse_intent("top 3 customers by order value");
        let a = aggregate(&intent, &sales_context(), sales_rows(), AggregateOptions::default());
        let b = aggregate(&intent, &sales_context(), sales_rows(), AggregateOptions::default());
        assert_eq!(a.result.summary_table, b.result.summary_table);
        assert_eq!(a.result.applied_operations, b.result.applied_operations);
    }
}
