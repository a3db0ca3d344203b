//! In-memory query backend over denormalized JSON tables
//!
//! Implements the scan/query semantics of the original document store:
//! `scan` walks the whole table applying the filter client-side, `query`
//! narrows by an equality condition on the table's key attribute first.
//! Projection and limit apply after filtering in both cases.

use super::{QueryBackend, QueryResult};
use crate::error::{Error, Result};
use crate::query::{QueryOperation, Row, StructuredQuery};
use crate::schema::{ColumnDescriptor, ColumnType, SchemaDocument};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Key attributes for the well-known tables of the demo dataset
fn key_attribute(table_name: &str) -> Option<&'static str> {
    match table_name {
        "customers" => Some("customer_id"),
        "products" => Some("product_id"),
        "orders" => Some("order_id"),
        "categories" => Some("category_id"),
        "suppliers" => Some("supplier_id"),
        "employees" => Some("employee_id"),
        "shippers" => Some("shipper_id"),
        "sales_transactions" => Some("transaction_id"),
        _ => None,
    }
}

/// In-memory table store
pub struct MemoryBackend {
    tables: BTreeMap<String, Vec<Row>>,
}

impl MemoryBackend {
    pub fn new(tables: BTreeMap<String, Vec<Row>>) -> Self {
        Self { tables }
    }

    /// Load tables from a JSON file of shape `{"table": [ {..row..}, ... ]}`
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let parsed: HashMap<String, Vec<Row>> = serde_json::from_str(content)?;
        let tables: BTreeMap<String, Vec<Row>> = parsed.into_iter().collect();
        debug!(
            "Loaded {} tables ({} rows total)",
            tables.len(),
            tables.values().map(Vec::len).sum::<usize>()
        );
        Ok(Self { tables })
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn row_count(&self, table_name: &str) -> Option<usize> {
        self.tables.get(table_name).map(Vec::len)
    }

    fn infer_column_type(values: impl Iterator<Item = Option<Value>>) -> ColumnType {
        for value in values.flatten() {
            match value {
                Value::Number(_) => return ColumnType::Number,
                Value::Bool(_) => return ColumnType::Boolean,
                Value::String(s) => {
                    if s.trim().parse::<f64>().is_ok() {
                        return ColumnType::Number;
                    }
                    // Dates in the dataset are ISO strings
                    if s.len() >= 10 && s.as_bytes().get(4) == Some(&b'-') {
                        return ColumnType::Timestamp;
                    }
                    return ColumnType::Text;
                }
                Value::Null => continue,
                _ => return ColumnType::Text,
            }
        }
        ColumnType::Text
    }

    fn describe_table(&self, table_name: &str, rows: &[Row]) -> SchemaDocument {
        // Column order follows the first row; later rows may add stragglers
        let mut names: Vec<String> = Vec::new();
        for row in rows.iter().take(50) {
            for key in row.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .iter()
            .map(|name| ColumnDescriptor {
                name: name.clone(),
                data_type: Self::infer_column_type(
                    rows.iter().take(50).map(|r| r.get(name).cloned()),
                ),
                description: String::new(),
            })
            .collect();

        let mut doc = SchemaDocument::new(table_name, columns);
        if let Some(key) = key_attribute(table_name) {
            doc = doc.with_key_attribute(key);
        }
        doc.with_relationships(self.relationship_hints(table_name, &names))
    }

    /// Foreign-key style hints: a `*_id` column shared with another table's
    /// key attribute is assumed to reference it
    fn relationship_hints(&self, table_name: &str, columns: &[String]) -> Vec<String> {
        let mut hints = Vec::new();
        for column in columns {
            if !column.ends_with("_id") {
                continue;
            }
            for other in self.tables.keys() {
                if other == table_name {
                    continue;
                }
                if key_attribute(other) == Some(column.as_str()) {
                    hints.push(format!("{}.{} -> {}.{}", table_name, column, other, column));
                }
            }
        }
        hints
    }
}

#[async_trait]
impl QueryBackend for MemoryBackend {
    async fn execute(&self, query: &StructuredQuery) -> Result<QueryResult> {
        let started = Instant::now();

        let rows = self.tables.get(&query.table_name).ok_or_else(|| {
            Error::BackendExecution(format!(
                "Requested resource not found: table '{}' does not exist",
                query.table_name
            ))
        })?;

        if query.operation == QueryOperation::Query {
            // Parse-time validation guarantees a key condition is present,
            // but the adapter enforces its own contract too
            let key = query.key_condition.as_ref().ok_or_else(|| {
                Error::BackendExecution(
                    "Query operation submitted without a key condition".to_string(),
                )
            })?;
            if let Some(expected) = key_attribute(&query.table_name) {
                if key.conditions.len() != 1 || key.conditions[0].field != expected {
                    return Err(Error::BackendExecution(format!(
                        "Query condition missed key schema element: {}",
                        expected
                    )));
                }
            }
        }

        let mut selected: Vec<Row> = rows
            .iter()
            .filter(|row| {
                query
                    .key_condition
                    .as_ref()
                    .map(|key| key.matches(row))
                    .unwrap_or(true)
                    && query
                        .filter
                        .as_ref()
                        .map(|filter| filter.matches(row))
                        .unwrap_or(true)
            })
            .cloned()
            .collect();

        if !query.projection.is_empty() {
            selected = selected
                .into_iter()
                .map(|row| {
                    query
                        .projection
                        .iter()
                        .filter_map(|col| row.get(col).map(|v| (col.clone(), v.clone())))
                        .collect()
                })
                .collect();
        }

        if let Some(limit) = query.limit {
            selected.truncate(limit);
        }

        debug!(
            "{} '{}' matched {} of {} rows",
            query.operation.as_str(),
            query.table_name,
            selected.len(),
            rows.len()
        );

        Ok(QueryResult::new(selected, started.elapsed()))
    }

    async fn describe_schema(&self) -> Result<Vec<SchemaDocument>> {
        Ok(self
            .tables
            .iter()
            .map(|(name, rows)| self.describe_table(name, rows))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterExpr;
    use serde_json::json;

    fn backend() -> MemoryBackend {
        MemoryBackend::from_json_str(
            r#"{
                "sales_transactions": [
                    {"transaction_id": "t1", "customer_name": "Alfreds", "customer_country": "Germany", "line_total": "120.5", "product_id": 11},
                    {"transaction_id": "t2", "customer_name": "Bottom-Dollar", "customer_country": "Canada", "line_total": "80.0", "product_id": 12},
                    {"transaction_id": "t3", "customer_name": "Alfreds", "customer_country": "Germany", "line_total": "30.25", "product_id": 12}
                ],
                "products": [
                    {"product_id": 11, "product_name": "Chai", "unit_price": 18.0},
                    {"product_id": 12, "product_name": "Chang", "unit_price": 19.0}
                ]
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_scan_with_filter_and_projection() {
        let backend = backend();
        let mut query = StructuredQuery::scan("sales_transactions");
        query.filter = Some(FilterExpr::parse("customer_country = 'Germany'").unwrap());
        query.projection = vec!["customer_name".to_string(), "line_total".to_string()];

        let result = backend.execute(&query).await.unwrap();

        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[0].len(), 2);
        assert_eq!(result.rows[0]["customer_name"], json!("Alfreds"));
    }

    #[tokio::test]
    async fn test_scan_limit() {
        let backend = backend();
        let mut query = StructuredQuery::scan("sales_transactions");
        query.limit = Some(1);

        let result = backend.execute(&query).await.unwrap();
        assert_eq!(result.row_count, 1);
    }

    #[tokio::test]
    async fn test_query_by_key() {
        let backend = backend();
        let mut query = StructuredQuery::scan("sales_transactions");
        query.operation = QueryOperation::Query;
        query.key_condition = Some(FilterExpr::parse("transaction_id = 't2'").unwrap());

        let result = backend.execute(&query).await.unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0]["customer_name"], json!("Bottom-Dollar"));
    }

    #[tokio::test]
    async fn test_query_on_non_key_is_backend_error() {
        let backend = backend();
        let mut query = StructuredQuery::scan("sales_transactions");
        query.operation = QueryOperation::Query;
        query.key_condition = Some(FilterExpr::parse("customer_name = 'Alfreds'").unwrap());

        let err = backend.execute(&query).await.unwrap_err();
        assert!(matches!(err, Error::BackendExecution(_)));
        assert!(err.to_string().contains("key schema"));
    }

    #[tokio::test]
    async fn test_unknown_table_is_backend_error() {
        let backend = backend();
        let query = StructuredQuery::scan("invoices");

        let err = backend.execute(&query).await.unwrap_err();
        assert!(matches!(err, Error::BackendExecution(_)));
        assert!(err.to_string().contains("invoices"));
    }

    #[tokio::test]
    async fn test_describe_schema_infers_types_and_keys() {
        let backend = backend();
        let docs = backend.describe_schema().await.unwrap();

        let sales = docs
            .iter()
            .find(|d| d.table_name == "sales_transactions")
            .unwrap();
        assert_eq!(sales.key_attribute.as_deref(), Some("transaction_id"));
        // Numeric strings are recognized as numbers (decimal serialization)
        assert_eq!(
            sales.column("line_total").unwrap().data_type,
            ColumnType::Number
        );
        assert_eq!(
            sales.column("customer_name").unwrap().data_type,
            ColumnType::Text
        );
        // product_id appears in both tables and products is keyed on it
        assert!(sales
            .relationships
            .iter()
            .any(|r| r.contains("products.product_id")));
    }
}
