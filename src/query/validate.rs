//! Pre-execution validation of candidate queries

use super::{CompareOp, QueryOperation, StructuredQuery};
use crate::error::{Error, Result};
use crate::schema::SchemaDocument;
use std::collections::HashSet;
use std::sync::Arc;

/// Entities known to the engine beyond the per-question schema context.
///
/// Built from the full index at workflow start; keeps validation from
/// rejecting references that are real but fell outside the top-k retrieval.
#[derive(Debug, Default, Clone)]
pub struct EntityWhitelist {
    pub tables: HashSet<String>,
    pub columns: HashSet<String>,
}

impl EntityWhitelist {
    pub fn from_documents<'a>(documents: impl Iterator<Item = &'a Arc<SchemaDocument>>) -> Self {
        let mut tables = HashSet::new();
        let mut columns = HashSet::new();
        for doc in documents {
            tables.insert(doc.table_name.clone());
            for column in &doc.columns {
                columns.insert(column.name.clone());
            }
        }
        Self { tables, columns }
    }
}

/// Validate a candidate query against the retrieved schema context.
///
/// Every referenced table and column must appear in the context or the
/// whitelist (schema-mismatch otherwise); a query operation must key on the
/// table's declared key attribute with equality only (malformed otherwise).
pub fn validate_query(
    query: &StructuredQuery,
    context: &[Arc<SchemaDocument>],
    whitelist: &EntityWhitelist,
) -> Result<()> {
    let context_doc = context.iter().find(|d| d.table_name == query.table_name);

    if context_doc.is_none() && !whitelist.tables.contains(&query.table_name) {
        return Err(Error::SchemaMismatch(format!(
            "Query references unknown table '{}'",
            query.table_name
        )));
    }

    let table_columns: Option<HashSet<&str>> = context_doc.map(|d| d.column_names());
    let mut unknown: Vec<&str> = Vec::new();
    for column in query.referenced_columns() {
        let known_in_table = table_columns
            .as_ref()
            .map(|cols| cols.contains(column))
            .unwrap_or(false);
        if !known_in_table && !whitelist.columns.contains(column) {
            unknown.push(column);
        }
    }
    if !unknown.is_empty() {
        unknown.sort();
        unknown.dedup();
        return Err(Error::SchemaMismatch(format!(
            "Query references unknown column(s): {} (table '{}')",
            unknown.join(", "),
            query.table_name
        )));
    }

    if query.operation == QueryOperation::Query {
        let key = query.key_condition.as_ref().ok_or_else(|| {
            Error::MalformedQuery("Operation 'query' requires a key_condition".to_string())
        })?;

        if key.conditions.len() != 1 || key.conditions[0].op != CompareOp::Eq {
            return Err(Error::MalformedQuery(
                "key_condition must be a single equality comparison".to_string(),
            ));
        }

        if let Some(doc) = context_doc {
            if let Some(key_attribute) = &doc.key_attribute {
                if &key.conditions[0].field != key_attribute {
                    return Err(Error::SchemaMismatch(format!(
                        "key_condition targets '{}' but table '{}' is keyed on '{}'",
                        key.conditions[0].field, query.table_name, key_attribute
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterExpr;
    use crate::schema::{ColumnDescriptor, ColumnType};

    fn context() -> Vec<Arc<SchemaDocument>> {
        let columns = |names: &[&str]| {
            names
                .iter()
                .map(|n| ColumnDescriptor {
                    name: n.to_string(),
                    data_type: ColumnType::Text,
                    description: String::new(),
                })
                .collect()
        };
        vec![
            Arc::new(
                SchemaDocument::new("customers", columns(&["customer_id", "customer_name"]))
                    .with_key_attribute("customer_id"),
            ),
            Arc::new(SchemaDocument::new(
                "orders",
                columns(&["order_id", "customer_id", "order_value"]),
            )),
        ]
    }

    #[test]
    fn test_valid_scan_passes() {
        let mut query = StructuredQuery::scan("orders");
        query.filter = Some(FilterExpr::parse("order_value > 100").unwrap());
        query.projection = vec!["customer_id".to_string()];

        assert!(validate_query(&query, &context(), &EntityWhitelist::default()).is_ok());
    }

    #[test]
    fn test_unknown_table_rejected() {
        let query = StructuredQuery::scan("invoices");
        let err = validate_query(&query, &context(), &EntityWhitelist::default()).unwrap_err();

        assert!(matches!(err, Error::SchemaMismatch(_)));
        assert!(err.to_string().contains("invoices"));
    }

    #[test]
    fn test_unknown_column_rejected_with_name() {
        let mut query = StructuredQuery::scan("orders");
        query.filter = Some(FilterExpr::parse("total_discount_pct > 0.1").unwrap());

        let err = validate_query(&query, &context(), &EntityWhitelist::default()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
        assert!(err.to_string().contains("total_discount_pct"));
    }

    #[test]
    fn test_whitelist_rescues_out_of_context_table() {
        let query = StructuredQuery::scan("shippers");
        let mut whitelist = EntityWhitelist::default();
        whitelist.tables.insert("shippers".to_string());

        assert!(validate_query(&query, &context(), &whitelist).is_ok());
    }

    #[test]
    fn test_query_operation_requires_equality_on_key() {
        let mut query = StructuredQuery::scan("customers");
        query.operation = QueryOperation::Query;
        query.key_condition = Some(FilterExpr::parse("customer_id > 'A'").unwrap());

        let err = validate_query(&query, &context(), &EntityWhitelist::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedQuery(_)));
    }

    #[test]
    fn test_query_operation_wrong_key_attribute() {
        let mut query = StructuredQuery::scan("customers");
        query.operation = QueryOperation::Query;
        query.key_condition = Some(FilterExpr::parse("customer_name = 'ACME'").unwrap());

        let err = validate_query(&query, &context(), &EntityWhitelist::default()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
        assert!(err.to_string().contains("customer_id"));
    }
}
