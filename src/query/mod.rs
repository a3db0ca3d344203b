//! Structured query representation
//!
//! The generation gateway produces JSON; this module turns it into a typed
//! [`StructuredQuery`] (parse), and checks every referenced entity against
//! the retrieved schema context before anything reaches the backend
//! (validate). Both checks are pure functions over the candidate query.

mod filter;
mod parse;
mod validate;

pub use filter::*;
pub use parse::*;
pub use validate::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation kind supported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperation {
    /// Full table scan with optional client-side filter
    Scan,
    /// Key-condition lookup narrowed by the table's key attribute
    Query,
}

impl QueryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Query => "query",
        }
    }
}

/// A validated, backend-ready data request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub operation: QueryOperation,
    pub table_name: String,
    /// Equality condition on the table's key attribute (query operations only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_condition: Option<FilterExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterExpr>,
    /// Columns to project; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projection: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// The model's own explanation of the query, kept for diagnostics
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub explanation: String,
}

impl StructuredQuery {
    /// A bare scan over one table
    pub fn scan(table_name: impl Into<String>) -> Self {
        Self {
            operation: QueryOperation::Scan,
            table_name: table_name.into(),
            key_condition: None,
            filter: None,
            projection: Vec::new(),
            limit: None,
            explanation: String::new(),
        }
    }

    /// All column names the query references, for validation
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        if let Some(key) = &self.key_condition {
            fields.extend(key.fields());
        }
        if let Some(filter) = &self.filter {
            fields.extend(filter.fields());
        }
        fields.extend(self.projection.iter().map(|p| p.as_str()));
        fields
    }
}

impl fmt::Display for StructuredQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation.as_str(), self.table_name)?;
        if let Some(key) = &self.key_condition {
            write!(f, " key({})", key)?;
        }
        if let Some(filter) = &self.filter {
            if !filter.is_empty() {
                write!(f, " where {}", filter)?;
            }
        }
        if !self.projection.is_empty() {
            write!(f, " project({})", self.projection.join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {}", limit)?;
        }
        Ok(())
    }
}
