//! Schema metadata types
//!
//! A [`SchemaDocument`] describes one table of the backing store: its
//! columns, relationship hints, and a business description. Documents are
//! produced by the backend adapter's schema description (or an external
//! bootstrapper), embedded once at index build, and immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// One column of a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: ColumnType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Coarse column type, inferred from row values when not declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Number,
    Boolean,
    Timestamp,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
        }
    }
}

/// Vectorized description of one table, owned by the schema index after build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub id: Uuid,
    pub table_name: String,
    /// Key attribute of the table, when the store has one (query operations
    /// may only key-filter on this column)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_attribute: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    /// Relationship hints, e.g. "orders.customer_id -> customers.customer_id"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl SchemaDocument {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        let table_name = table_name.into();
        Self {
            id: Uuid::new_v4(),
            description: table_description(&table_name)
                .unwrap_or("Business data table")
                .to_string(),
            table_name,
            key_attribute: None,
            columns,
            relationships: Vec::new(),
        }
    }

    pub fn with_key_attribute(mut self, key: impl Into<String>) -> Self {
        self.key_attribute = Some(key.into());
        self
    }

    pub fn with_relationships(mut self, relationships: Vec<String>) -> Self {
        self.relationships = relationships;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Render the document as the text that gets embedded and that is shown
    /// to the generation gateway as schema context.
    pub fn context_text(&self) -> String {
        let mut out = format!("Table: {}\n", self.table_name);
        if !self.description.is_empty() {
            out.push_str(&format!("Description: {}\n", self.description));
        }
        if let Some(key) = &self.key_attribute {
            out.push_str(&format!("Key attribute: {}\n", key));
        }
        out.push_str("Columns:\n");
        for column in &self.columns {
            if column.description.is_empty() {
                out.push_str(&format!("  - {} ({})\n", column.name, column.data_type.as_str()));
            } else {
                out.push_str(&format!(
                    "  - {} ({}): {}\n",
                    column.name,
                    column.data_type.as_str(),
                    column.description
                ));
            }
        }
        if !self.relationships.is_empty() {
            out.push_str("Relationships:\n");
            for rel in &self.relationships {
                out.push_str(&format!("  - {}\n", rel));
            }
        }
        out
    }

    /// Column names usable for validation and field resolution
    pub fn column_names(&self) -> HashSet<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Find a column by exact name
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Numeric columns, the candidates for metric aggregation
    pub fn numeric_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns
            .iter()
            .filter(|c| c.data_type == ColumnType::Number)
    }
}

/// Business descriptions for the well-known Northwind-derived tables
pub fn table_description(table_name: &str) -> Option<&'static str> {
    match table_name {
        "customers" => {
            Some("Customer information including company name, contact details, and location")
        }
        "products" => Some("Product catalog with names, prices, categories, and stock levels"),
        "orders" => {
            Some("Order information including dates, customer, employee, and shipping details")
        }
        "order_details" => {
            Some("Order line items with product, quantity, price, and discount information")
        }
        "categories" => Some("Product categories with names and descriptions"),
        "suppliers" => Some("Supplier information including company details and contacts"),
        "employees" => Some("Employee data including names, titles, and hire dates"),
        "shippers" => Some("Shipping company information"),
        "sales_transactions" => {
            Some("Denormalized sales transactions joining customer, product, order, and shipping data for single-table analytics")
        }
        _ => None,
    }
}
