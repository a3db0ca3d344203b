//! Tables command implementation

use crate::backend::{MemoryBackend, QueryBackend};
use crate::error::Result;
use serde::Serialize;

/// One table of the backing store
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub key_attribute: Option<String>,
    pub description: String,
}

/// List the backend's tables with their inferred schemas
pub async fn cmd_tables(backend: &MemoryBackend) -> Result<Vec<TableInfo>> {
    let documents = backend.describe_schema().await?;

    Ok(documents
        .into_iter()
        .map(|doc| TableInfo {
            rows: backend.row_count(&doc.table_name).unwrap_or(0),
            columns: doc.columns.iter().map(|c| c.name.clone()).collect(),
            key_attribute: doc.key_attribute.clone(),
            description: doc.description.clone(),
            name: doc.table_name,
        })
        .collect())
}

/// Print table list to console
pub fn print_tables(tables: &[TableInfo]) {
    println!("\n📚 Available Tables\n");

    if tables.is_empty() {
        println!("No tables loaded. Check the 'dataset' path in config.toml.");
        return;
    }

    for table in tables {
        println!("• {} ({} rows)", table.name, table.rows);
        if !table.description.is_empty() {
            println!("  {}", table.description);
        }
        if let Some(key) = &table.key_attribute {
            println!("  Key: {}", key);
        }
        println!("  Columns: {}", table.columns.join(", "));
        println!();
    }
}
