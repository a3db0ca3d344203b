//! Query backend adapter
//!
//! Uniform interface over the backing analytical store: execute a
//! structured query, describe the available schema. The engine never talks
//! to a store except through this trait.

mod memory;

pub use memory::*;

use crate::error::Result;
use crate::query::{Row, StructuredQuery};
use crate::schema::SchemaDocument;
use async_trait::async_trait;
use std::time::Duration;

/// Raw rows returned by the store for one query
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub execution_time: Duration,
}

impl QueryResult {
    pub fn new(rows: Vec<Row>, execution_time: Duration) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            execution_time,
        }
    }
}

/// Adapter over the backing data store
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Execute a validated query; failures carry the backend-native message
    async fn execute(&self, query: &StructuredQuery) -> Result<QueryResult>;

    /// Describe the store's tables as schema documents (used by the index
    /// bootstrapper, not by the per-question workflow)
    async fn describe_schema(&self) -> Result<Vec<SchemaDocument>>;
}
