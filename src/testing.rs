//! Deterministic in-process stubs for unit tests

use crate::backend::{MemoryBackend, QueryBackend, QueryResult};
use crate::error::{Error, Result};
use crate::gateway::{EmbeddingGateway, GenerationConstraints, TextGenerationGateway};
use crate::query::StructuredQuery;
use crate::schema::SchemaDocument;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Embedder that derives a vector from the input text deterministically.
///
/// The first component is the text length, so different texts point in
/// different directions and cosine ranking is exercised for real.
pub struct StaticEmbedder {
    dimension: usize,
    fail_substring: Option<String>,
}

impl StaticEmbedder {
    pub fn by_length(dimension: usize) -> Self {
        Self {
            dimension,
            fail_substring: None,
        }
    }

    /// Fail any batch containing the substring. An empty substring fails
    /// every call.
    pub fn failing_on(mut self, substring: &str) -> Self {
        self.fail_substring = Some(substring.to_string());
        self
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        vector[0] = text.len() as f32;
        if self.dimension > 1 {
            vector[1] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingGateway for StaticEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if let Some(needle) = &self.fail_substring {
            if texts.iter().any(|t| t.contains(needle.as_str())) {
                return Err(Error::EmbeddingUnavailable(format!(
                    "stub refuses input containing '{}'",
                    needle
                )));
            }
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "static-embedder"
    }
}

/// Generator that plays back a fixed script of replies and failures
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replies(replies: Vec<String>) -> Self {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerationGateway for ScriptedGenerator {
    async fn generate(&self, _prompt: &str, _constraints: &GenerationConstraints) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .ok_or_else(|| Error::GenerationUnavailable("script exhausted".to_string()))?;
        step.map_err(Error::GenerationUnavailable)
    }

    fn model_name(&self) -> &str {
        "scripted-generator"
    }
}

/// Backend that fails the first N executions with scripted backend errors,
/// then delegates to the wrapped in-memory backend
pub struct FlakyBackend {
    inner: MemoryBackend,
    failures: Mutex<VecDeque<String>>,
}

impl FlakyBackend {
    pub fn new(inner: MemoryBackend, failures: Vec<String>) -> Self {
        Self {
            inner,
            failures: Mutex::new(failures.into()),
        }
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }
}

#[async_trait]
impl QueryBackend for FlakyBackend {
    async fn execute(&self, query: &StructuredQuery) -> Result<QueryResult> {
        let next = self
            .failures
            .lock()
            .expect("failure lock poisoned")
            .pop_front();
        match next {
            Some(message) => Err(Error::BackendExecution(message)),
            None => self.inner.execute(query).await,
        }
    }

    async fn describe_schema(&self) -> Result<Vec<SchemaDocument>> {
        self.inner.describe_schema().await
    }
}

/// Six customers, two transactions each; order values grow with the
/// customer index so rankings are unambiguous
pub fn sales_backend() -> MemoryBackend {
    let customers = [
        ("c1", "Alfreds Futterkiste", "Germany"),
        ("c2", "Bottom-Dollar Markets", "Canada"),
        ("c3", "Chop-suey Chinese", "Switzerland"),
        ("c4", "Du monde entier", "France"),
        ("c5", "Ernst Handel", "Austria"),
        ("c6", "Folk och fä HB", "Sweden"),
    ];

    let mut rows = Vec::new();
    for (i, (id, name, country)) in customers.iter().enumerate() {
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

    let mut tables = std::collections::BTreeMap::new();
    tables.insert("sales_transactions".to_string(), rows);
    MemoryBackend::new(tables)
}

/// A generated query that validates and executes against [`sales_backend`]
pub fn valid_query_json() -> String {
    r#"{"operation": "scan", "table_name": "sales_transactions",
        "explanation": "Scan the denormalized transactions for client-side aggregation"}"#
        .to_string()
}
