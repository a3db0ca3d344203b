//! In-process schema index
//!
//! Holds the embedded schema documents and serves nearest-neighbor lookups
//! by cosine similarity. The index is built once (or rebuilt wholesale) and
//! read-only afterwards; concurrent workflows read it without
//! synchronization. [`SharedIndex`] holds the current handle and swaps it
//! atomically on rebuild, so in-flight workflows keep the snapshot they
//! captured at start.

use crate::error::{Error, Result};
use crate::gateway::EmbeddingGateway;
use crate::schema::SchemaDocument;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// A schema document paired with its relevance to a query vector
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Arc<SchemaDocument>,
    pub score: f32,
}

#[derive(Debug)]
struct IndexEntry {
    document: Arc<SchemaDocument>,
    /// Unit-normalized embedding of the document's context text
    vector: Vec<f32>,
}

/// Read-only vector index over schema documents
#[derive(Debug)]
pub struct SchemaIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
}

/// Outcome of an index build: the handle plus per-document warnings
#[derive(Debug)]
pub struct IndexBuild {
    pub index: Arc<SchemaIndex>,
    pub warnings: Vec<String>,
}

pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Cosine similarity between two raw vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl SchemaIndex {
    /// An empty index; retrieval against it returns no documents
    pub fn empty(dimension: usize) -> Self {
        Self {
            entries: Vec::new(),
            dimension,
        }
    }

    /// Embed each document's context text and build the index.
    ///
    /// Documents whose embeddings cannot be computed are excluded with a
    /// warning. The build fails only when a non-empty document set produces
    /// an empty index, which means the gateway rejected everything.
    pub async fn build(
        gateway: &dyn EmbeddingGateway,
        documents: Vec<SchemaDocument>,
        batch_size: usize,
    ) -> Result<IndexBuild> {
        let total = documents.len();
        let mut entries = Vec::with_capacity(total);
        let mut warnings = Vec::new();

        for batch in documents.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|d| d.context_text()).collect();
            match gateway.embed(texts).await {
                Ok(vectors) => {
                    for (doc, vector) in batch.iter().zip(vectors) {
                        entries.push(IndexEntry {
                            document: Arc::new(doc.clone()),
                            vector: normalize(&vector),
                        });
                    }
                }
                // Batch failed; retry one document at a time so a single bad
                // document doesn't take its whole batch down with it.
                Err(batch_err) => {
                    debug!("Batch embedding failed ({}), retrying per document", batch_err);
                    for doc in batch {
                        match gateway.embed(vec![doc.context_text()]).await {
                            Ok(mut vectors) if !vectors.is_empty() => {
                                entries.push(IndexEntry {
                                    document: Arc::new(doc.clone()),
                                    vector: normalize(&vectors.remove(0)),
                                });
                            }
                            Ok(_) => {
                                warnings.push(format!(
                                    "Schema document '{}' excluded from index: gateway returned no vector",
                                    doc.table_name
                                ));
                            }
                            Err(e) => {
                                warnings.push(format!(
                                    "Schema document '{}' excluded from index: {}",
                                    doc.table_name, e
                                ));
                            }
                        }
                    }
                }
            }
        }

        if entries.is_empty() && total > 0 {
            return Err(Error::IndexBuild(format!(
                "No schema documents could be embedded ({} attempted)",
                total
            )));
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        debug!("Built schema index with {} of {} documents", entries.len(), total);

        Ok(IndexBuild {
            index: Arc::new(SchemaIndex {
                entries,
                dimension: gateway.dimension(),
            }),
            warnings,
        })
    }

    /// Top-k documents by cosine similarity, most relevant first.
    ///
    /// Returns an empty vector (never an error) when the index is empty.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<ScoredDocument> {
        if self.entries.is_empty() || k == 0 {
            return Vec::new();
        }

        let query = normalize(vector);
        let mut scored: Vec<ScoredDocument> = self
            .entries
            .iter()
            .map(|entry| ScoredDocument {
                document: Arc::clone(&entry.document),
                // Both sides are unit vectors, so the dot product is the cosine
                score: entry.vector.iter().zip(&query).map(|(a, b)| a * b).sum(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// All indexed documents, in build order
    pub fn documents(&self) -> impl Iterator<Item = &Arc<SchemaDocument>> {
        self.entries.iter().map(|e| &e.document)
    }
}

/// Shared handle to the current index.
///
/// Readers snapshot the `Arc` once per workflow; `install` replaces the
/// handle without touching snapshots already taken.
pub struct SharedIndex {
    current: RwLock<Arc<SchemaIndex>>,
}

impl SharedIndex {
    pub fn new(index: Arc<SchemaIndex>) -> Self {
        Self {
            current: RwLock::new(index),
        }
    }

    pub fn empty(dimension: usize) -> Self {
        Self::new(Arc::new(SchemaIndex::empty(dimension)))
    }

    /// Snapshot the current handle
    pub fn load(&self) -> Arc<SchemaIndex> {
        Arc::clone(&self.current.read().expect("index lock poisoned"))
    }

    /// Replace the current handle; in-flight snapshots are unaffected
    pub fn install(&self, index: Arc<SchemaIndex>) {
        *self.current.write().expect("index lock poisoned") = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, ColumnType};
    use crate::testing::StaticEmbedder;

    fn doc(table: &str) -> SchemaDocument {
        SchemaDocument::new(
            table,
            vec![ColumnDescriptor {
                name: "id".to_string(),
                data_type: ColumnType::Text,
                description: String::new(),
            }],
        )
    }

    async fn build_index(tables: &[&str]) -> Arc<SchemaIndex> {
        let gateway = StaticEmbedder::by_length(4);
        let docs = tables.iter().map(|t| doc(t)).collect();
        SchemaIndex::build(&gateway, docs, 8).await.unwrap().index
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let gateway = StaticEmbedder::by_length(4);
        // Longer table names produce larger first components under the
        // length embedder, so similarity to a long query vector differs.
        let index = build_index(&["orders", "order_details_extended", "c"]).await;

        let query = gateway.vector_for("order_details_extended-ish text length");
        let results = index.query(&query, 3);

        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_query_respects_k() {
        let index = build_index(&["a", "b", "c", "d"]).await;
        assert_eq!(index.query(&[1.0, 0.0, 0.0, 0.0], 2).len(), 2);
        assert_eq!(index.query(&[1.0, 0.0, 0.0, 0.0], 0).len(), 0);
        // k larger than the index returns everything
        assert_eq!(index.query(&[1.0, 0.0, 0.0, 0.0], 100).len(), 4);
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let index = SchemaIndex::empty(4);
        assert!(index.query(&[1.0, 0.0, 0.0, 0.0], 5).is_empty());
    }

    #[tokio::test]
    async fn test_build_excludes_failing_documents() {
        let gateway = StaticEmbedder::by_length(4).failing_on("poison");
        let docs = vec![doc("orders"), doc("poison"), doc("customers")];

        let build = SchemaIndex::build(&gateway, docs, 8).await.unwrap();

        assert_eq!(build.index.len(), 2);
        assert_eq!(build.warnings.len(), 1);
        assert!(build.warnings[0].contains("poison"));
    }

    #[tokio::test]
    async fn test_build_fails_when_nothing_embeds() {
        let gateway = StaticEmbedder::by_length(4).failing_on("");
        let err = SchemaIndex::build(&gateway, vec![doc("orders")], 8)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IndexBuild(_)));
    }

    #[tokio::test]
    async fn test_shared_index_swap_preserves_snapshots() {
        let first = build_index(&["orders"]).await;
        let shared = SharedIndex::new(Arc::clone(&first));

        let snapshot = shared.load();
        let second = build_index(&["orders", "customers"]).await;
        shared.install(second);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(shared.load().len(), 2);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
