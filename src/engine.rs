//! Public engine surface
//!
//! An [`Engine`] owns the gateways, the backend adapter, and the shared
//! schema index, and runs one workflow per submitted question. This is the
//! whole contract the UI layer depends on.

use crate::backend::QueryBackend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gateway::{EmbeddingGateway, GenerationConstraints, TextGenerationGateway};
use crate::index::{SchemaIndex, SharedIndex};
use crate::workflow::{AnalysisResult, CancelToken, Workflow, WorkflowOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::info;
use uuid::Uuid;

/// Per-question overrides; unset fields fall back to configuration
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub max_attempts: Option<u32>,
    pub top_k_schema: Option<usize>,
    pub timeout_ms: Option<u64>,
}

/// The natural-language analytics engine
pub struct Engine {
    embedding: Arc<dyn EmbeddingGateway>,
    generation: Arc<dyn TextGenerationGateway>,
    backend: Arc<dyn QueryBackend>,
    index: SharedIndex,
    constraints: GenerationConstraints,
    defaults: WorkflowOptions,
    embed_batch_size: usize,
    /// Bounds concurrent in-flight workflows
    permits: Semaphore,
}

impl Engine {
    pub fn new(
        config: &Config,
        embedding: Arc<dyn EmbeddingGateway>,
        generation: Arc<dyn TextGenerationGateway>,
        backend: Arc<dyn QueryBackend>,
    ) -> Self {
        let dimension = embedding.dimension();
        Self {
            embedding,
            generation,
            backend,
            index: SharedIndex::empty(dimension),
            constraints: GenerationConstraints::from(&config.generation),
            defaults: WorkflowOptions::from(config),
            embed_batch_size: config.embedding.batch_size,
            permits: Semaphore::new(config.workflow.max_concurrency),
        }
    }

    /// Build the schema index from the backend's description and install it
    /// atomically. A full replace: in-flight workflows finish against the
    /// handle they captured. Returns per-document warnings.
    pub async fn build_index(&self) -> Result<Vec<String>> {
        let documents = self.backend.describe_schema().await?;
        let total = documents.len();
        let build =
            SchemaIndex::build(self.embedding.as_ref(), documents, self.embed_batch_size).await?;
        info!(
            "Installed schema index with {} of {} document(s)",
            build.index.len(),
            total
        );
        self.index.install(build.index);
        Ok(build.warnings)
    }

    /// Snapshot of the current index handle
    pub fn index(&self) -> Arc<SchemaIndex> {
        self.index.load()
    }

    /// Answer one question. Creates an independent workflow instance; no
    /// state is shared between concurrent calls beyond the index snapshot.
    pub async fn submit_question(
        &self,
        question: &str,
        conversation_id: Option<Uuid>,
        options: Option<AskOptions>,
    ) -> Result<AnalysisResult> {
        self.submit_with_cancel(question, conversation_id, options, &CancelToken::new())
            .await
    }

    /// Like [`Engine::submit_question`] but cancellable; cancellation is
    /// observed at stage transitions.
    pub async fn submit_with_cancel(
        &self,
        question: &str,
        conversation_id: Option<Uuid>,
        options: Option<AskOptions>,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::Other("Question is empty".to_string()));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Other("Engine is shutting down".to_string()))?;

        let options = self.resolve_options(options.unwrap_or_default());
        let workflow = Workflow {
            embedding: self.embedding.as_ref(),
            generation: self.generation.as_ref(),
            backend: self.backend.as_ref(),
            index: self.index.load(),
            constraints: self.constraints.clone(),
            options,
        };

        workflow.run(question, conversation_id, cancel).await
    }

    fn resolve_options(&self, ask: AskOptions) -> WorkflowOptions {
        let mut options = self.defaults.clone();
        if let Some(max_attempts) = ask.max_attempts {
            options.max_attempts = max_attempts.max(1);
        }
        if let Some(top_k) = ask.top_k_schema {
            options.top_k_schema = top_k;
        }
        if let Some(timeout_ms) = ask.timeout_ms {
            options.timeout = Duration::from_millis(timeout_ms);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sales_backend, valid_query_json, ScriptedGenerator, StaticEmbedder};

    fn engine(generator: ScriptedGenerator) -> Engine {
        let mut config = Config::default();
        config.embedding.dimension = 4;
        Engine::new(
            &config,
            Arc::new(StaticEmbedder::by_length(4)),
            Arc::new(generator),
            Arc::new(sales_backend()),
        )
    }

    #[tokio::test]
    async fn test_submit_question_end_to_end() {
        let engine = engine(ScriptedGenerator::replies(vec![
            valid_query_json(),
            "Customers ranked by total order value.".to_string(),
        ]));
        let warnings = engine.build_index().await.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(engine.index().len(), 1);

        let result = engine
            .submit_question("What are the top 5 customers by order value?", None, None)
            .await
            .unwrap();

        assert_eq!(result.aggregated.summary_table.len(), 5);
        assert_eq!(result.attempts, 1);
        assert!(result.narrative.is_some());
    }

    #[tokio::test]
    async fn test_ask_options_cap_attempts() {
        let bad = r#"{"operation": "scan", "table_name": "unknown_table"}"#;
        let engine = engine(ScriptedGenerator::replies(vec![
            bad.to_string(),
            bad.to_string(),
            bad.to_string(),
        ]));
        engine.build_index().await.unwrap();

        let err = engine
            .submit_question(
                "anything",
                None,
                Some(AskOptions {
                    max_attempts: Some(2),
                    ..AskOptions::default()
                }),
            )
            .await
            .unwrap_err();

        match err {
            Error::GenerationExhausted { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected GenerationExhausted, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let engine = engine(ScriptedGenerator::replies(vec![]));
        let err = engine.submit_question("   ", None, None).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_conversation_id_round_trips() {
        let engine = engine(ScriptedGenerator::replies(vec![
            valid_query_json(),
            "narrative".to_string(),
        ]));
        engine.build_index().await.unwrap();

        let id = Uuid::new_v4();
        let result = engine
            .submit_question("top customers by order value", Some(id), None)
            .await
            .unwrap();
        assert_eq!(result.conversation_id, id);
    }
}
