//! Workflow orchestration
//!
//! Drives one question through the staged pipeline: retrieve schema
//! context, synthesize and validate a query (with error-guided
//! regeneration), execute it, aggregate the rows, and narrate the result.
//! Retrieval and narration degrade with warnings; synthesis, validation,
//! and execution share one bounded attempt budget and fail the workflow
//! when it is exhausted.

mod state;

pub use state::*;

use crate::aggregate::{aggregate, AggregateOptions, AggregatedResult};
use crate::backend::QueryBackend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gateway::{EmbeddingGateway, GenerationConstraints, TextGenerationGateway};
use crate::index::SchemaIndex;
use crate::insight::compose_narrative;
use crate::intent::parse_intent;
use crate::query::{parse_response, validate_query, EntityWhitelist, StructuredQuery};
use crate::schema::SchemaDocument;
use crate::synthesis::{synthesis_prompt, PriorFailure};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Final output returned to the caller; immutable after construction
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub conversation_id: Uuid,
    pub question: String,
    /// None when narration degraded; the structured result still stands
    pub narrative: Option<String>,
    pub aggregated: AggregatedResult,
    pub generated_query: StructuredQuery,
    /// Rows the backend returned before aggregation
    pub raw_row_count: usize,
    /// Backend execution time for the final query
    pub execution_time_ms: u64,
    /// Wall time for the whole workflow
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub warnings: Vec<String>,
}

/// Per-run knobs, defaulted from configuration
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub max_attempts: u32,
    pub top_k_schema: usize,
    /// Per-call budget for gateway and backend operations
    pub timeout: Duration,
    pub aggregate: AggregateOptions,
}

impl From<&Config> for WorkflowOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.workflow.max_attempts,
            top_k_schema: config.workflow.top_k_schema,
            timeout: Duration::from_millis(config.workflow.timeout_ms),
            aggregate: AggregateOptions {
                preview_rows: config.workflow.raw_row_preview,
                default_top_n: crate::config::default_top_n(),
            },
        }
    }
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// One workflow run over a captured index snapshot
pub struct Workflow<'a> {
    pub embedding: &'a dyn EmbeddingGateway,
    pub generation: &'a dyn TextGenerationGateway,
    pub backend: &'a dyn QueryBackend,
    pub index: Arc<SchemaIndex>,
    pub constraints: GenerationConstraints,
    pub options: WorkflowOptions,
}

impl Workflow<'_> {
    /// Execute the full pipeline for one question.
    pub async fn run(
        &self,
        question: &str,
        conversation_id: Option<Uuid>,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult> {
        let mut ctx = WorkflowContext::new(question, conversation_id);
        info!(conversation_id = %ctx.conversation_id, "Processing question: {}", question);

        // Everything this run sees comes from the snapshot captured here;
        // concurrent index rebuilds cannot affect it
        let whitelist = EntityWhitelist::from_documents(self.index.documents());
        let intent = parse_intent(question);

        self.transition(&mut ctx, WorkflowState::Retrieving, cancel)?;
        self.retrieve_context(&mut ctx).await;
        let context_docs: Vec<Arc<SchemaDocument>> = ctx
            .retrieved
            .iter()
            .map(|scored| Arc::clone(&scored.document))
            .collect();

        let (query, execution) = self
            .synthesize_and_execute(&mut ctx, &context_docs, &whitelist, cancel)
            .await?;

        self.transition(&mut ctx, WorkflowState::Aggregating, cancel)?;
        let aggregation = aggregate(&intent, &context_docs, execution.rows, self.options.aggregate);
        for warning in aggregation.warnings {
            ctx.warn(warning);
        }

        self.transition(&mut ctx, WorkflowState::Narrating, cancel)?;
        let narrated = self
            .with_timeout(
                compose_narrative(
                    self.generation,
                    &self.constraints,
                    &ctx.question,
                    &query,
                    &aggregation.result,
                ),
                || Error::NarrationUnavailable("Narration timed out".to_string()),
            )
            .await;
        let narrative = match narrated {
            Ok(text) => Some(text),
            Err(e) => {
                ctx.record_failure(WorkflowState::Narrating, &e);
                ctx.warn(format!("Narrative unavailable: {}", e));
                None
            }
        };

        self.transition(&mut ctx, WorkflowState::Completed, cancel)?;
        info!(
            conversation_id = %ctx.conversation_id,
            attempts = ctx.attempts,
            "Workflow completed with {} warning(s)",
            ctx.warnings.len()
        );

        Ok(AnalysisResult {
            conversation_id: ctx.conversation_id,
            question: ctx.question,
            narrative,
            aggregated: aggregation.result,
            generated_query: query,
            raw_row_count: execution.row_count,
            execution_time_ms: execution.execution_time.as_millis() as u64,
            elapsed_ms: ctx.started.elapsed().as_millis() as u64,
            attempts: ctx.attempts,
            warnings: ctx.warnings,
        })
    }

    /// Embed the question and pull the top-k schema documents. Failures
    /// degrade to an empty context with a warning, never a hard error.
    async fn retrieve_context(&self, ctx: &mut WorkflowContext) {
        let embedded = self
            .with_timeout(self.embedding.embed(vec![ctx.question.clone()]), || {
                Error::EmbeddingUnavailable("Question embedding timed out".to_string())
            })
            .await;

        match embedded {
            Ok(mut vectors) if !vectors.is_empty() => {
                let vector = vectors.remove(0);
                ctx.retrieved = self.index.query(&vector, self.options.top_k_schema);
                if ctx.retrieved.is_empty() {
                    ctx.warn(
                        "No schema context retrieved; generating without schema guidance",
                    );
                } else {
                    debug!(
                        "Retrieved {} schema document(s), best score {:.3}",
                        ctx.retrieved.len(),
                        ctx.retrieved[0].score
                    );
                }
            }
            Ok(_) => {
                ctx.record_failure(
                    WorkflowState::Retrieving,
                    "Embedding gateway returned no vector",
                );
                ctx.warn("No schema context retrieved; generating without schema guidance");
            }
            Err(e) => {
                ctx.record_failure(WorkflowState::Retrieving, &e);
                ctx.warn(format!(
                    "Schema retrieval unavailable ({}); generating without schema guidance",
                    e
                ));
            }
        }
    }

    /// The bounded retry loop: synthesize, validate, execute. Validation
    /// and execution failures consume the same attempt budget and feed
    /// their error text into the next generation attempt.
    async fn synthesize_and_execute(
        &self,
        ctx: &mut WorkflowContext,
        context_docs: &[Arc<SchemaDocument>],
        whitelist: &EntityWhitelist,
        cancel: &CancelToken,
    ) -> Result<(StructuredQuery, crate::backend::QueryResult)> {
        let mut prior: Option<PriorFailure> = None;

        loop {
            self.transition(ctx, WorkflowState::Synthesizing, cancel)?;
            ctx.attempts += 1;

            let prompt = synthesis_prompt(&ctx.question, context_docs, prior.as_ref());
            let response = match self
                .with_timeout(self.generation.generate(&prompt, &self.constraints), || {
                    Error::GenerationUnavailable("Query generation timed out".to_string())
                })
                .await
            {
                Ok(text) => text,
                // Gateway unavailability is not retried here; the gateway
                // client owns transient-error retries
                Err(e) => return Err(self.fail(ctx, e)),
            };

            self.transition(ctx, WorkflowState::Validating, cancel)?;
            let validated = parse_response(&response).and_then(|query| {
                validate_query(&query, context_docs, whitelist).map(|_| query)
            });

            let query = match validated {
                Ok(query) => {
                    if let Some(failed) = prior.take() {
                        ctx.warn(format!("Query corrected after: {}", failed.error));
                    }
                    query
                }
                Err(e) => {
                    ctx.record_failure(WorkflowState::Validating, &e);
                    debug!(attempt = ctx.attempts, "Validation failed: {}", e);
                    let query_text = Some(response.trim().to_string());
                    if ctx.attempts >= self.options.max_attempts {
                        return Err(self.fail(
                            ctx,
                            Error::GenerationExhausted {
                                attempts: ctx.attempts,
                                query: query_text,
                                reason: e.to_string(),
                            },
                        ));
                    }
                    prior = Some(PriorFailure {
                        query: query_text,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            ctx.candidate_query = Some(query.clone());
            self.transition(ctx, WorkflowState::Executing, cancel)?;

            let executed = self
                .with_timeout(self.backend.execute(&query), || {
                    Error::BackendExecution(format!(
                        "Execution timed out after {} ms",
                        self.options.timeout.as_millis()
                    ))
                })
                .await;
            match executed {
                Ok(result) => {
                    debug!(
                        attempt = ctx.attempts,
                        rows = result.row_count,
                        "Query executed"
                    );
                    return Ok((query, result));
                }
                Err(e) => {
                    // The backend's own message, kept verbatim for both the
                    // retry prompt and the terminal error
                    let backend_message = match e {
                        Error::BackendExecution(message) => message,
                        other => other.to_string(),
                    };
                    ctx.record_failure(WorkflowState::Executing, &backend_message);
                    debug!(attempt = ctx.attempts, "Execution failed: {}", backend_message);
                    if ctx.attempts >= self.options.max_attempts {
                        return Err(self.fail(
                            ctx,
                            Error::ExecutionExhausted {
                                attempts: ctx.attempts,
                                query: Some(query.to_string()),
                                reason: backend_message,
                            },
                        ));
                    }
                    prior = Some(PriorFailure {
                        query: Some(query.to_string()),
                        error: backend_message,
                    });
                }
            }
        }
    }

    /// Advance to the next stage, observing cancellation at the boundary
    fn transition(
        &self,
        ctx: &mut WorkflowContext,
        next: WorkflowState,
        cancel: &CancelToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            ctx.advance(WorkflowState::Failed);
            return Err(Error::Cancelled);
        }
        ctx.advance(next);
        Ok(())
    }

    fn fail(&self, ctx: &mut WorkflowContext, error: Error) -> Error {
        ctx.advance(WorkflowState::Failed);
        error
    }

    async fn with_timeout<T>(
        &self,
        operation: impl Future<Output = Result<T>>,
        on_timeout: impl FnOnce() -> Error,
    ) -> Result<T> {
        match tokio::time::timeout(self.options.timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout()),
        }
    }
}
