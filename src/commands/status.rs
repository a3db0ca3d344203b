//! Status command implementation

use crate::backend::MemoryBackend;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;
use serde::Serialize;

/// Status information
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub dataset_path: Option<String>,
    pub table_count: usize,
    pub total_rows: usize,
    pub indexed_documents: usize,
    pub embedding_url: String,
    pub embedding_model: String,
    pub generation_url: String,
    pub generation_model: String,
    pub max_attempts: u32,
    pub top_k_schema: usize,
}

/// Get engine status
pub async fn cmd_status(
    config: &Config,
    backend: &MemoryBackend,
    engine: &Engine,
) -> Result<StatusInfo> {
    let tables = backend.table_names();
    let total_rows = tables
        .iter()
        .filter_map(|t| backend.row_count(t))
        .sum();

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        dataset_path: config
            .dataset_path()
            .map(|p| p.display().to_string()),
        table_count: tables.len(),
        total_rows,
        indexed_documents: engine.index().len(),
        embedding_url: config.embedding.url.clone(),
        embedding_model: config.embedding.model.clone(),
        generation_url: config.generation.url.clone(),
        generation_model: config.generation.model.clone(),
        max_attempts: config.workflow.max_attempts,
        top_k_schema: config.workflow.top_k_schema,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 analyst Status\n");
    println!("Configuration: {}", status.config_path);
    println!(
        "Dataset: {}",
        status.dataset_path.as_deref().unwrap_or("(not configured)")
    );
    println!("  Tables: {}", status.table_count);
    println!("  Rows: {}", status.total_rows);
    println!("\nSchema index: {} document(s)", status.indexed_documents);
    println!("\nGateways:");
    println!(
        "  Embedding: {} ({})",
        status.embedding_url, status.embedding_model
    );
    println!(
        "  Generation: {} ({})",
        status.generation_url, status.generation_model
    );
    println!("\nWorkflow:");
    println!("  Max attempts: {}", status.max_attempts);
    println!("  Schema top-k: {}", status.top_k_schema);
}
