//! Index command implementation

use crate::engine::Engine;
use crate::error::Result;
use crate::progress::build_spinner;
use serde::Serialize;

/// Index build statistics
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents_indexed: usize,
    pub warnings: Vec<String>,
}

/// Build (or rebuild) the schema index from the backend's description
pub async fn cmd_build_index(engine: &Engine) -> Result<IndexStats> {
    let spinner = build_spinner("Embedding schema documents");
    let outcome = engine.build_index().await;
    spinner.finish_and_clear();

    let warnings = outcome?;
    Ok(IndexStats {
        documents_indexed: engine.index().len(),
        warnings,
    })
}

/// Print index build stats to console
pub fn print_index_stats(stats: &IndexStats) {
    println!("✓ Schema index built");
    println!("  Documents indexed: {}", stats.documents_indexed);
    for warning in &stats.warnings {
        println!("  ⚠ {}", warning);
    }
}
