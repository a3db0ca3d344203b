//! Ask command implementation

use crate::engine::{AskOptions, Engine};
use crate::error::{Error, Result};
use crate::workflow::AnalysisResult;
use tracing::info;
use uuid::Uuid;

/// Ask one question
pub async fn cmd_ask(
    engine: &Engine,
    question: &str,
    conversation_id: Option<Uuid>,
    options: AskOptions,
) -> Result<AnalysisResult> {
    info!("Asking: {}", question);
    engine
        .submit_question(question, conversation_id, Some(options))
        .await
}

/// Print an analysis result to console
pub fn print_analysis(result: &AnalysisResult) {
    println!("\n❓ {}\n", result.question);

    if let Some(narrative) = &result.narrative {
        println!("{}\n", narrative);
    }

    if !result.aggregated.summary_table.is_empty() {
        let width = result
            .aggregated
            .summary_table
            .iter()
            .map(|r| r.dimension.len())
            .max()
            .unwrap_or(0)
            .max(9);
        println!("{:<width$}  {:>14}  {:>6}", "dimension", "metric", "rows");
        for row in &result.aggregated.summary_table {
            println!(
                "{:<width$}  {:>14.2}  {:>6}",
                row.dimension, row.metric, row.count
            );
        }
        println!();
    } else if !result.aggregated.preview_rows.is_empty() {
        for row in &result.aggregated.preview_rows {
            println!(
                "{}",
                serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string())
            );
        }
        println!();
    } else {
        println!("No results found for this query.\n");
    }

    if !result.aggregated.applied_operations.is_empty() {
        println!(
            "Aggregation: {}",
            result.aggregated.applied_operations.join(", ")
        );
    }
    println!("Query: {}", result.generated_query);
    println!(
        "Rows: {} | attempts: {} | backend: {} ms | total: {} ms",
        result.raw_row_count, result.attempts, result.execution_time_ms, result.elapsed_ms
    );

    for warning in &result.warnings {
        println!("⚠ {}", warning);
    }
}

/// Print a terminal workflow failure with its diagnostics
pub fn print_workflow_failure(error: &Error) {
    match error {
        Error::GenerationExhausted {
            attempts,
            query,
            reason,
        } => {
            eprintln!("✗ Could not generate a valid query after {} attempts", attempts);
            eprintln!("  Last error: {}", reason);
            if let Some(query) = query {
                eprintln!("  Last attempted query (not executed): {}", query);
            }
        }
        Error::ExecutionExhausted {
            attempts,
            query,
            reason,
        } => {
            eprintln!("✗ Query execution failed after {} attempts", attempts);
            eprintln!("  Backend error: {}", reason);
            if let Some(query) = query {
                eprintln!("  Last query: {}", query);
            }
        }
        Error::Cancelled => eprintln!("✗ Workflow cancelled"),
        other => eprintln!("✗ {}", other),
    }
}
