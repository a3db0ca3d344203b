//! Narrative composition from aggregated results
//!
//! The last workflow stage: ask the generation gateway to explain the
//! aggregated result in plain language. Failure here never fails the
//! workflow; the structured result stands on its own.

use crate::aggregate::AggregatedResult;
use crate::error::{Error, Result};
use crate::gateway::{GenerationConstraints, TextGenerationGateway};
use crate::query::StructuredQuery;
use std::fmt::Write as _;

/// Rows shown to the model; more adds tokens without adding signal
const NARRATIVE_ROW_CAP: usize = 10;

fn render_result(result: &AggregatedResult) -> String {
    let mut out = String::new();

    if !result.summary_table.is_empty() {
        for row in result.summary_table.iter().take(NARRATIVE_ROW_CAP) {
            let _ = writeln!(out, "{}: {} ({} rows)", row.dimension, row.metric, row.count);
        }
        if result.summary_table.len() > NARRATIVE_ROW_CAP {
            let _ = writeln!(
                out,
                "... and {} more records",
                result.summary_table.len() - NARRATIVE_ROW_CAP
            );
        }
    } else if !result.preview_rows.is_empty() {
        for row in result.preview_rows.iter().take(NARRATIVE_ROW_CAP) {
            let _ = writeln!(
                out,
                "{}",
                serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string())
            );
        }
    } else {
        out.push_str("No results found for this query.\n");
    }

    out
}

/// Build the narration prompt
pub fn narrative_prompt(
    question: &str,
    query: &StructuredQuery,
    result: &AggregatedResult,
) -> String {
    let mut prompt = String::from(
        "Analyze these query results to answer the user's question.\n\n",
    );
    let _ = write!(prompt, "Question: {}\n\n", question);
    let _ = write!(prompt, "Query executed: {}\n", query);
    if !result.applied_operations.is_empty() {
        let _ = write!(
            prompt,
            "Aggregation applied: {}\n",
            result.applied_operations.join(", ")
        );
    }
    let _ = write!(prompt, "\nResults:\n{}\n", render_result(result));
    prompt.push_str(
        "Provide a clear, concise analysis that directly answers the question. \
         Include key insights from the data.",
    );
    prompt
}

/// Compose the narrative; failures surface as narration-unavailable so the
/// orchestrator can absorb them into a warning.
pub async fn compose_narrative(
    gateway: &dyn TextGenerationGateway,
    constraints: &GenerationConstraints,
    question: &str,
    query: &StructuredQuery,
    result: &AggregatedResult,
) -> Result<String> {
    let prompt = narrative_prompt(question, query, result);

    let narrative = gateway
        .generate(&prompt, constraints)
        .await
        .map_err(|e| Error::NarrationUnavailable(e.to_string()))?;

    let narrative = narrative.trim();
    if narrative.is_empty() {
        return Err(Error::NarrationUnavailable(
            "Gateway returned an empty narrative".to_string(),
        ));
    }
    Ok(narrative.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SummaryRow;

    fn result_with_rows(n: usize) -> AggregatedResult {
        AggregatedResult {
            summary_table: (0..n)
                .map(|i| SummaryRow {
                    dimension: format!("c{}", i),
                    metric: i as f64,
                    count: 1,
                })
                .collect(),
            applied_operations: vec!["group_by:customer_id".to_string()],
            preview_rows: Vec::new(),
        }
    }

    #[test]
    fn test_prompt_caps_rows() {
        let prompt = narrative_prompt(
            "top customers?",
            &StructuredQuery::scan("sales_transactions"),
            &result_with_rows(14),
        );
        assert!(prompt.contains("c9"));
        assert!(!prompt.contains("c10:"));
        assert!(prompt.contains("... and 4 more records"));
    }

    #[test]
    fn test_prompt_mentions_question_and_operations() {
        let prompt = narrative_prompt(
            "top customers?",
            &StructuredQuery::scan("sales_transactions"),
            &result_with_rows(2),
        );
        assert!(prompt.contains("Question: top customers?"));
        assert!(prompt.contains("group_by:customer_id"));
    }

    #[test]
    fn test_empty_result_still_renders() {
        let prompt = narrative_prompt(
            "anything?",
            &StructuredQuery::scan("orders"),
            &AggregatedResult::default(),
        );
        assert!(prompt.contains("No results found"));
    }
}
