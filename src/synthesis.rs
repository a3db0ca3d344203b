//! Query synthesis prompts
//!
//! Builds the generation prompt from the question and the retrieved schema
//! context. On retry the previous attempt's error is appended to the prompt
//! so the model can correct itself (error-guided regeneration). The
//! orchestrator parses and validates whatever comes back.

use crate::schema::SchemaDocument;
use std::fmt::Write as _;
use std::sync::Arc;

/// A prior failure fed back into the next generation attempt
#[derive(Debug, Clone)]
pub struct PriorFailure {
    /// The query text that failed, when one was produced
    pub query: Option<String>,
    pub error: String,
}

/// Build the synthesis prompt
pub fn synthesis_prompt(
    question: &str,
    context: &[Arc<SchemaDocument>],
    prior: Option<&PriorFailure>,
) -> String {
    let mut prompt = String::from(
        "You are an expert query generator for a document store that supports \
         only 'scan' and 'query' operations. Generate one operation for the \
         natural language request.\n\n",
    );

    if context.is_empty() {
        prompt.push_str(
            "No schema context is available; prefer a scan of the most likely table.\n\n",
        );
    } else {
        prompt.push_str("Available tables and schema:\n");
        for doc in context {
            prompt.push_str(&doc.context_text());
            prompt.push('\n');
        }
    }

    let _ = write!(prompt, "Natural language request: {}\n\n", question);

    prompt.push_str(
        "Respond with a JSON object only, no additional text:\n\
         {\n\
         \x20 \"operation\": \"scan\" or \"query\",\n\
         \x20 \"table_name\": \"table to read\",\n\
         \x20 \"key_condition\": \"key = value, query operations only\",\n\
         \x20 \"filter_expression\": \"optional filter: field op value [AND ...]; ops = != > >= < <= contains begins_with\",\n\
         \x20 \"projection_expression\": \"optional comma-separated columns\",\n\
         \x20 \"limit\": optional row limit,\n\
         \x20 \"explanation\": \"brief explanation\"\n\
         }\n\n\
         Guidelines:\n\
         - Use 'scan' unless the request filters on the table's key attribute\n\
         - Reference only tables and columns from the schema context\n\
         - Aggregations (totals, averages, rankings) happen after the query; \
         fetch the raw rows they need\n",
    );

    if let Some(prior) = prior {
        prompt.push_str("\nYour previous attempt failed.\n");
        if let Some(query) = &prior.query {
            let _ = write!(prompt, "Previous query: {}\n", query);
        }
        let _ = write!(prompt, "Error: {}\nGenerate a corrected query.\n", prior.error);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, ColumnType};

    fn context() -> Vec<Arc<SchemaDocument>> {
        vec![Arc::new(SchemaDocument::new(
            "orders",
            vec![ColumnDescriptor {
                name: "order_id".to_string(),
                data_type: ColumnType::Text,
                description: String::new(),
            }],
        ))]
    }

    #[test]
    fn test_prompt_includes_schema_and_question() {
        let prompt = synthesis_prompt("top 5 orders", &context(), None);
        assert!(prompt.contains("Table: orders"));
        assert!(prompt.contains("Natural language request: top 5 orders"));
        assert!(!prompt.contains("previous attempt"));
    }

    #[test]
    fn test_prompt_empty_context_degrades() {
        let prompt = synthesis_prompt("anything", &[], None);
        assert!(prompt.contains("No schema context is available"));
    }

    #[test]
    fn test_prompt_carries_prior_error() {
        let prior = PriorFailure {
            query: Some("scan invoices".to_string()),
            error: "unknown table 'invoices'".to_string(),
        };
        let prompt = synthesis_prompt("question", &context(), Some(&prior));
        assert!(prompt.contains("previous attempt failed"));
        assert!(prompt.contains("scan invoices"));
        assert!(prompt.contains("unknown table 'invoices'"));
    }
}
