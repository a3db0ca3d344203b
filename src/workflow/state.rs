//! Workflow state machine
//!
//! Every legal stage transition is enumerated here; the orchestrator only
//! moves through [`WorkflowState::can_transition`]-approved edges. The
//! retry loop is the cycle Synthesizing -> Validating -> (Synthesizing |
//! Executing) -> (Synthesizing | Aggregating), bounded by one attempt
//! counter shared between validation and execution failures.

use crate::index::ScoredDocument;
use crate::query::StructuredQuery;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Received,
    Retrieving,
    Synthesizing,
    Validating,
    Executing,
    Aggregating,
    Narrating,
    Completed,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The fixed transition table
    pub fn can_transition(&self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        // Cancellation may fail the workflow at any stage boundary
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Received, Retrieving)
                | (Retrieving, Synthesizing)
                | (Synthesizing, Validating)
                | (Validating, Synthesizing)
                | (Validating, Executing)
                | (Executing, Synthesizing)
                | (Executing, Aggregating)
                | (Aggregating, Narrating)
                | (Narrating, Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Retrieving => "retrieving",
            Self::Synthesizing => "synthesizing",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Aggregating => "aggregating",
            Self::Narrating => "narrating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One recorded stage failure
#[derive(Debug, Clone)]
pub struct RecordedFailure {
    pub stage: WorkflowState,
    pub error: String,
}

/// Per-request workflow state; never shared between requests and destroyed
/// when the workflow terminates
pub struct WorkflowContext {
    pub question: String,
    pub conversation_id: Uuid,
    pub state: WorkflowState,
    pub retrieved: Vec<ScoredDocument>,
    pub candidate_query: Option<StructuredQuery>,
    /// Shared attempt counter across validation and execution failures
    pub attempts: u32,
    pub errors: Vec<RecordedFailure>,
    pub warnings: Vec<String>,
    pub started: Instant,
}

impl WorkflowContext {
    pub fn new(question: impl Into<String>, conversation_id: Option<Uuid>) -> Self {
        Self {
            question: question.into(),
            conversation_id: conversation_id.unwrap_or_else(Uuid::new_v4),
            state: WorkflowState::Received,
            retrieved: Vec::new(),
            candidate_query: None,
            attempts: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Move to the next stage. Transitions are driven by the orchestrator
    /// only, so an illegal edge is a programming error.
    pub fn advance(&mut self, next: WorkflowState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal transition {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        debug!(
            conversation_id = %self.conversation_id,
            attempt = self.attempts,
            "workflow {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        self.state = next;
    }

    pub fn record_failure(&mut self, stage: WorkflowState, error: impl ToString) {
        self.errors.push(RecordedFailure {
            stage,
            error: error.to_string(),
        });
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        debug!(conversation_id = %self.conversation_id, "{}", warning);
        self.warnings.push(warning);
    }
}

/// Cheap cloneable cancellation flag, observed at stage transitions
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowState::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            Received,
            Retrieving,
            Synthesizing,
            Validating,
            Executing,
            Aggregating,
            Narrating,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition(pair[1]),
                "{} -> {} should be legal",
                pair[0].as_str(),
                pair[1].as_str()
            );
        }
    }

    #[test]
    fn test_retry_cycle_transitions() {
        assert!(Validating.can_transition(Synthesizing));
        assert!(Executing.can_transition(Synthesizing));
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal() {
        for state in [
            Received,
            Retrieving,
            Synthesizing,
            Validating,
            Executing,
            Aggregating,
            Narrating,
        ] {
            assert!(state.can_transition(Failed));
        }
        assert!(!Completed.can_transition(Failed));
        assert!(!Failed.can_transition(Failed));
    }

    #[test]
    fn test_illegal_edges_rejected() {
        assert!(!Received.can_transition(Executing));
        assert!(!Aggregating.can_transition(Synthesizing));
        assert!(!Completed.can_transition(Retrieving));
        assert!(!Narrating.can_transition(Narrating));
    }

    #[test]
    fn test_cancel_token_observed_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
