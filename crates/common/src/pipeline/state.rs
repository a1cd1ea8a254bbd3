//! Per-run pipeline state

use super::stages::Verdict;
use crate::errors::{AppError, Result};
use serde::Serialize;

/// Furthest point a run has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Retrieved,
    Generated,
    Reviewed,
}

/// State threaded through one pipeline run.
///
/// Fields are filled once each, in stage order. The setters refuse to run
/// from any phase other than the one immediately before them.
#[derive(Debug, Clone)]
pub struct PipelineState {
    user_input: String,
    session_id: String,
    relevant_documents: Vec<String>,
    retrieved_context: String,
    narrative: String,
    quality_judgment: String,
    verdict: Verdict,
    final_output: String,
    phase: Phase,
}

impl PipelineState {
    pub fn new(user_input: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            session_id: session_id.into(),
            relevant_documents: Vec::new(),
            retrieved_context: String::new(),
            narrative: String::new(),
            quality_judgment: String::new(),
            verdict: Verdict::Unrecognized,
            final_output: String::new(),
            phase: Phase::Start,
        }
    }

    pub fn user_input(&self) -> &str {
        &self.user_input
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Source labels, most relevant first
    pub fn relevant_documents(&self) -> &[String] {
        &self.relevant_documents
    }

    pub fn retrieved_context(&self) -> &str {
        &self.retrieved_context
    }

    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    pub fn quality_judgment(&self) -> &str {
        &self.quality_judgment
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn final_output(&self) -> &str {
        &self.final_output
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, from: Phase, to: Phase) -> Result<()> {
        if self.phase != from {
            return Err(AppError::Internal {
                message: format!(
                    "pipeline transition to {:?} requires phase {:?}, found {:?}",
                    to, from, self.phase
                ),
            });
        }
        self.phase = to;
        Ok(())
    }

    pub(crate) fn record_retrieval(&mut self, documents: Vec<String>, context: String) -> Result<()> {
        self.advance(Phase::Start, Phase::Retrieved)?;
        self.relevant_documents = documents;
        self.retrieved_context = context;
        Ok(())
    }

    pub(crate) fn record_narrative(&mut self, narrative: String) -> Result<()> {
        self.advance(Phase::Retrieved, Phase::Generated)?;
        self.narrative = narrative;
        Ok(())
    }

    /// The narrative passes through as the final output whatever the verdict
    pub(crate) fn record_review(&mut self, judgment: String, verdict: Verdict) -> Result<()> {
        self.advance(Phase::Generated, Phase::Reviewed)?;
        self.quality_judgment = judgment;
        self.verdict = verdict;
        self.final_output = self.narrative.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_progression() {
        let mut state = PipelineState::new("I look around", "s1");
        assert_eq!(state.phase(), Phase::Start);

        state
            .record_retrieval(vec!["dunes.md".into()], "\n--- dunes.md ---\nsand\n".into())
            .unwrap();
        state.record_narrative("The wind howls.".into()).unwrap();
        state
            .record_review("NEEDS REVISION: too short".into(), Verdict::NeedsRevision)
            .unwrap();

        assert_eq!(state.phase(), Phase::Reviewed);
        assert_eq!(state.final_output(), "The wind howls.");
        assert_eq!(state.verdict(), Verdict::NeedsRevision);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut state = PipelineState::new("x", "s1");
        assert!(state.record_narrative("early".into()).is_err());
        assert!(state.record_review("APPROVED: ok".into(), Verdict::Approved).is_err());
        assert_eq!(state.narrative(), "");

        state.record_retrieval(vec![], String::new()).unwrap();
        assert!(state.record_retrieval(vec![], String::new()).is_err());
    }
}
