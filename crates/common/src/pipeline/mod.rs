//! Narrative pipeline
//!
//! Retrieval → Generation → Review over one `PipelineState`, wrapped by
//! `NarrativeService`, which records each turn in the session store.

mod orchestrator;
mod service;
mod stages;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::PipelineOrchestrator;
pub use service::{NarrativeResponse, NarrativeService};
pub use stages::{
    build_context, narrator_prompt, review_prompt, PipelineSettings, Stage, StageContext, Verdict,
};
pub use state::{Phase, PipelineState};
