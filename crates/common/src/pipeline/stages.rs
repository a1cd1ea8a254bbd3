//! Retrieval, generation and review stages

use super::state::PipelineState;
use crate::config::AppConfig;
use crate::documents::{DocumentStore, ScoredDocument};
use crate::errors::{AppError, Result};
use crate::llm::TextGenerator;
use crate::metrics;
use crate::sessions::SessionStore;
use regex_lite::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, instrument};

/// Tunables shared by all stages
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub excerpt_chars: usize,
    pub history_window: usize,
    pub max_output_tokens: u32,
    pub retrieval_timeout: Duration,
    pub universe: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            excerpt_chars: 1200,
            history_window: 6,
            max_output_tokens: 600,
            retrieval_timeout: Duration::from_secs(30),
            universe: "DOAMMO".to_string(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.pipeline.top_k,
            excerpt_chars: config.pipeline.excerpt_chars,
            history_window: config.pipeline.history_window,
            max_output_tokens: config.generation.max_output_tokens,
            retrieval_timeout: config.documents_timeout(),
            universe: config.pipeline.universe.clone(),
        }
    }
}

/// Collaborators the stages call out to
#[derive(Clone)]
pub struct StageContext {
    pub documents: Arc<dyn DocumentStore>,
    pub generator: Arc<dyn TextGenerator>,
    pub sessions: Arc<SessionStore>,
    pub settings: PipelineSettings,
}

/// Advisory reading of the reviewer's judgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    NeedsRevision,
    Unrecognized,
}

const VERDICT_PATTERN: &str = r"(?i)\b(approved|needs\s+revision)\s*:";

static VERDICT_RE: OnceLock<Option<Regex>> = OnceLock::new();

impl Verdict {
    /// First `APPROVED:` or `NEEDS REVISION:` marker in the text wins
    pub fn parse(judgment: &str) -> Self {
        let Some(pattern) = VERDICT_RE.get_or_init(|| Regex::new(VERDICT_PATTERN).ok()) else {
            return Verdict::Unrecognized;
        };
        match pattern.captures(judgment).and_then(|c| c.get(1)) {
            Some(m) if m.as_str().eq_ignore_ascii_case("approved") => Verdict::Approved,
            Some(_) => Verdict::NeedsRevision,
            None => Verdict::Unrecognized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::NeedsRevision => "needs_revision",
            Verdict::Unrecognized => "unrecognized",
        }
    }
}

/// Pipeline stages, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Retrieval,
    Generation,
    Review,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::Review => "review",
        })
    }
}

impl Stage {
    /// Fixed run order
    pub const ORDER: [Stage; 3] = [Stage::Retrieval, Stage::Generation, Stage::Review];

    /// Apply this stage to the state
    pub async fn transform(&self, state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
        match self {
            Stage::Retrieval => retrieve(state, ctx).await,
            Stage::Generation => generate(state, ctx).await,
            Stage::Review => review(state, ctx).await,
        }
    }
}

/// Shape scored documents into `(labels, context)`
pub fn build_context(results: &[ScoredDocument], excerpt_chars: usize) -> (Vec<String>, String) {
    let labels = results.iter().map(|r| r.source_label.clone()).collect();
    let context = results
        .iter()
        .map(|r| {
            let excerpt: String = r.body.chars().take(excerpt_chars).collect();
            format!("\n--- {} ---\n{}\n", r.source_label, excerpt)
        })
        .collect();
    (labels, context)
}

pub fn narrator_prompt(universe: &str, lore: &str, recent: &str, user_input: &str) -> String {
    format!(
        "You are the Narrator for the {universe} universe.

RELEVANT LORE:
{lore}

RECENT CONVERSATION CONTEXT:
{recent}

CURRENT USER INPUT:
{user_input}

Generate an engaging narrative response (2-3 paragraphs) that:
- Uses specific details from the lore
- Stays consistent with the {universe} universe
- References and builds on the recent conversation context
- Is descriptive and immersive
- Responds naturally to the user's current input
"
    )
}

pub fn review_prompt(universe: &str, lore: &str, narrative: &str) -> String {
    format!(
        "You are the Quality Keeper for the {universe} universe.

LORE CONTEXT:
{lore}

GENERATED NARRATIVE:
{narrative}

Review the narrative and check:
1. Does it contradict any lore?
2. Does it use appropriate {universe} universe terminology?
3. Is it engaging and well-written?

Respond with either:
- \"APPROVED: [brief comment]\" if it's good
- \"NEEDS REVISION: [issues]\" if there are problems
"
    )
}

#[instrument(skip_all, fields(session_id = %state.session_id()))]
async fn retrieve(mut state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
    let settings = &ctx.settings;
    let query = ctx.documents.query(state.user_input(), settings.top_k);

    let results = tokio::time::timeout(settings.retrieval_timeout, query)
        .await
        .map_err(|_| AppError::RetrievalTimeout {
            timeout_ms: settings.retrieval_timeout.as_millis() as u64,
        })??;

    if results.is_empty() {
        return Err(AppError::Retrieval {
            message: "no lore documents matched the input".to_string(),
        });
    }

    metrics::record_retrieval(ctx.documents.backend_name(), results.len());
    let (labels, context) = build_context(&results, settings.excerpt_chars);
    info!(documents = ?labels, "Lore retrieved");

    state.record_retrieval(labels, context)?;
    Ok(state)
}

#[instrument(skip_all, fields(session_id = %state.session_id()))]
async fn generate(mut state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
    let settings = &ctx.settings;
    let recent = ctx
        .sessions
        .get_recent(state.session_id(), settings.history_window)
        .await?;

    let prompt = narrator_prompt(
        &settings.universe,
        state.retrieved_context(),
        &recent,
        state.user_input(),
    );
    let output = ctx.generator.generate(&prompt, settings.max_output_tokens).await?;

    info!(
        model = %ctx.generator.model_name(),
        input_tokens = output.input_tokens,
        output_tokens = output.output_tokens,
        "Narrative generated"
    );

    state.record_narrative(output.text)?;
    Ok(state)
}

#[instrument(skip_all, fields(session_id = %state.session_id()))]
async fn review(mut state: PipelineState, ctx: &StageContext) -> Result<PipelineState> {
    let settings = &ctx.settings;
    let prompt = review_prompt(&settings.universe, state.retrieved_context(), state.narrative());
    let output = ctx.generator.generate(&prompt, settings.max_output_tokens).await?;

    let verdict = Verdict::parse(&output.text);
    metrics::record_verdict(verdict.as_str());
    info!(
        verdict = verdict.as_str(),
        input_tokens = output.input_tokens,
        output_tokens = output.output_tokens,
        "Narrative reviewed"
    );

    state.record_review(output.text, verdict)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(label: &str, body: &str, distance: f32) -> ScoredDocument {
        ScoredDocument {
            document_id: label.trim_end_matches(".md").to_string(),
            body: body.to_string(),
            source_label: label.to_string(),
            distance,
        }
    }

    #[test]
    fn test_verdict_parsing() {
        assert_eq!(Verdict::parse("APPROVED: vivid and consistent"), Verdict::Approved);
        assert_eq!(
            Verdict::parse("Overall: NEEDS REVISION: the sun rises in the west"),
            Verdict::NeedsRevision
        );
        assert_eq!(Verdict::parse("needs  revision: minor"), Verdict::NeedsRevision);
        assert_eq!(Verdict::parse("Looks fine to me"), Verdict::Unrecognized);
        assert!(VERDICT_RE.get().is_some_and(|pattern| pattern.is_some()));
    }

    #[test]
    fn test_stage_display_and_order() {
        assert_eq!(Stage::Generation.to_string(), "generation");
        assert_eq!(serde_json::to_value(Stage::Review).unwrap(), "review");
        assert_eq!(Stage::ORDER[0], Stage::Retrieval);
    }

    #[test]
    fn test_context_format_and_bound() {
        let long = "é".repeat(2000);
        let results = vec![scored("ruins.md", &long, 0.1), scored("desert.md", "Sand.", 0.4)];
        let (labels, context) = build_context(&results, 1200);

        assert_eq!(labels, vec!["ruins.md", "desert.md"]);
        assert!(context.starts_with("\n--- ruins.md ---\n"));
        assert!(context.ends_with("\n--- desert.md ---\nSand.\n"));
        assert_eq!(context.matches('é').count(), 1200);
    }

    #[test]
    fn test_prompts_embed_inputs() {
        let prompt = narrator_prompt("DOAMMO", "LORE", "You: hi\n\n", "I wave");
        assert!(prompt.starts_with("You are the Narrator for the DOAMMO universe."));
        assert!(prompt.contains("RELEVANT LORE:\nLORE"));
        assert!(prompt.contains("CURRENT USER INPUT:\nI wave"));

        let review = review_prompt("DOAMMO", "LORE", "STORY");
        assert!(review.contains("GENERATED NARRATIVE:\nSTORY"));
        assert!(review.contains("\"NEEDS REVISION: [issues]\""));
    }
}
