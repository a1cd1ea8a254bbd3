//! Narrative service: sessions around pipeline runs

use super::orchestrator::PipelineOrchestrator;
use super::stages::{PipelineSettings, StageContext, Verdict};
use crate::config::AppConfig;
use crate::documents::DocumentStore;
use crate::errors::{AppError, Result};
use crate::llm::TextGenerator;
use crate::sessions::{Message, Role, Session, SessionMetadata, SessionStore, UndoOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Result of one narrative turn
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeResponse {
    pub narrative: String,
    pub documents_used: Vec<String>,
    pub quality_judgment: String,
    pub verdict: Verdict,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Entry point for narrative turns and session maintenance
pub struct NarrativeService {
    sessions: Arc<SessionStore>,
    orchestrator: PipelineOrchestrator,
    max_input_chars: usize,
}

impl NarrativeService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        sessions: Arc<SessionStore>,
        settings: PipelineSettings,
    ) -> Self {
        let ctx = StageContext {
            documents,
            generator,
            sessions: sessions.clone(),
            settings,
        };
        Self {
            sessions,
            orchestrator: PipelineOrchestrator::new(ctx),
            max_input_chars: usize::MAX,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        documents: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self::new(documents, generator, sessions, PipelineSettings::from_config(config))
            .with_max_input_chars(config.pipeline.max_input_chars)
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.orchestrator.context().documents
    }

    pub fn model_name(&self) -> &str {
        self.orchestrator.context().generator.model_name()
    }

    /// Run one turn: record the user message, run the pipeline, record the reply.
    ///
    /// On failure the user message stays in the history and no reply is stored.
    #[instrument(skip(self, user_input))]
    pub async fn run_pipeline(
        &self,
        user_input: &str,
        session_id: Option<&str>,
    ) -> Result<NarrativeResponse> {
        let input = user_input.trim();
        if input.is_empty() {
            return Err(AppError::invalid("user_input", "user_input must not be empty"));
        }
        if input.chars().count() > self.max_input_chars {
            return Err(AppError::invalid(
                "user_input",
                format!("user_input exceeds {} characters", self.max_input_chars),
            ));
        }

        let session = self.sessions.get_or_create(session_id).await?;
        let id = session.session_id;

        self.sessions.append(&id, Role::User, input).await?;
        let state = self.orchestrator.run(input, &id).await?;
        self.sessions.append(&id, Role::Assistant, state.final_output()).await?;

        info!(session_id = %id, verdict = state.verdict().as_str(), "Narrative turn stored");

        Ok(NarrativeResponse {
            narrative: state.final_output().to_string(),
            documents_used: state.relevant_documents().to_vec(),
            quality_judgment: state.quality_judgment().to_string(),
            verdict: state.verdict(),
            session_id: id,
            timestamp: Utc::now(),
        })
    }

    pub async fn get_or_create_session(&self, session_id: Option<&str>) -> Result<Session> {
        self.sessions.get_or_create(session_id).await
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.sessions.get(session_id).await?.history)
    }

    pub async fn undo(&self, session_id: &str) -> Result<UndoOutcome> {
        self.sessions.undo(session_id).await
    }

    pub async fn edit(&self, session_id: &str, index: usize, content: &str) -> Result<Message> {
        self.sessions.edit(session_id, index, content).await
    }

    pub async fn export(&self, session_id: &str) -> Result<String> {
        self.sessions.export(session_id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        self.sessions.list_ids().await
    }

    pub async fn metadata(&self, session_id: &str) -> Result<SessionMetadata> {
        self.sessions.metadata(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{harness, ScriptedGenerator};
    use crate::pipeline::Stage;

    async fn service(
        responses: &[&str],
    ) -> (tempfile::TempDir, NarrativeService, Arc<crate::pipeline::testing::RecordingStore>, Arc<ScriptedGenerator>) {
        let (dir, ctx, store, generator) = harness(ScriptedGenerator::new(responses)).await;
        let service = NarrativeService::new(ctx.documents, ctx.generator, ctx.sessions, ctx.settings);
        (dir, service, store, generator)
    }

    #[tokio::test]
    async fn test_first_turn_creates_session() {
        let (_dir, service, store, generator) =
            service(&["Wind scours the ruins.", "APPROVED: grounded in lore"]).await;

        let response = service
            .run_pipeline("I discover ancient ruins in the desert", None)
            .await
            .unwrap();

        assert!(!response.session_id.is_empty());
        assert!(response.documents_used.len() <= 3);
        assert_eq!(response.narrative, "Wind scours the ruins.");
        assert_eq!(response.verdict, Verdict::Approved);
        assert_eq!(store.queries()[0].1, 3);
        assert_eq!(generator.prompts().len(), 2);

        let history = service.history(&response.session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "I discover ancient ruins in the desert");
        assert_eq!(history[1].content, "Wind scours the ruins.");
    }

    #[tokio::test]
    async fn test_second_turn_sees_prior_exchange() {
        let (_dir, service, _store, generator) = service(&[
            "Wind scours the ruins.",
            "APPROVED: fine",
            "The markings depict glass kings.",
            "APPROVED: fine",
        ])
        .await;

        let first = service
            .run_pipeline("I discover ancient ruins in the desert", None)
            .await
            .unwrap();
        service
            .run_pipeline("I examine the markings on the walls", Some(&first.session_id))
            .await
            .unwrap();

        let prompts = generator.prompts();
        let second_narration = &prompts[2];
        assert!(second_narration.contains("You: I discover ancient ruins in the desert"));
        assert!(second_narration.contains("AI: Wind scours the ruins."));
        assert!(second_narration.contains("CURRENT USER INPUT:\nI examine the markings on the walls"));
    }

    #[tokio::test]
    async fn test_failed_run_keeps_user_message_only() {
        let (dir, ctx, _store, _generator) = harness(ScriptedGenerator::failing()).await;
        let service = NarrativeService::new(ctx.documents, ctx.generator, ctx.sessions, ctx.settings);

        let err = service.run_pipeline("I wait", Some("stalled")).await.unwrap_err();
        assert!(matches!(err, AppError::Pipeline { stage: Stage::Generation, .. }));

        let history = service.history("stalled").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        drop(dir);
    }

    #[tokio::test]
    async fn test_dropped_turn_keeps_user_message_only() {
        let generator = ScriptedGenerator::new(&["Dawn breaks.", "APPROVED: fine"])
            .with_delay(std::time::Duration::from_secs(5));
        let (_dir, ctx, _store, _generator) = harness(generator).await;
        let service = NarrativeService::new(ctx.documents, ctx.generator, ctx.sessions, ctx.settings);

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            service.run_pipeline("I wait for dawn", Some("vigil")),
        )
        .await;
        assert!(outcome.is_err());

        let history = service.history("vigil").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "I wait for dawn");

        let recent = service.sessions().get_recent("vigil", 6).await.unwrap();
        assert_eq!(recent, "You: I wait for dawn\n\n");
        assert!(!recent.contains("AI:"));
    }

    #[tokio::test]
    async fn test_rejects_blank_and_oversized_input() {
        let (_dir, service, store, _generator) = service(&[]).await;
        let service = service.with_max_input_chars(10);

        assert!(matches!(
            service.run_pipeline("   ", None).await.unwrap_err(),
            AppError::InvalidArgument { .. }
        ));
        assert!(matches!(
            service.run_pipeline("this is far too long", None).await.unwrap_err(),
            AppError::InvalidArgument { .. }
        ));
        assert!(store.queries().is_empty());
        assert!(service.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_maintenance_passthroughs() {
        let (_dir, service, _store, _generator) =
            service(&["Dust settles.", "NEEDS REVISION: vague"]).await;
        let response = service.run_pipeline("I sit", Some("camp")).await.unwrap();
        assert_eq!(response.verdict, Verdict::NeedsRevision);
        assert_eq!(response.narrative, "Dust settles.");

        assert_eq!(service.list_sessions().await.unwrap(), vec!["camp"]);
        assert_eq!(service.metadata("camp").await.unwrap().message_count, 2);

        let edited = service.edit("camp", 1, "Dust settles slowly.").await.unwrap();
        assert!(edited.edited_at.is_some());
        assert!(service.export("camp").await.unwrap().contains("Dust settles slowly."));

        assert!(service.undo("camp").await.unwrap().succeeded());
        assert!(service.history("camp").await.unwrap().is_empty());
    }
}
