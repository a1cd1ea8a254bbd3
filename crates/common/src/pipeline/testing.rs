//! In-crate fakes for pipeline tests

use super::stages::{PipelineSettings, StageContext};
use crate::config::SessionCacheConfig;
use crate::documents::{DocumentStore, ScoredDocument};
use crate::errors::{AppError, Result};
use crate::llm::{Generation, TextGenerator};
use crate::sessions::SessionStore;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Fixed lore corpus that records every query
pub struct RecordingStore {
    documents: Vec<ScoredDocument>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        let lore = [
            ("ruins.md", "The sunken ruins of Kesh glow with blue glyphs at dusk."),
            ("desert.md", "The Ashen Desert swallows caravans whole."),
            ("markings.md", "Wall markings in Kesh record the fall of the glass kings."),
            ("ocean.md", "Far to the west lies a salt ocean nobody has crossed."),
        ];
        let documents = lore
            .iter()
            .enumerate()
            .map(|(i, (label, body))| ScoredDocument {
                document_id: label.trim_end_matches(".md").to_string(),
                body: body.to_string(),
                source_label: label.to_string(),
                distance: 0.1 * (i as f32 + 1.0),
            })
            .collect();
        Self { documents, queries: Mutex::new(Vec::new()) }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        self.queries.lock().unwrap().push((text.to_string(), k));
        Ok(self.documents.iter().take(k).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.documents.len())
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

/// Stores that misbehave
pub enum FailingStore {
    Empty,
    Slow,
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn query(&self, _text: &str, _k: usize) -> Result<Vec<ScoredDocument>> {
        if let FailingStore::Slow = self {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<usize> {
        Ok(0)
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Replays canned responses and records prompts
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    fail: bool,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            fail: false,
            delay: None,
        }
    }

    /// Sleep before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call times out
    pub fn failing() -> Self {
        Self { fail: true, ..Self::new(&[]) }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _max_output_tokens: u32) -> Result<Generation> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AppError::GenerationTimeout { timeout_ms: 30_000 });
        }
        let text = self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            AppError::Generation { message: "script exhausted".to_string() }
        })?;
        Ok(Generation {
            input_tokens: prompt.split_whitespace().count() as u32,
            output_tokens: text.split_whitespace().count() as u32,
            text,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Stage context over fakes and a temporary session directory
pub async fn harness(
    generator: ScriptedGenerator,
) -> (TempDir, StageContext, Arc<RecordingStore>, Arc<ScriptedGenerator>) {
    let dir = TempDir::new().unwrap();
    let sessions = SessionStore::open(dir.path(), &SessionCacheConfig::default())
        .await
        .unwrap();
    let store = Arc::new(RecordingStore::new());
    let generator = Arc::new(generator);

    let ctx = StageContext {
        documents: store.clone(),
        generator: generator.clone(),
        sessions: Arc::new(sessions),
        settings: PipelineSettings::default(),
    };
    (dir, ctx, store, generator)
}
