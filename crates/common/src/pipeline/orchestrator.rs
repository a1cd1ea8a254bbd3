//! Linear pipeline runner

use super::stages::{Stage, StageContext};
use super::state::PipelineState;
use crate::errors::{AppError, Result};
use crate::metrics;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Runs Retrieval, Generation and Review once each, in order.
///
/// A fresh state is built per run. The first stage failure aborts the run
/// and is returned as `AppError::Pipeline` naming that stage.
pub struct PipelineOrchestrator {
    ctx: StageContext,
}

impl PipelineOrchestrator {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    #[instrument(skip(self, user_input), fields(input_len = user_input.len()))]
    pub async fn run(&self, user_input: &str, session_id: &str) -> Result<PipelineState> {
        let started = Instant::now();
        let mut state = PipelineState::new(user_input, session_id);

        for stage in Stage::ORDER {
            let stage_start = Instant::now();
            let result = stage.transform(state, &self.ctx).await;
            metrics::record_stage(
                &stage.to_string(),
                stage_start.elapsed().as_secs_f64(),
                result.is_ok(),
            );

            state = match result {
                Ok(next) => next,
                Err(source) => {
                    warn!(%stage, error = %source, "Pipeline stage failed");
                    metrics::record_pipeline(started.elapsed().as_secs_f64(), "error");
                    return Err(AppError::Pipeline {
                        stage,
                        source: Box::new(source),
                    });
                }
            };
        }

        metrics::record_pipeline(started.elapsed().as_secs_f64(), "success");
        info!(
            documents = state.relevant_documents().len(),
            verdict = state.verdict().as_str(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );
        Ok(state)
    }
}
