//! Pipeline instance
//!
//! One instance runs the five stages strictly in order under a single
//! sampling configuration. Each stage output is written to its memory layer
//! tagged with the instance index before the next stage starts.
//!
//! # Error Handling
//! The first failing generation call aborts this instance only. Outputs
//! already stored stay in memory; siblings are unaffected.

use crate::error::{EngineError, EngineResult};
use crate::events::{EventSink, PipelineEvent};
use crate::generation::GenerationClient;
use crate::memory::LayeredMemory;
use crate::settings::{SamplingConfig, SamplingSchedule};
use crate::stages::{self, Stage};
use mmps_common::config::SummaryScope;
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by every instance of one session
pub struct PipelineContext {
    pub client: Arc<dyn GenerationClient>,
    pub memory: Arc<LayeredMemory>,
    pub problem: Arc<str>,
    pub system_directive: String,
    pub summary_scope: SummaryScope,
    pub events: EventSink,
}

/// Tagged result of one stage of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub instance: usize,
    pub stage: Stage,
    pub text: String,
}

/// One run of the five stages
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInstance {
    pub index: usize,
    /// Sampling for stages 1-4
    pub sampling: SamplingConfig,
    /// Sampling for stage 5
    pub summary_sampling: SamplingConfig,
}

impl PipelineInstance {
    pub fn from_schedule(schedule: &SamplingSchedule, index: usize) -> Self {
        Self {
            index,
            sampling: schedule.for_instance(index),
            summary_sampling: schedule.summary_for_instance(index),
        }
    }

    fn sampling_for(&self, stage: Stage) -> SamplingConfig {
        match stage {
            Stage::Summarize => self.summary_sampling,
            _ => self.sampling,
        }
    }

    /// Run all five stages and return the stage-5 output
    pub async fn run(&self, ctx: &PipelineContext) -> EngineResult<StageOutput> {
        info!(
            instance = self.index,
            temperature = self.sampling.temperature,
            max_tokens = self.sampling.max_output_tokens,
            "Pipeline instance starting"
        );

        let mut previous = String::new();

        for stage in Stage::ALL {
            let input = match stage {
                Stage::Summarize => self.summary_input(ctx).await?,
                _ => std::mem::take(&mut previous),
            };

            debug!(instance = self.index, stage = stage.name(), "Running stage");

            let text = stages::run_stage(
                ctx.client.as_ref(),
                &ctx.system_directive,
                stage,
                &ctx.problem,
                &input,
                self.sampling_for(stage),
            )
            .await
            .map_err(|source| EngineError::Stage {
                instance: self.index,
                stage,
                source,
            })?;

            ctx.memory.store(stage.layer(), self.index, text.clone()).await?;
            ctx.events
                .emit(PipelineEvent::stage_completed(self.index, stage, text.len()))
                .await;

            previous = text;
        }

        info!(instance = self.index, "Pipeline instance complete");

        Ok(StageOutput {
            instance: self.index,
            stage: Stage::Summarize,
            text: previous,
        })
    }

    /// Layer 3 then layer 4, as of now
    ///
    /// Under [`SummaryScope::Global`] this includes whatever siblings have
    /// stored so far, so the result depends on scheduling.
    async fn summary_input(&self, ctx: &PipelineContext) -> EngineResult<String> {
        let correlate = Stage::Correlate.layer();
        let synthesize = Stage::Synthesize.layer();

        let (correlations, syntheses) = match ctx.summary_scope {
            SummaryScope::Global => (
                ctx.memory.retrieve(correlate).await?,
                ctx.memory.retrieve(synthesize).await?,
            ),
            SummaryScope::Instance => (
                ctx.memory.retrieve_for_instance(correlate, self.index).await?,
                ctx.memory.retrieve_for_instance(synthesize, self.index).await?,
            ),
        };

        debug!(
            instance = self.index,
            correlations = correlations.len(),
            syntheses = syntheses.len(),
            "Assembled summary input"
        );

        Ok(stages::join_summary_input(&correlations, &syntheses))
    }
}
