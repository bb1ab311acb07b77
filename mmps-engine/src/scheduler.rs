//! Concurrent scheduler
//!
//! Runs N pipeline instances through a fixed-size worker pool
//! (`futures::stream::buffer_unordered(workers)`). Instances run concurrently
//! with each other; stages inside an instance stay sequential.
//!
//! Results come back tagged with their instance index and are returned in
//! instance order regardless of completion order.
//!
//! # Failure policy
//! - `AbortRun`: the first instance failure ends the run. In-flight siblings
//!   are dropped; memory writes they already made are kept.
//! - `ExcludeFailed`: failed instances are logged and left out; the
//!   remaining outcomes go on to scoring.

use crate::error::{EngineError, EngineResult};
use crate::events::PipelineEvent;
use crate::pipeline::{PipelineContext, PipelineInstance, StageOutput};
use crate::settings::SamplingSchedule;
use futures::stream::{self, StreamExt, TryStreamExt};
use mmps_common::config::FailurePolicy;
use tracing::{error, info, warn};

/// Instance launcher
#[derive(Debug, Clone)]
pub struct Scheduler {
    schedule: SamplingSchedule,
    workers: usize,
    failure_policy: FailurePolicy,
}

impl Scheduler {
    pub fn new(schedule: SamplingSchedule, workers: usize, failure_policy: FailurePolicy) -> Self {
        Self {
            schedule,
            // buffer_unordered(0) would never poll anything
            workers: workers.max(1),
            failure_policy,
        }
    }

    /// One task per instance, each carrying its own index and sampling
    pub fn instances(&self) -> Vec<PipelineInstance> {
        (0..self.schedule.instances)
            .map(|index| PipelineInstance::from_schedule(&self.schedule, index))
            .collect()
    }

    /// Run every instance and return stage-5 outputs in instance order
    pub async fn run(&self, ctx: &PipelineContext) -> EngineResult<Vec<StageOutput>> {
        let instances = self.instances();
        let total = instances.len();

        info!(
            instances = total,
            workers = self.workers,
            policy = ?self.failure_policy,
            "Starting pipeline instances"
        );

        let runs = stream::iter(instances)
            .map(|instance| async move { Self::run_instance(ctx, instance).await })
            .buffer_unordered(self.workers);

        let mut outputs = match self.failure_policy {
            FailurePolicy::AbortRun => runs.try_collect::<Vec<_>>().await?,
            FailurePolicy::ExcludeFailed => {
                let results: Vec<EngineResult<StageOutput>> = runs.collect().await;
                let mut outputs = Vec::with_capacity(results.len());
                for result in results {
                    match result {
                        Ok(output) => outputs.push(output),
                        Err(e) => warn!(
                            instance = ?e.instance(),
                            error = %e,
                            "Instance excluded from scoring"
                        ),
                    }
                }
                outputs
            }
        };

        outputs.sort_by_key(|output| output.instance);

        info!(
            completed = outputs.len(),
            total,
            "Pipeline instances finished"
        );

        Ok(outputs)
    }

    async fn run_instance(
        ctx: &PipelineContext,
        instance: PipelineInstance,
    ) -> EngineResult<StageOutput> {
        ctx.events
            .emit(PipelineEvent::InstanceStarted {
                instance: instance.index,
                temperature: instance.sampling.temperature,
                max_output_tokens: instance.sampling.max_output_tokens,
            })
            .await;

        match instance.run(ctx).await {
            Ok(output) => {
                ctx.events
                    .emit(PipelineEvent::InstanceCompleted {
                        instance: instance.index,
                    })
                    .await;
                Ok(output)
            }
            Err(e) => {
                error!(instance = instance.index, error = %e, "Pipeline instance failed");
                let stage = match &e {
                    EngineError::Stage { stage, .. } => stage.number(),
                    _ => 0,
                };
                ctx.events
                    .emit(PipelineEvent::InstanceFailed {
                        instance: instance.index,
                        stage,
                        message: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }
}
