//! Progress events emitted while a session runs
//!
//! Delivered over an optional `tokio::sync::mpsc` channel. A closed or
//! missing receiver never affects the run.

use crate::stages::Stage;
use serde::Serialize;
use tokio::sync::mpsc;

/// Session progress event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Instance picked up by a worker
    InstanceStarted {
        instance: usize,
        temperature: f32,
        max_output_tokens: u32,
    },

    /// Stage output stored in memory
    StageCompleted {
        instance: usize,
        /// 1-based stage number
        stage: usize,
        chars: usize,
    },

    /// Instance finished stage 5
    InstanceCompleted { instance: usize },

    /// Instance aborted by a stage failure
    InstanceFailed {
        instance: usize,
        stage: usize,
        message: String,
    },

    /// Comparative scoring call about to be made
    ScoringStarted { candidates: usize },

    /// Best candidate chosen
    Selected {
        instance: usize,
        score: f64,
        degraded: bool,
    },
}

impl PipelineEvent {
    pub fn stage_completed(instance: usize, stage: Stage, chars: usize) -> Self {
        PipelineEvent::StageCompleted {
            instance,
            stage: stage.number(),
            chars,
        }
    }
}

/// Optional event sink shared by the scheduler and pipeline instances
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}
