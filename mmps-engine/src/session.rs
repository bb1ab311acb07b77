//! Problem-solving session
//!
//! Owns the layered memory for one problem statement and drives the full
//! flow: scheduler → stage-5 candidates → scorer → best answer.

use crate::error::{EngineError, EngineResult};
use crate::events::{EventSink, PipelineEvent};
use crate::generation::GenerationClient;
use crate::memory::LayeredMemory;
use crate::pipeline::PipelineContext;
use crate::scheduler::Scheduler;
use crate::scorer::Scorer;
use crate::settings::EngineSettings;
use mmps_common::Error;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Final result handed to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct BestAnswer {
    pub text: String,
    /// Score in `[1, 10]`, or 0 when scoring fell back
    pub score: f64,
    /// Instance that produced the answer
    pub instance: usize,
    /// Score per scored instance, in instance order
    pub scores: Vec<(usize, f64)>,
    pub degraded: bool,
}

/// One run over one problem statement
pub struct Session {
    id: Uuid,
    client: Arc<dyn GenerationClient>,
    settings: EngineSettings,
    memory: Arc<LayeredMemory>,
    events: EventSink,
}

impl Session {
    pub fn new(client: Arc<dyn GenerationClient>, settings: EngineSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            settings,
            memory: Arc::new(LayeredMemory::new()),
            events: EventSink::disabled(),
        }
    }

    /// Create session with event channel for progress reporting
    pub fn with_events(
        client: Arc<dyn GenerationClient>,
        settings: EngineSettings,
        event_tx: mpsc::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            events: EventSink::new(event_tx),
            ..Self::new(client, settings)
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Memory written so far (all five layers)
    pub fn memory(&self) -> &Arc<LayeredMemory> {
        &self.memory
    }

    /// Run every instance, score the final answers, return the best one
    pub async fn run(&self, problem: &str) -> EngineResult<BestAnswer> {
        let problem = problem.trim();
        if problem.is_empty() {
            return Err(Error::InvalidInput("problem statement is empty".to_string()).into());
        }

        info!(
            session_id = %self.id,
            instances = self.settings.schedule.instances,
            "Session starting"
        );

        let ctx = PipelineContext {
            client: Arc::clone(&self.client),
            memory: Arc::clone(&self.memory),
            problem: Arc::from(problem),
            system_directive: self.settings.system_directive.clone(),
            summary_scope: self.settings.summary_scope,
            events: self.events.clone(),
        };

        let scheduler = Scheduler::new(
            self.settings.schedule.clone(),
            self.settings.workers,
            self.settings.failure_policy,
        );
        let outputs = scheduler.run(&ctx).await?;
        if outputs.is_empty() {
            return Err(EngineError::NoCandidates);
        }

        let instances: Vec<usize> = outputs.iter().map(|o| o.instance).collect();
        let candidates: Vec<String> = outputs.into_iter().map(|o| o.text).collect();

        info!(session_id = %self.id, candidates = candidates.len(), "Scoring final responses");
        self.events
            .emit(PipelineEvent::ScoringStarted {
                candidates: candidates.len(),
            })
            .await;

        let scorer = Scorer::new(
            Arc::clone(&self.client),
            self.settings.system_directive.clone(),
            self.settings.scoring,
        );
        let selection = scorer.score(problem, &candidates).await?;

        let instance = instances[selection.best.index];
        self.events
            .emit(PipelineEvent::Selected {
                instance,
                score: selection.best.score,
                degraded: selection.degraded,
            })
            .await;

        info!(
            session_id = %self.id,
            instance,
            score = selection.best.score,
            degraded = selection.degraded,
            "Session complete"
        );

        Ok(BestAnswer {
            text: selection.best.text,
            score: selection.best.score,
            instance,
            scores: instances.into_iter().zip(selection.scores).collect(),
            degraded: selection.degraded,
        })
    }
}
