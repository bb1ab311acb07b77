//! Error types for mmps-engine
//!
//! Stage failures carry the (instance, stage) tag of the call that failed so
//! the scheduler can report or exclude the right instance.

use crate::generation::GenerationError;
use crate::memory::MemoryError;
use crate::stages::Stage;
use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// A generation call inside a pipeline stage failed
    #[error("Instance {instance} failed at stage {stage}: {source}")]
    Stage {
        instance: usize,
        stage: Stage,
        #[source]
        source: GenerationError,
    },

    /// The comparative scoring call failed
    #[error("Scoring call failed: {0}")]
    Scoring(#[source] GenerationError),

    /// Layered memory misuse (unreachable with correct stage wiring)
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Every instance failed, nothing left to score
    #[error("No pipeline instance produced a final answer")]
    NoCandidates,

    /// mmps-common error (configuration, input)
    #[error("Common error: {0}")]
    Common(#[from] mmps_common::Error),
}

impl EngineError {
    /// Instance index for stage failures
    pub fn instance(&self) -> Option<usize> {
        match self {
            EngineError::Stage { instance, .. } => Some(*instance),
            _ => None,
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
