//! mmps-engine library interface
//!
//! Multi-pass problem solving: N pipeline instances run five LLM stages each
//! (extract → analyze → correlate → synthesize → summarize) with different
//! sampling parameters, then one scoring call picks the best final answer.

pub mod error;
pub mod events;
pub mod generation;
pub mod memory;
pub mod pipeline;
pub mod scheduler;
pub mod scorer;
pub mod session;
pub mod settings;
pub mod stages;

pub use crate::error::{EngineError, EngineResult};
pub use crate::session::{BestAnswer, Session};
