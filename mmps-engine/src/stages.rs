//! The five pipeline stages
//!
//! | # | Stage      | Reads                         | Tier   |
//! |---|------------|-------------------------------|--------|
//! | 1 | Extract    | problem                       | fast   |
//! | 2 | Analyze    | problem + stage 1             | fast   |
//! | 3 | Correlate  | problem + stage 2             | fast   |
//! | 4 | Synthesize | problem + stage 3             | fast   |
//! | 5 | Summarize  | problem + layers 3 and 4      | strong |
//!
//! Stage `k` stores its output in memory layer `k`.

use crate::generation::{
    Conversation, GenerationClient, GenerationError, GenerationRequest, ModelTier,
};
use crate::settings::SamplingConfig;

/// Separator between memory entries when stage 5 concatenates layers
pub const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

/// Fixed stage topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extract,
    Analyze,
    Correlate,
    Synthesize,
    Summarize,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 5] = [
        Stage::Extract,
        Stage::Analyze,
        Stage::Correlate,
        Stage::Synthesize,
        Stage::Summarize,
    ];

    /// 1-based stage number, also the memory layer it writes
    pub fn number(self) -> usize {
        match self {
            Stage::Extract => 1,
            Stage::Analyze => 2,
            Stage::Correlate => 3,
            Stage::Synthesize => 4,
            Stage::Summarize => 5,
        }
    }

    pub fn layer(self) -> usize {
        self.number()
    }

    pub fn tier(self) -> ModelTier {
        match self {
            Stage::Summarize => ModelTier::Strong,
            _ => ModelTier::Fast,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Analyze => "analyze",
            Stage::Correlate => "correlate",
            Stage::Synthesize => "synthesize",
            Stage::Summarize => "summarize",
        }
    }

    /// Task instruction for this stage
    ///
    /// `input` is the previous stage's output for stages 2-4 and the
    /// concatenated layer 3/4 history for stage 5. Stage 1 ignores it.
    pub fn build_prompt(self, problem: &str, input: &str) -> String {
        match self {
            Stage::Extract => format!(
                "Given the user's input: '{}', extract 5 keywords or phrases and give a \
                 one-sentence description for each.",
                problem
            ),
            Stage::Analyze => format!(
                "User's input: '{}'. Analyze each of these keywords: {}. Explain how each one \
                 relates to solving the problem.",
                problem, input
            ),
            Stage::Correlate => format!(
                "Based on the user's input: '{}', form pairs of keywords from these analyses: \
                 {}. Explain how each pair relates to the problem.",
                problem, input
            ),
            Stage::Synthesize => format!(
                "Taking into account the user's input: '{}', synthesize the following \
                 correlations into one unified explanation: {}. Do not include any code, only \
                 information on how to solve the problem.",
                problem, input
            ),
            Stage::Summarize => format!(
                "With the user's input in mind: '{}', summarize the following information into \
                 a final, comprehensive response: {}. Do not include any code, only information \
                 on how to solve the problem. Remove duplicates.",
                problem, input
            ),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

/// Run one stage: build the prompt, wrap it in a fresh conversation, call the client
pub async fn run_stage(
    client: &dyn GenerationClient,
    system_directive: &str,
    stage: Stage,
    problem: &str,
    input: &str,
    sampling: SamplingConfig,
) -> Result<String, GenerationError> {
    let conversation =
        Conversation::single_turn(system_directive, stage.build_prompt(problem, input));
    let request = GenerationRequest::new(
        conversation,
        stage.tier(),
        sampling.max_output_tokens,
        sampling.temperature,
    )?;
    client.generate(&request).await
}

/// Join stage-5 input: layer 3 entries then layer 4 entries
pub fn join_summary_input(correlations: &[String], syntheses: &[String]) -> String {
    correlations
        .iter()
        .chain(syntheses.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(SUMMARY_SEPARATOR)
}
