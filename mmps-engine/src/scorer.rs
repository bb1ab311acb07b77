//! Comparative scoring and best-answer selection
//!
//! All candidates go to the strong model in one prompt with 1-based labels.
//! The model is asked for a bare comma-separated list of 1-10 scores.
//!
//! # Parsing
//! Every run of ASCII digits in the reply is taken as a score. Other Unicode
//! digits (full-width and the like) do not count. The set is accepted
//! only if there is exactly one per candidate and all lie in `[1, 10]`.
//! Anything else (including decimals like `7.5`, which split into two
//! tokens) triggers the degraded fallback: every candidate scores 0.
//!
//! # Selection
//! Stable sort by score, descending. Ties resolve to the earliest candidate,
//! which also makes the all-zero fallback pick candidate 0.

use crate::error::{EngineError, EngineResult};
use crate::generation::{Conversation, GenerationClient, GenerationRequest, ModelTier};
use crate::settings::ScoringSettings;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Lowest valid score
pub const MIN_SCORE: f64 = 1.0;
/// Highest valid score
pub const MAX_SCORE: f64 = 10.0;
/// Score assigned to every candidate when the reply fails validation
pub const FALLBACK_SCORE: f64 = 0.0;

static SCORE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u:\b[0-9]+\b)").expect("score token pattern is valid"));

/// Why a scoring reply was rejected (handled internally, never surfaced)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreParseError {
    #[error("expected {expected} scores, found {found}")]
    CountMismatch { expected: usize, found: usize },

    #[error("score {0} outside [1, 10]")]
    OutOfRange(String),
}

/// One candidate with its score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    /// Position in the submitted candidate list
    pub index: usize,
    pub text: String,
    pub score: f64,
}

/// Outcome of a scoring round
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub best: ScoredCandidate,
    /// Score per candidate, in submission order
    pub scores: Vec<f64>,
    /// True when the fallback replaced the model's scores
    pub degraded: bool,
}

/// Build the single comparative scoring prompt
pub fn build_scoring_prompt(problem: &str, candidates: &[String]) -> String {
    let labelled = candidates
        .iter()
        .enumerate()
        .map(|(i, text)| format!("Response {}: {}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Score each response below from 1 to 10 by how well it solves the user's problem in \
         the way it proposes. Output ONLY the scores as comma-separated integers, one per \
         response, in the same order as the responses. No comments, labels or other text.\n\n\
         User's input: '{}'\n\n{}",
        problem, labelled
    )
}

/// Strictly parse one score per candidate from a model reply
pub fn parse_scores(response: &str, expected: usize) -> Result<Vec<f64>, ScoreParseError> {
    let tokens: Vec<&str> = SCORE_TOKEN.find_iter(response).map(|m| m.as_str()).collect();

    if tokens.len() != expected {
        return Err(ScoreParseError::CountMismatch {
            expected,
            found: tokens.len(),
        });
    }

    tokens
        .into_iter()
        .map(|token| match token.parse::<u64>() {
            Ok(value) if (MIN_SCORE..=MAX_SCORE).contains(&(value as f64)) => Ok(value as f64),
            _ => Err(ScoreParseError::OutOfRange(token.to_string())),
        })
        .collect()
}

/// Parsed scores, or all-zero scores if the reply is unusable
pub fn scores_or_fallback(response: &str, expected: usize) -> (Vec<f64>, bool) {
    match parse_scores(response, expected) {
        Ok(scores) => (scores, false),
        Err(e) => {
            warn!(error = %e, response, "Score parsing failed, using fallback scores");
            (vec![FALLBACK_SCORE; expected], true)
        }
    }
}

/// Highest score wins; ties go to the earliest candidate
pub fn select_best(candidates: &[String], scores: &[f64]) -> Option<ScoredCandidate> {
    let mut ranked: Vec<(usize, f64)> = scores
        .iter()
        .copied()
        .enumerate()
        .take(candidates.len())
        .collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    ranked.first().map(|&(index, score)| ScoredCandidate {
        index,
        text: candidates[index].clone(),
        score,
    })
}

/// Scoring client wrapper
pub struct Scorer {
    client: Arc<dyn GenerationClient>,
    system_directive: String,
    settings: ScoringSettings,
}

impl Scorer {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        system_directive: impl Into<String>,
        settings: ScoringSettings,
    ) -> Self {
        Self {
            client,
            system_directive: system_directive.into(),
            settings,
        }
    }

    /// Score all candidates in one call and pick the best
    pub async fn score(&self, problem: &str, candidates: &[String]) -> EngineResult<Selection> {
        if candidates.is_empty() {
            return Err(EngineError::NoCandidates);
        }

        let prompt = build_scoring_prompt(problem, candidates);
        debug!(candidates = candidates.len(), prompt = %prompt, "Scoring prompt");

        let request = GenerationRequest::new(
            Conversation::single_turn(&self.system_directive, prompt),
            ModelTier::Strong,
            self.settings.max_tokens,
            self.settings.temperature,
        )
        .map_err(EngineError::Scoring)?;

        let response = self
            .client
            .generate(&request)
            .await
            .map_err(EngineError::Scoring)?;
        info!(response = %response, "Scoring response");

        let (scores, degraded) = scores_or_fallback(&response, candidates.len());
        let scores_csv = scores
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        info!(scores = %scores_csv, degraded, "Candidate scores");

        let best = select_best(candidates, &scores).ok_or(EngineError::NoCandidates)?;
        debug!(index = best.index, score = best.score, "Best scored candidate");

        Ok(Selection {
            best,
            scores,
            degraded,
        })
    }
}
