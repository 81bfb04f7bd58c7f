//! Evaluation results and batch summaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::conversation::ConversationResult;
use crate::scenario::Scenario;
use crate::scoring::{score_topics, TopicCoverage};

/// Topic score at or above which a scenario passes.
pub const PASS_THRESHOLD: f64 = 0.7;

/// Topic score at or above which a failing scenario is reported as partial.
pub const PARTIAL_THRESHOLD: f64 = 0.4;

/// Lowest rubric score.
pub const MIN_LLM_SCORE: u8 = 1;

/// Highest rubric score.
pub const MAX_LLM_SCORE: u8 = 5;

/// Rubric score used when the judge reply cannot be used.
pub const NEUTRAL_LLM_SCORE: u8 = 3;

/// Holistic 1-5 judgement of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmEvaluation {
    /// Always within `MIN_LLM_SCORE..=MAX_LLM_SCORE`
    pub score: u8,

    pub comment: String,
}

impl LlmEvaluation {
    /// Build an evaluation, clamping the score into the rubric range.
    pub fn new(score: i64, comment: impl Into<String>) -> Self {
        let clamped = score.clamp(MIN_LLM_SCORE as i64, MAX_LLM_SCORE as i64) as u8;
        Self {
            score: clamped,
            comment: comment.into(),
        }
    }

    /// Neutral evaluation standing in for a judge that could not be reached.
    pub fn neutral(comment: impl Into<String>) -> Self {
        Self::new(NEUTRAL_LLM_SCORE as i64, comment)
    }
}

/// Pass/partial/fail banding of a topic score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Partial,
    Fail,
}

impl Status {
    pub fn from_score(score: f64) -> Self {
        if score >= PASS_THRESHOLD {
            Status::Pass
        } else if score >= PARTIAL_THRESHOLD {
            Status::Partial
        } else {
            Status::Fail
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pass => "PASS",
            Status::Partial => "PARTIAL",
            Status::Fail => "FAIL",
        })
    }
}

/// The scored outcome of one scenario.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// The scenario, shared with the rest of the batch
    pub scenario: Arc<Scenario>,

    pub conversation: ConversationResult,

    pub topics_covered: Vec<String>,

    pub topics_missing: Vec<String>,

    /// Topic coverage in `[0.0, 1.0]`, 0.0 for errored conversations
    pub score: f64,

    /// Number of support turns
    pub turn_count: usize,

    /// Rubric judgement, `None` when the rubric pass was skipped
    pub llm_evaluation: Option<LlmEvaluation>,
}

impl EvaluationResult {
    /// Score a conversation deterministically (no rubric pass).
    pub fn from_conversation(scenario: Arc<Scenario>, conversation: ConversationResult) -> Self {
        let TopicCoverage {
            covered,
            missing,
            score,
        } = score_topics(&scenario, &conversation);
        let turn_count = conversation.support_turn_count();

        Self {
            scenario,
            conversation,
            topics_covered: covered,
            topics_missing: missing,
            score,
            turn_count,
            llm_evaluation: None,
        }
    }

    /// Zero-score result for a scenario whose run failed outright.
    pub fn failed(scenario: Arc<Scenario>, error: impl Into<String>) -> Self {
        let conversation = ConversationResult::failed(scenario.name.clone(), error);
        Self::from_conversation(scenario, conversation)
    }

    pub fn with_llm_evaluation(mut self, evaluation: Option<LlmEvaluation>) -> Self {
        self.llm_evaluation = evaluation;
        self
    }

    pub fn status(&self) -> Status {
        Status::from_score(self.score)
    }

    pub fn is_error(&self) -> bool {
        self.conversation.is_error()
    }

    pub fn error(&self) -> Option<&str> {
        self.conversation.error.as_deref()
    }
}

/// Aggregate figures over a batch of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total: usize,
    pub passed: usize,
    pub partial: usize,
    pub failed: usize,
    pub errored: usize,
    pub average_score: f64,
    pub average_turns: f64,
    /// `None` when no result carries a rubric judgement
    pub average_llm_score: Option<f64>,
}

impl EvaluationSummary {
    pub fn from_results(results: &[EvaluationResult]) -> Self {
        let total = results.len();
        let count = |status: Status| results.iter().filter(|r| r.status() == status).count();

        let mean = |sum: f64, n: usize| if n == 0 { 0.0 } else { sum / n as f64 };

        let llm_scores: Vec<f64> = results
            .iter()
            .filter_map(|r| r.llm_evaluation.as_ref())
            .map(|e| e.score as f64)
            .collect();

        Self {
            total,
            passed: count(Status::Pass),
            partial: count(Status::Partial),
            failed: count(Status::Fail),
            errored: results.iter().filter(|r| r.is_error()).count(),
            average_score: mean(results.iter().map(|r| r.score).sum(), total),
            average_turns: mean(results.iter().map(|r| r.turn_count as f64).sum(), total),
            average_llm_score: (!llm_scores.is_empty())
                .then(|| llm_scores.iter().sum::<f64>() / llm_scores.len() as f64),
        }
    }
}
