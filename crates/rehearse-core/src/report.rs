//! Machine-readable export of evaluation results.
//!
//! The archive carries the batch summary plus, per scenario, the full turn
//! trace with tool usage. `llm_evaluation` is written as `null` when the
//! rubric pass was skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::conversation::ConversationTurn;
use crate::evaluation::{EvaluationResult, EvaluationSummary, LlmEvaluation, Status};
use crate::scenario::Scenario;

/// Errors from writing an archive.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write results: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to serialize results: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Serializable view over a batch of results.
#[derive(Debug, Serialize)]
pub struct ResultsArchive<'a> {
    pub generated_at: DateTime<Utc>,
    pub summary: EvaluationSummary,
    pub results: Vec<ArchivedResult<'a>>,
}

/// One scenario's entry in the archive.
#[derive(Debug, Serialize)]
pub struct ArchivedResult<'a> {
    pub scenario: &'a Scenario,
    pub status: Status,
    pub score: f64,
    pub turn_count: usize,
    pub topics_covered: &'a [String],
    pub topics_missing: &'a [String],
    pub completed: bool,
    pub natural_end: bool,
    pub error: Option<&'a str>,
    pub llm_evaluation: Option<&'a LlmEvaluation>,
    pub conversation: &'a [ConversationTurn],
}

impl<'a> ResultsArchive<'a> {
    pub fn new(results: &'a [EvaluationResult]) -> Self {
        Self::at(results, Utc::now())
    }

    /// Build an archive with an explicit timestamp.
    pub fn at(results: &'a [EvaluationResult], generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            summary: EvaluationSummary::from_results(results),
            results: results.iter().map(ArchivedResult::from).collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the archive to `path`, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<PathBuf, ReportError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_pretty()?)?;
        Ok(path.to_path_buf())
    }
}

impl<'a> From<&'a EvaluationResult> for ArchivedResult<'a> {
    fn from(result: &'a EvaluationResult) -> Self {
        Self {
            scenario: result.scenario.as_ref(),
            status: result.status(),
            score: result.score,
            turn_count: result.turn_count,
            topics_covered: &result.topics_covered,
            topics_missing: &result.topics_missing,
            completed: result.conversation.completed,
            natural_end: result.conversation.natural_end,
            error: result.error(),
            llm_evaluation: result.llm_evaluation.as_ref(),
            conversation: &result.conversation.turns,
        }
    }
}
