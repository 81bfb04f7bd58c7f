//! # rehearse-core
//!
//! Deterministic half of the rehearse conversation evaluator.
//!
//! This crate owns everything that can be decided without a model call:
//! - Loading and validating scenario documents
//! - The turn-level conversation data model
//! - Tool-call recording for support turns
//! - Topic-coverage scoring and pass/partial/fail banding
//! - Parsing of classifier and judge replies
//! - The results archive
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the same scenario and conversation always score the same
//! 2. **No LLM calls**: model access lives in `rehearse-runtime`
//! 3. **Total parsing**: judge replies never fail to parse, they degrade to defaults
//!
//! ## Example
//!
//! ```rust,ignore
//! use rehearse_core::{EvaluationResult, ScenarioSet};
//!
//! let set = ScenarioSet::from_file("scenarios/default_scenarios.json")?;
//! for scenario in &set.scenarios {
//!     println!("{} ({} turns max)", scenario.name, scenario.max_turns);
//! }
//! ```

pub mod conversation;
pub mod evaluation;
pub mod judgement;
pub mod recorder;
pub mod report;
pub mod scenario;
pub mod scoring;

// Re-export main types at crate root
pub use conversation::{ConversationResult, ConversationTurn, Role, ToolUsage};
pub use evaluation::{
    EvaluationResult, EvaluationSummary, LlmEvaluation, Status, NEUTRAL_LLM_SCORE,
    PARTIAL_THRESHOLD, PASS_THRESHOLD,
};
pub use judgement::{parse_rubric_response, parse_termination_verdict};
pub use recorder::{NoopToolObserver, ToolObserver, ToolUsageRecorder};
pub use report::{ArchivedResult, ReportError, ResultsArchive};
pub use scenario::{
    ConversationFlowStep, Persona, Scenario, ScenarioError, ScenarioSet, DEFAULT_MAX_TURNS,
};
pub use scoring::{score_topic_list, score_topics, TopicCoverage};
