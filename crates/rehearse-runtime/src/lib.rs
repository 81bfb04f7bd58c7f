//! # rehearse-runtime
//!
//! Model-backed half of the rehearse conversation evaluator.
//!
//! This crate runs scenarios as simulated conversations between a support
//! responder and a persona-driven customer, decides when the customer is
//! done, scores the result and runs whole batches in parallel.
//!
//! ## Pieces
//!
//! - [`ConversationOrchestrator`]: the turn state machine for one scenario
//! - [`TerminationClassifier`]: asks a light model whether the customer ended
//! - [`ScoringEngine`]: topic coverage plus an optional [`RubricJudge`]
//! - [`ParallelScheduler`]: bounded, staggered, panic-isolated batch runs
//! - [`EvalContext`]: configuration, provider clients and the knowledge index
//!
//! Deterministic pieces (scenario loading, scoring rules, reply parsing)
//! live in `rehearse-core`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rehearse_core::ScenarioSet;
//! use rehearse_runtime::{EvalContext, RuntimeConfig};
//!
//! let set = ScenarioSet::from_file("scenarios/default_scenarios.json")?;
//! let context = EvalContext::new(RuntimeConfig::default())?;
//! let evaluator = Arc::new(context.evaluator()?);
//! let results = context.scheduler().run_all(evaluator, &set.scenarios).await;
//! ```

pub mod classifier;
pub mod config;
pub mod context;
pub mod judge;
pub mod observer;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod responder;
pub mod scheduler;
pub mod scoring;
pub mod tools;

#[cfg(test)]
mod testing;

pub use classifier::TerminationClassifier;
pub use config::{ConfigError, ModelSettings, ModelTier, ProviderSettings, RuntimeConfig};
pub use context::EvalContext;
pub use judge::RubricJudge;
pub use observer::{NoopRunObserver, RunObserver};
pub use orchestrator::{effective_max_turns, ConversationOrchestrator, RuntimeError};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use resilience::RetryPolicy;
pub use responder::{LlmResponder, Responder, ResponderError, ResponderFactory};
pub use scheduler::{ConversationEvaluator, ParallelScheduler, ScenarioRunner};
pub use scoring::ScoringEngine;
pub use tools::{KnowledgeIndex, KnowledgeTool, Tool, ToolSet};
