//! Progress reporting for a batch run.

use rehearse_core::{ConversationTurn, EvaluationResult, Scenario};

/// Receives progress events from the scheduler and the orchestrator.
///
/// One observer is shared by every task of a run; implementations must be
/// cheap and must not block.
pub trait RunObserver: Send + Sync {
    /// A scenario acquired a worker and is about to start.
    fn on_scenario_started(&self, _index: usize, _total: usize, _scenario: &Scenario) {}

    /// A turn was appended to a scenario's transcript.
    fn on_turn(&self, _scenario: &Scenario, _turn: &ConversationTurn) {}

    /// A scenario finished, successfully or not.
    fn on_scenario_finished(&self, _index: usize, _total: usize, _result: &EvaluationResult) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRunObserver;

impl RunObserver for NoopRunObserver {}
