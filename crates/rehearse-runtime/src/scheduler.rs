//! Parallel execution of a scenario batch.
//!
//! One task per scenario, started `start_stagger` apart and bounded by a
//! semaphore of `workers` permits. Results come back in input order; a task
//! that panics yields an errored zero-score result in its slot.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use rehearse_core::{EvaluationResult, Scenario};

use crate::config::RuntimeConfig;
use crate::judge::RubricJudge;
use crate::observer::{NoopRunObserver, RunObserver};
use crate::orchestrator::{ConversationOrchestrator, RuntimeError};
use crate::responder::ResponderFactory;
use crate::scoring::ScoringEngine;

/// Evaluates a single scenario end to end.
#[async_trait]
pub trait ScenarioRunner: Send + Sync {
    async fn evaluate(&self, scenario: Arc<Scenario>, observer: &dyn RunObserver)
        -> EvaluationResult;
}

/// Conversation followed by scoring.
pub struct ConversationEvaluator {
    orchestrator: ConversationOrchestrator,
    scoring: ScoringEngine,
    max_turns: Option<u32>,
}

impl ConversationEvaluator {
    pub fn new(orchestrator: ConversationOrchestrator, scoring: ScoringEngine) -> Self {
        Self {
            orchestrator,
            scoring,
            max_turns: None,
        }
    }

    /// Cap every scenario's support turns.
    pub fn with_max_turns(mut self, max_turns: Option<u32>) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Wire orchestrator and scoring from a responder factory.
    pub fn from_factory(
        factory: &dyn ResponderFactory,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        let orchestrator = ConversationOrchestrator::from_factory(factory, config)?;
        let scoring = if config.llm_evaluation {
            ScoringEngine::with_judge(RubricJudge::new(factory.judge()?, config.retry_policy()))
        } else {
            ScoringEngine::deterministic()
        };
        Ok(Self::new(orchestrator, scoring).with_max_turns(config.max_turns))
    }
}

#[async_trait]
impl ScenarioRunner for ConversationEvaluator {
    async fn evaluate(
        &self,
        scenario: Arc<Scenario>,
        observer: &dyn RunObserver,
    ) -> EvaluationResult {
        let conversation = self
            .orchestrator
            .run(&scenario, self.max_turns, observer)
            .await;
        self.scoring.score(scenario, conversation).await
    }
}

/// Runs scenarios concurrently and collects results in input order.
pub struct ParallelScheduler {
    workers: usize,
    start_stagger: Duration,
    observer: Arc<dyn RunObserver>,
}

impl ParallelScheduler {
    pub fn new(workers: usize, start_stagger: Duration) -> Self {
        Self {
            workers: workers.max(1),
            start_stagger,
            observer: Arc::new(NoopRunObserver),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.workers, config.start_stagger)
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Evaluate every scenario. The output has one result per input, in
    /// input order, whatever order the tasks finish in.
    pub async fn run_all(
        &self,
        runner: Arc<dyn ScenarioRunner>,
        scenarios: &[Arc<Scenario>],
    ) -> Vec<EvaluationResult> {
        let total = scenarios.len();
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        tracing::info!(
            scenarios = total,
            workers = self.workers,
            stagger = ?self.start_stagger,
            "Starting evaluation run"
        );

        for (index, scenario) in scenarios.iter().enumerate() {
            if index > 0 && !self.start_stagger.is_zero() {
                tokio::time::sleep(self.start_stagger).await;
            }

            let runner = Arc::clone(&runner);
            let observer = Arc::clone(&self.observer);
            let permits = Arc::clone(&permits);
            let scenario = Arc::clone(scenario);

            tasks.spawn(async move {
                let task_scenario = Arc::clone(&scenario);
                let outcome = AssertUnwindSafe(async move {
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await.ok();
                    observer.on_scenario_started(index, total, &task_scenario);
                    let result = runner
                        .evaluate(Arc::clone(&task_scenario), observer.as_ref())
                        .await;
                    observer.on_scenario_finished(index, total, &result);
                    result
                })
                .catch_unwind()
                .await;

                let result = outcome.unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(
                        scenario = %scenario.name,
                        panic = %message,
                        "Scenario task panicked"
                    );
                    EvaluationResult::failed(scenario, format!("Scenario task panicked: {message}"))
                });
                (index, result)
            });
        }

        let mut slots: Vec<Option<EvaluationResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Scenario task did not complete"),
            }
        }

        slots
            .into_iter()
            .zip(scenarios)
            .map(|(slot, scenario)| {
                slot.unwrap_or_else(|| {
                    EvaluationResult::failed(Arc::clone(scenario), "Scenario task did not complete")
                })
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TerminationClassifier;
    use crate::providers::ChatMessage;
    use crate::resilience::RetryPolicy;
    use crate::responder::{Responder, ResponderError};
    use crate::testing::ScriptedResponder;
    use crate::tools::ToolSet;
    use parking_lot::Mutex;
    use rehearse_core::{ConversationResult, ConversationTurn, ScenarioSet, ToolObserver};
    use tokio::time::Instant;

    fn scenarios(n: usize) -> Vec<Arc<Scenario>> {
        let entries: Vec<String> = (0..n)
            .map(|i| {
                format!(
                    r#"{{"name": "s{i}", "description": "d", "initial_query": "q",
                        "expected_topics": ["ok"]}}"#
                )
            })
            .collect();
        let json = format!(
            r#"{{"version": "1.0", "scenarios": [{}]}}"#,
            entries.join(",")
        );
        ScenarioSet::from_json(&json).unwrap().scenarios
    }

    /// Sleeps a per-scenario delay, panics on request, and records start times.
    struct MockRunner {
        delays: Vec<Duration>,
        panic_on: Option<usize>,
        started: Mutex<Vec<(usize, Instant)>>,
        in_flight: Mutex<(usize, usize)>,
    }

    impl MockRunner {
        fn new(delays: Vec<Duration>) -> Self {
            Self {
                delays,
                panic_on: None,
                started: Mutex::new(Vec::new()),
                in_flight: Mutex::new((0, 0)),
            }
        }
    }

    fn index_of(scenario: &Scenario) -> usize {
        scenario.name[1..].parse().unwrap()
    }

    #[async_trait]
    impl ScenarioRunner for MockRunner {
        async fn evaluate(
            &self,
            scenario: Arc<Scenario>,
            _observer: &dyn RunObserver,
        ) -> EvaluationResult {
            let index = index_of(&scenario);
            self.started.lock().push((index, Instant::now()));
            {
                let mut in_flight = self.in_flight.lock();
                in_flight.0 += 1;
                in_flight.1 = in_flight.1.max(in_flight.0);
            }

            tokio::time::sleep(self.delays[index]).await;
            self.in_flight.lock().0 -= 1;

            if self.panic_on == Some(index) {
                panic!("runner blew up on {}", scenario.name);
            }

            let mut convo = ConversationResult::new(scenario.name.clone());
            convo.turns.push(ConversationTurn::user(1, "q"));
            convo.turns.push(ConversationTurn::support(1, "ok", vec![]));
            convo.completed = true;
            EvaluationResult::from_conversation(scenario, convo)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let delays = [50, 10, 30, 5, 20]
            .into_iter()
            .map(Duration::from_millis)
            .collect();
        let runner = Arc::new(MockRunner::new(delays));
        let scenarios = scenarios(5);

        let results = ParallelScheduler::new(5, Duration::ZERO)
            .run_all(runner, &scenarios)
            .await;

        let names: Vec<&str> = results.iter().map(|r| r.scenario.name.as_str()).collect();
        assert_eq!(names, ["s0", "s1", "s2", "s3", "s4"]);
        assert!(results.iter().all(|r| r.score == 1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_isolated() {
        let mut runner = MockRunner::new(vec![Duration::from_millis(10); 4]);
        runner.panic_on = Some(2);
        let scenarios = scenarios(4);

        let results = ParallelScheduler::new(2, Duration::ZERO)
            .run_all(Arc::new(runner), &scenarios)
            .await;

        assert_eq!(results.len(), 4);
        let errored: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_error())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(errored, vec![2]);
        assert_eq!(results[2].score, 0.0);
        assert_eq!(results[2].scenario.name, "s2");
        assert!(results[2].error().unwrap().contains("runner blew up on s2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_are_staggered() {
        let runner = Arc::new(MockRunner::new(vec![Duration::from_secs(10); 3]));
        let scenarios = scenarios(3);
        let begin = Instant::now();

        ParallelScheduler::new(3, Duration::from_secs(1))
            .run_all(runner.clone(), &scenarios)
            .await;

        let mut started = runner.started.lock().clone();
        started.sort_by_key(|(index, _)| *index);
        let offsets: Vec<u64> = started
            .iter()
            .map(|(_, at)| at.duration_since(begin).as_secs())
            .collect();
        // Submissions are spaced; nobody waits for the previous one to finish
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_limit_bounds_concurrency() {
        let runner = Arc::new(MockRunner::new(vec![Duration::from_millis(100); 6]));
        let scenarios = scenarios(6);

        let results = ParallelScheduler::new(2, Duration::ZERO)
            .run_all(runner.clone(), &scenarios)
            .await;

        assert_eq!(results.len(), 6);
        assert_eq!(runner.in_flight.lock().1, 2);
    }

    #[derive(Default)]
    struct Progress(Mutex<Vec<String>>);

    impl RunObserver for Progress {
        fn on_scenario_started(&self, index: usize, total: usize, _scenario: &Scenario) {
            self.0.lock().push(format!("start {index}/{total}"));
        }

        fn on_scenario_finished(&self, index: usize, total: usize, _result: &EvaluationResult) {
            self.0.lock().push(format!("done {index}/{total}"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_progress() {
        let runner = Arc::new(MockRunner::new(vec![Duration::from_millis(5); 2]));
        let progress = Arc::new(Progress::default());

        ParallelScheduler::new(1, Duration::ZERO)
            .with_observer(progress.clone())
            .run_all(runner, &scenarios(2))
            .await;

        let events = progress.0.lock().clone();
        assert_eq!(events.len(), 4);
        assert!(events.contains(&"start 0/2".to_string()));
        assert!(events.contains(&"done 1/2".to_string()));
    }

    /// Answers "ok" unless the customer's opening mentions "broken".
    struct FailsOnBroken;

    #[async_trait]
    impl Responder for FailsOnBroken {
        async fn respond(
            &self,
            _system_prompt: &str,
            context: &[ChatMessage],
            _tools: &ToolSet,
            _observer: &dyn ToolObserver,
        ) -> Result<String, ResponderError> {
            if context.iter().any(|m| m.content.contains("broken")) {
                Err(ResponderError::Failed("support backend down".to_string()))
            } else {
                Ok("ok".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_responder_error_is_isolated() {
        let json = r#"{"version": "1.0", "scenarios": [
            {"name": "first", "description": "d", "initial_query": "q0", "expected_topics": ["ok"]},
            {"name": "second", "description": "d", "initial_query": "broken",
             "expected_topics": ["ok"]},
            {"name": "third", "description": "d", "initial_query": "q2", "expected_topics": ["ok"]}
        ]}"#;
        let scenarios = ScenarioSet::from_json(json).unwrap().scenarios;

        let classifier = TerminationClassifier::new(
            Arc::new(ScriptedResponder::numbered("CONTINUE")),
            RetryPolicy::new(1, Duration::from_millis(1)),
        );
        let orchestrator = ConversationOrchestrator::new(
            Arc::new(FailsOnBroken),
            Arc::new(ScriptedResponder::numbered("user")),
            classifier,
            ToolSet::empty(),
        );
        let evaluator = ConversationEvaluator::new(orchestrator, ScoringEngine::deterministic())
            .with_max_turns(Some(1));

        let results = ParallelScheduler::new(3, Duration::ZERO)
            .run_all(Arc::new(evaluator), &scenarios)
            .await;

        let errored: Vec<&str> = results
            .iter()
            .filter(|r| r.is_error())
            .map(|r| r.scenario.name.as_str())
            .collect();
        assert_eq!(errored, ["second"]);
        assert_eq!(results[1].score, 0.0);
        let error = results[1].error().unwrap();
        assert!(error.contains("Support turn 1 failed"));
        assert!(error.contains("support backend down"));

        for neighbour in [&results[0], &results[2]] {
            assert_eq!(neighbour.score, 1.0);
            assert!(neighbour.error().is_none());
            assert_eq!(neighbour.turn_count, 1);
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let runner = Arc::new(MockRunner::new(vec![]));
        let results = ParallelScheduler::new(3, Duration::from_secs(1))
            .run_all(runner, &[])
            .await;
        assert!(results.is_empty());
    }
}
