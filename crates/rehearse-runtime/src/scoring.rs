//! Scoring of finished conversations.

use std::sync::Arc;

use rehearse_core::{ConversationResult, EvaluationResult, Scenario};

use crate::judge::RubricJudge;

/// Deterministic topic coverage plus an optional rubric judgement.
pub struct ScoringEngine {
    judge: Option<RubricJudge>,
}

impl ScoringEngine {
    /// Topic coverage only.
    pub fn deterministic() -> Self {
        Self { judge: None }
    }

    pub fn with_judge(judge: RubricJudge) -> Self {
        Self { judge: Some(judge) }
    }

    /// Score a conversation. The judge is not consulted for errored runs.
    pub async fn score(
        &self,
        scenario: Arc<Scenario>,
        conversation: ConversationResult,
    ) -> EvaluationResult {
        let result = EvaluationResult::from_conversation(scenario, conversation);

        match &self.judge {
            Some(judge) if !result.is_error() => {
                let evaluation = judge.evaluate(&result.scenario, &result.conversation).await;
                tracing::debug!(
                    scenario = %result.scenario.name,
                    llm_score = evaluation.score,
                    "Rubric judgement"
                );
                result.with_llm_evaluation(Some(evaluation))
            }
            _ => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::RetryPolicy;
    use crate::testing::ScriptedResponder;
    use proptest::prelude::*;
    use rehearse_core::{ConversationTurn, ScenarioSet};

    fn scenario() -> Arc<Scenario> {
        let set = ScenarioSet::from_json(
            r#"{"version": "1.0", "scenarios": [{
                "name": "topics", "description": "Cover three topics",
                "initial_query": "Tell me everything",
                "expected_topics": ["A", "B", "C"]
            }]}"#,
        )
        .unwrap();
        Arc::clone(&set.scenarios[0])
    }

    fn conversation(support: &str) -> ConversationResult {
        let mut convo = ConversationResult::new("topics");
        convo.turns.push(ConversationTurn::user(1, "Tell me everything"));
        convo.turns.push(ConversationTurn::support(1, support, vec![]));
        convo.completed = true;
        convo
    }

    #[tokio::test]
    async fn test_partial_topic_coverage() {
        let engine = ScoringEngine::deterministic();
        let result = engine.score(scenario(), conversation("A and C")).await;

        assert_eq!(result.topics_covered, vec!["A", "C"]);
        assert_eq!(result.topics_missing, vec!["B"]);
        assert!((result.score - 2.0 / 3.0).abs() < 1e-9);
        assert!(result.llm_evaluation.is_none());
    }

    #[tokio::test]
    async fn test_judge_attached() {
        let judge = RubricJudge::new(
            Arc::new(ScriptedResponder::replies(["SCORE: 5\nCOMMENT: Complete."])),
            RetryPolicy::default(),
        );
        let engine = ScoringEngine::with_judge(judge);

        let result = engine.score(scenario(), conversation("A B C")).await;
        assert_eq!(result.score, 1.0);
        assert_eq!(result.llm_evaluation.unwrap().score, 5);
    }

    #[tokio::test]
    async fn test_judge_skipped_for_errored_run() {
        let responder = Arc::new(ScriptedResponder::replies(["SCORE: 5"]));
        let engine = ScoringEngine::with_judge(RubricJudge::new(
            responder.clone(),
            RetryPolicy::default(),
        ));

        let mut convo = conversation("A B C");
        convo.error = Some("Support turn 2 failed".to_string());
        convo.completed = false;

        let result = engine.score(scenario(), convo).await;
        assert_eq!(result.score, 0.0);
        assert!(result.llm_evaluation.is_none());
        assert_eq!(responder.calls(), 0);
    }

    proptest! {
        #[test]
        fn score_is_bounded_and_idempotent(text in "[ABC xyz]{0,40}") {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let engine = ScoringEngine::deterministic();

            let first = runtime.block_on(engine.score(scenario(), conversation(&text)));
            let second = runtime.block_on(engine.score(scenario(), conversation(&text)));

            prop_assert!((0.0..=1.0).contains(&first.score));
            prop_assert_eq!(first.score, second.score);
            prop_assert_eq!(first.topics_covered.len() + first.topics_missing.len(), 3);
        }
    }
}
