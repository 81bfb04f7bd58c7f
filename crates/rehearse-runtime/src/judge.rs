//! Rubric scoring of a finished conversation by a judge model.

use std::sync::Arc;

use rehearse_core::{
    parse_rubric_response, ConversationResult, LlmEvaluation, NoopToolObserver, Scenario,
};

use crate::prompts::{judge_prompt, JUDGE_SYSTEM_PROMPT};
use crate::providers::ChatMessage;
use crate::resilience::RetryPolicy;
use crate::responder::Responder;
use crate::tools::ToolSet;

/// Scores a conversation 1-5 against the judge rubric.
pub struct RubricJudge {
    responder: Arc<dyn Responder>,
    retry: RetryPolicy,
}

impl RubricJudge {
    pub fn new(responder: Arc<dyn Responder>, retry: RetryPolicy) -> Self {
        Self { responder, retry }
    }

    /// Never fails. When every attempt fails the neutral score is returned
    /// with the error in the comment.
    pub async fn evaluate(
        &self,
        scenario: &Scenario,
        conversation: &ConversationResult,
    ) -> LlmEvaluation {
        let context = [ChatMessage::user(judge_prompt(scenario, conversation))];
        let tools = ToolSet::empty();

        let reply = self
            .retry
            .run("rubric_judge", || {
                self.responder
                    .respond(JUDGE_SYSTEM_PROMPT, &context, &tools, &NoopToolObserver)
            })
            .await;

        match reply {
            Ok(reply) => parse_rubric_response(&reply),
            Err(e) => {
                tracing::warn!(scenario = %scenario.name, error = %e, "Rubric judge failed");
                LlmEvaluation::neutral(format!("Judge call failed: {e}"))
            }
        }
    }
}
