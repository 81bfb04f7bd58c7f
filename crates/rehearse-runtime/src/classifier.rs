//! Model-assisted detection of the customer ending the conversation.

use std::sync::Arc;

use rehearse_core::{parse_termination_verdict, NoopToolObserver};

use crate::prompts::{classifier_prompt, CLASSIFIER_SYSTEM_PROMPT};
use crate::providers::ChatMessage;
use crate::resilience::RetryPolicy;
use crate::responder::Responder;
use crate::tools::ToolSet;

/// Asks a judge responder whether a customer message ends the conversation.
pub struct TerminationClassifier {
    responder: Arc<dyn Responder>,
    retry: RetryPolicy,
}

impl TerminationClassifier {
    pub fn new(responder: Arc<dyn Responder>, retry: RetryPolicy) -> Self {
        Self { responder, retry }
    }

    /// `true` when the message signals the end of the conversation.
    ///
    /// Never fails: once every attempt has failed the conversation is
    /// assumed to continue.
    pub async fn classify(&self, user_message: &str) -> bool {
        let context = [ChatMessage::user(classifier_prompt(user_message))];
        let tools = ToolSet::empty();

        let reply = self
            .retry
            .run("termination_classifier", || {
                self.responder
                    .respond(CLASSIFIER_SYSTEM_PROMPT, &context, &tools, &NoopToolObserver)
            })
            .await;

        match reply {
            Ok(reply) => {
                let ending = parse_termination_verdict(&reply);
                tracing::debug!(ending, reply = %reply.trim(), "Termination verdict");
                ending
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempts = self.retry.max_attempts,
                    "Termination classifier unavailable, continuing conversation"
                );
                false
            }
        }
    }
}
