//! Text generation behind a single seam.
//!
//! The orchestrator, classifier and judge only ever see a [`Responder`]:
//! system prompt plus context in, text out. [`LlmResponder`] implements it
//! over an [`LlmProvider`] and runs the tool-call loop, reporting each call
//! to the run's [`ToolObserver`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use rehearse_core::ToolObserver;

use crate::orchestrator::RuntimeError;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::tools::ToolSet;

/// Default bound on model/tool round trips per response.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// Errors from a responder call.
#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Responder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model was still requesting tools after {0} rounds")]
    ToolRoundsExhausted(usize),

    #[error("Responder failed: {0}")]
    Failed(String),
}

/// Maps a prompt, context and tool set to text.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Produce the next message.
    ///
    /// `context` is the conversation so far from this responder's point of
    /// view and ends with the message to answer. Tool calls made along the
    /// way are reported to `observer`.
    async fn respond(
        &self,
        system_prompt: &str,
        context: &[ChatMessage],
        tools: &ToolSet,
        observer: &dyn ToolObserver,
    ) -> Result<String, ResponderError>;
}

/// Hands out the responders and tools a run needs.
pub trait ResponderFactory: Send + Sync {
    /// Answers as the service under test.
    fn support(&self) -> Result<Arc<dyn Responder>, RuntimeError>;

    /// Plays the customer.
    fn counterpart(&self) -> Result<Arc<dyn Responder>, RuntimeError>;

    /// Backs the termination classifier and the rubric judge.
    fn judge(&self) -> Result<Arc<dyn Responder>, RuntimeError>;

    /// Tools offered to the support responder.
    fn support_tools(&self) -> ToolSet;
}

/// [`Responder`] over an LLM provider.
pub struct LlmResponder {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    max_tool_rounds: usize,
}

impl LlmResponder {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self {
            provider,
            config,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Responder for LlmResponder {
    async fn respond(
        &self,
        system_prompt: &str,
        context: &[ChatMessage],
        tools: &ToolSet,
        observer: &dyn ToolObserver,
    ) -> Result<String, ResponderError> {
        let specs = tools.specs();
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend_from_slice(context);

        for round in 0..=self.max_tool_rounds {
            let response = self
                .provider
                .complete(messages.clone(), &specs, &self.config)
                .await?;

            if response.tool_calls.is_empty() {
                return Ok(response.content);
            }

            if round == self.max_tool_rounds {
                break;
            }

            tracing::debug!(
                provider = self.provider.name(),
                round,
                calls = response.tool_calls.len(),
                "Model requested tool calls"
            );

            let calls = response.tool_calls.clone();
            messages.push(ChatMessage::assistant_with_tools(
                response.content,
                response.tool_calls,
            ));

            for call in calls {
                observer.before_tool_call(&call.id, &call.name, &call.input);
                let output = tools.invoke(&call.name, &call.input).await;
                observer.after_tool_call(&call.id, &output);
                messages.push(ChatMessage::tool_result(call.id, output));
            }
        }

        Err(ResponderError::ToolRoundsExhausted(self.max_tool_rounds))
    }
}
