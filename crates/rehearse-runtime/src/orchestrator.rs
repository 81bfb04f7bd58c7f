//! Conversation orchestrator.
//!
//! Drives one scenario as a turn-based exchange between the support
//! responder and the simulated customer:
//! - `Start` emits the scenario's opening query as user turn 1
//! - `SupportTurn` answers with the knowledge tool available and records the
//!   tool calls made while answering
//! - `UserTurn` asks the customer for the next message, steered by the
//!   scenario's conversation flow, then asks the classifier whether the
//!   customer is done
//!
//! Every responder call is bounded by `call_timeout`. A failed call ends the
//! run with the partial transcript and an error.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use rehearse_core::{
    ConversationResult, ConversationTurn, NoopToolObserver, Scenario, ToolUsageRecorder,
};

use crate::classifier::TerminationClassifier;
use crate::config::{ConfigError, RuntimeConfig};
use crate::observer::RunObserver;
use crate::prompts::{
    counterpart_system_prompt, user_turn_prompt, TurnGuidance, SUPPORT_SYSTEM_PROMPT,
};
use crate::providers::{ChatMessage, ProviderError};
use crate::responder::{Responder, ResponderError, ResponderFactory};
use crate::tools::ToolSet;

/// Errors setting up the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Support-turn limit for a run: the override can only lower it.
pub fn effective_max_turns(scenario_max: u32, override_max: Option<u32>) -> u32 {
    match override_max {
        Some(limit) => limit.min(scenario_max),
        None => scenario_max,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    MaxTurns,
    Natural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    /// Produce support turn `n`
    SupportTurn(u32),
    /// Produce the customer's reply to support turn `n`
    UserTurn(u32),
    Halt(Ending),
}

/// Runs scenarios as conversations.
pub struct ConversationOrchestrator {
    support: Arc<dyn Responder>,
    counterpart: Arc<dyn Responder>,
    classifier: TerminationClassifier,
    tools: ToolSet,
    call_timeout: Duration,
}

impl ConversationOrchestrator {
    pub fn new(
        support: Arc<dyn Responder>,
        counterpart: Arc<dyn Responder>,
        classifier: TerminationClassifier,
        tools: ToolSet,
    ) -> Self {
        Self {
            support,
            counterpart,
            classifier,
            tools,
            call_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Build from a responder factory and the runtime configuration.
    pub fn from_factory(
        factory: &dyn ResponderFactory,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        let classifier = TerminationClassifier::new(factory.judge()?, config.retry_policy());
        Ok(Self::new(
            factory.support()?,
            factory.counterpart()?,
            classifier,
            factory.support_tools(),
        )
        .with_call_timeout(config.call_timeout))
    }

    /// Run one scenario to its end.
    ///
    /// Never fails: a failed responder call is recorded in
    /// [`ConversationResult::error`] next to the turns produced so far.
    pub async fn run(
        &self,
        scenario: &Scenario,
        max_turns: Option<u32>,
        observer: &dyn RunObserver,
    ) -> ConversationResult {
        let mut conversation = ConversationResult::new(scenario.name.clone());

        match self
            .drive(scenario, max_turns, observer, &mut conversation)
            .await
        {
            Ok(ending) => {
                conversation.completed = true;
                conversation.natural_end = ending == Ending::Natural;
                tracing::debug!(
                    scenario = %scenario.name,
                    support_turns = conversation.support_turn_count(),
                    natural_end = conversation.natural_end,
                    "Conversation finished"
                );
            }
            Err(e) => {
                tracing::warn!(
                    scenario = %scenario.name,
                    turns = conversation.turns.len(),
                    error = %e,
                    "Conversation aborted"
                );
                conversation.error = Some(e);
            }
        }

        conversation
    }

    async fn drive(
        &self,
        scenario: &Scenario,
        max_turns: Option<u32>,
        observer: &dyn RunObserver,
        conversation: &mut ConversationResult,
    ) -> Result<Ending, String> {
        let limit = effective_max_turns(scenario.max_turns, max_turns);
        let persona_prompt = counterpart_system_prompt(scenario, limit);
        let recorder = ToolUsageRecorder::new();
        let no_tools = ToolSet::empty();
        let mut state = State::Start;

        loop {
            state = match state {
                State::Start => {
                    push(
                        conversation,
                        scenario,
                        observer,
                        ConversationTurn::user(1, scenario.initial_query.clone()),
                    );
                    State::SupportTurn(1)
                }

                State::SupportTurn(n) => {
                    recorder.drain();
                    let context = support_context(conversation);
                    let reply = self
                        .bounded(self.support.respond(
                            SUPPORT_SYSTEM_PROMPT,
                            &context,
                            &self.tools,
                            &recorder,
                        ))
                        .await
                        .map_err(|e| format!("Support turn {n} failed: {e}"))?;

                    let tool_uses = recorder.drain();
                    push(
                        conversation,
                        scenario,
                        observer,
                        ConversationTurn::support(n, reply, tool_uses),
                    );

                    if n >= limit {
                        State::Halt(Ending::MaxTurns)
                    } else {
                        State::UserTurn(n)
                    }
                }

                State::UserTurn(n) => {
                    let context = counterpart_context(conversation, flow_guidance(scenario, n));
                    let reply = self
                        .bounded(self.counterpart.respond(
                            &persona_prompt,
                            &context,
                            &no_tools,
                            &NoopToolObserver,
                        ))
                        .await
                        .map_err(|e| format!("Customer turn {} failed: {e}", n + 1))?;

                    let ending = self.classifier.classify(&reply).await;
                    push(
                        conversation,
                        scenario,
                        observer,
                        ConversationTurn::user(n + 1, reply),
                    );

                    if ending {
                        State::Halt(Ending::Natural)
                    } else {
                        State::SupportTurn(n + 1)
                    }
                }

                State::Halt(ending) => return Ok(ending),
            };
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<String, ResponderError>
    where
        F: std::future::Future<Output = Result<String, ResponderError>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| ResponderError::Timeout(self.call_timeout))?
    }
}

fn push(
    conversation: &mut ConversationResult,
    scenario: &Scenario,
    observer: &dyn RunObserver,
    turn: ConversationTurn,
) {
    observer.on_turn(scenario, &turn);
    conversation.turns.push(turn);
}

/// Guidance for the customer's reply to support turn `support_turn`.
fn flow_guidance(scenario: &Scenario, support_turn: u32) -> TurnGuidance<'_> {
    match scenario.flow_step(support_turn) {
        Some(step) => match step.user_response_hint.as_deref() {
            Some(hint) => TurnGuidance::Hint(hint),
            None => TurnGuidance::Close,
        },
        None => TurnGuidance::None,
    }
}

/// The transcript from the support side: customer messages are user input.
fn support_context(conversation: &ConversationResult) -> Vec<ChatMessage> {
    conversation
        .turns
        .iter()
        .map(|turn| {
            if turn.is_support() {
                ChatMessage::assistant(turn.message.clone())
            } else {
                ChatMessage::user(turn.message.clone())
            }
        })
        .collect()
}

/// The transcript from the customer's side.
///
/// Each support message becomes a prompt asking for the customer's reply and
/// the customer's own messages after the opening are the assistant side.
/// Guidance is attached to the latest prompt only.
fn counterpart_context(
    conversation: &ConversationResult,
    guidance: TurnGuidance<'_>,
) -> Vec<ChatMessage> {
    let support_count = conversation.support_turn_count();
    let mut context = Vec::with_capacity(support_count * 2);
    let mut seen_support = 0;

    for turn in &conversation.turns {
        if turn.is_support() {
            seen_support += 1;
            let guidance = if seen_support == support_count {
                guidance
            } else {
                TurnGuidance::None
            };
            context.push(ChatMessage::user(user_turn_prompt(&turn.message, guidance)));
        } else if turn.turn_number > 1 {
            context.push(ChatMessage::assistant(turn.message.clone()));
        }
    }

    context
}
