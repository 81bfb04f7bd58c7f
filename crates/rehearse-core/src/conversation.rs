//! Turn-level data model for simulated conversations.
//!
//! A conversation is an append-only list of turns produced by exactly one
//! orchestrator run. Once the run returns, the result is never mutated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The simulated customer.
    User,
    /// The service under test.
    Support,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Support => "support",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed tool call made while producing a support turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    /// Name of the tool that was invoked
    pub tool_name: String,

    /// Arguments the responder passed (ordered for stable output)
    pub tool_input: BTreeMap<String, serde_json::Value>,

    /// Text the tool returned
    pub tool_output: String,
}

/// A single message from either side of the dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,

    pub message: String,

    /// 1-indexed exchange number. The user message and the support reply of
    /// one exchange share the same number.
    pub turn_number: u32,

    /// Tool calls behind this turn (support turns only)
    #[serde(default)]
    pub tool_uses: Vec<ToolUsage>,
}

impl ConversationTurn {
    /// Create a user turn.
    pub fn user(turn_number: u32, message: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            message: message.into(),
            turn_number,
            tool_uses: Vec::new(),
        }
    }

    /// Create a support turn with the tool calls that produced it.
    pub fn support(
        turn_number: u32,
        message: impl Into<String>,
        tool_uses: Vec<ToolUsage>,
    ) -> Self {
        Self {
            role: Role::Support,
            message: message.into(),
            turn_number,
            tool_uses,
        }
    }

    pub fn is_support(&self) -> bool {
        self.role == Role::Support
    }
}

/// Outcome of one simulated conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationResult {
    /// Scenario this conversation was run for
    pub scenario_name: String,

    /// Ordered turns, including any partial trace captured before a failure
    pub turns: Vec<ConversationTurn>,

    /// The run ended without an uncaught failure (turn limit included)
    pub completed: bool,

    /// The counterpart signalled the end and the classifier agreed
    pub natural_end: bool,

    /// Terminal failure description
    pub error: Option<String>,
}

impl ConversationResult {
    /// Start an empty result for a scenario.
    pub fn new(scenario_name: impl Into<String>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            ..Default::default()
        }
    }

    /// A result standing in for a run that never produced a trace.
    pub fn failed(scenario_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Number of support turns produced.
    pub fn support_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.is_support()).count()
    }

    /// Iterate over support messages in order.
    pub fn support_messages(&self) -> impl Iterator<Item = &str> {
        self.turns
            .iter()
            .filter(|t| t.is_support())
            .map(|t| t.message.as_str())
    }
}
