//! Scenario document parsing from JSON/YAML.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::persona::Persona;
use super::schema::validate_scenario_schema;

/// Turn budget used when a scenario does not set `max_turns`.
pub const DEFAULT_MAX_TURNS: u32 = 3;

/// Turn budgets above this are accepted but logged as unusual.
pub const MAX_RECOMMENDED_TURNS: u32 = 20;

const REQUIRED_SCENARIO_FIELDS: [&str; 4] =
    ["name", "description", "initial_query", "expected_topics"];

/// Errors that can occur when loading scenarios.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Scenario document must contain '{0}'")]
    MissingDocumentField(&'static str),

    #[error("Scenario {index} missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Scenario document failed schema validation: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Scenario {index} ({name}): {reason}")]
    InvalidScenario {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("Duplicate scenario name: {0}")]
    DuplicateName(String),

    #[error("Scenario '{0}' not found")]
    NotFound(String),
}

/// One step of a scripted conversation outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationFlowStep {
    /// Support turn this step describes (1-indexed)
    pub turn: u32,

    /// What the support side is expected to do at this turn
    pub expected_agent_action: String,

    /// How the simulated customer should answer. `None` marks the point
    /// where the conversation is expected to end naturally.
    #[serde(default)]
    pub user_response_hint: Option<String>,
}

/// A validated evaluation scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique key within a scenario set
    pub name: String,

    pub description: String,

    /// First customer message, sent verbatim as turn 1
    pub initial_query: String,

    /// Phrases the support side should mention (never empty)
    pub expected_topics: Vec<String>,

    /// Whether the support side is expected to consult the knowledge tool
    pub expected_tool_use: bool,

    pub persona: Persona,

    /// Maximum number of support turns (at least 1)
    pub max_turns: u32,

    pub user_context: String,

    pub user_goal: String,

    pub conversation_flow: Option<Vec<ConversationFlowStep>>,

    pub scenario_number: Option<u32>,
}

impl Scenario {
    /// First flow step declared for the given support turn.
    pub fn flow_step(&self, turn: u32) -> Option<&ConversationFlowStep> {
        self.conversation_flow
            .as_deref()
            .and_then(|steps| steps.iter().find(|step| step.turn == turn))
    }
}

/// A set of scenarios loaded from one document.
#[derive(Debug, Clone)]
pub struct ScenarioSet {
    /// Schema version declared by the document
    pub version: String,

    pub description: String,

    /// Scenarios in declaration order, shareable across workers
    pub scenarios: Vec<Arc<Scenario>>,

    /// File the set was loaded from, if any
    pub source_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    version: String,
    #[serde(default)]
    description: String,
    scenarios: Vec<RawScenario>,
}

#[derive(Debug, Deserialize)]
struct RawScenario {
    name: String,
    description: String,
    initial_query: String,
    expected_topics: Vec<String>,
    #[serde(default = "default_true")]
    expected_tool_use: bool,
    #[serde(default)]
    persona: Option<String>,
    #[serde(default)]
    max_turns: Option<i64>,
    #[serde(default)]
    user_context: String,
    #[serde(default)]
    user_goal: String,
    #[serde(default)]
    conversation_flow: Option<Vec<ConversationFlowStep>>,
    #[serde(default)]
    scenario_number: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl ScenarioSet {
    /// Parse a scenario document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a scenario document from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Load a scenario document, choosing the format by file extension
    /// (`.yaml`/`.yml` are YAML, anything else is JSON).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let mut set = if is_yaml {
            Self::from_yaml(&contents)?
        } else {
            Self::from_json(&contents)?
        };

        set.source_file = Some(path.to_path_buf());
        tracing::debug!(
            path = %path.display(),
            scenarios = set.scenarios.len(),
            "Loaded scenario document"
        );
        Ok(set)
    }

    /// Validate and normalize an already-parsed document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ScenarioError> {
        check_required_fields(&value)?;

        validate_scenario_schema(&value).map_err(ScenarioError::SchemaViolation)?;

        let raw: RawDocument = serde_json::from_value(value)?;

        let mut seen = HashSet::new();
        let mut scenarios = Vec::with_capacity(raw.scenarios.len());
        for (index, raw_scenario) in raw.scenarios.into_iter().enumerate() {
            let scenario = normalize(index, raw_scenario)?;
            if !seen.insert(scenario.name.clone()) {
                return Err(ScenarioError::DuplicateName(scenario.name));
            }
            scenarios.push(Arc::new(scenario));
        }

        Ok(Self {
            version: raw.version,
            description: raw.description,
            scenarios,
            source_file: None,
        })
    }

    /// Look up a scenario by name.
    pub fn find(&self, name: &str) -> Option<&Arc<Scenario>> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// All scenarios, or only the named one.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<Arc<Scenario>>, ScenarioError> {
        match name {
            None => Ok(self.scenarios.clone()),
            Some(name) => self
                .find(name)
                .map(|s| vec![Arc::clone(s)])
                .ok_or_else(|| ScenarioError::NotFound(name.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

/// Report missing required keys with their own messages before the schema
/// produces a generic one.
fn check_required_fields(value: &serde_json::Value) -> Result<(), ScenarioError> {
    if value.get("version").is_none() {
        return Err(ScenarioError::MissingDocumentField("version"));
    }
    let Some(scenarios) = value.get("scenarios") else {
        return Err(ScenarioError::MissingDocumentField("scenarios"));
    };

    if let Some(items) = scenarios.as_array() {
        for (index, item) in items.iter().enumerate() {
            for field in REQUIRED_SCENARIO_FIELDS {
                if item.get(field).is_none() {
                    return Err(ScenarioError::MissingField { index, field });
                }
            }
        }
    }

    Ok(())
}

fn normalize(index: usize, raw: RawScenario) -> Result<Scenario, ScenarioError> {
    let invalid = |reason: String| ScenarioError::InvalidScenario {
        index,
        name: raw.name.clone(),
        reason,
    };

    let max_turns = match raw.max_turns {
        None => DEFAULT_MAX_TURNS,
        Some(n) if n < 1 => {
            return Err(invalid(format!(
                "max_turns must be a positive integer, got {}",
                n
            )))
        }
        Some(n) => u32::try_from(n)
            .map_err(|_| invalid(format!("max_turns is out of range, got {}", n)))?,
    };
    if max_turns > MAX_RECOMMENDED_TURNS {
        tracing::warn!(
            index,
            scenario = %raw.name,
            max_turns,
            max_recommended = MAX_RECOMMENDED_TURNS,
            "max_turns is unusually high"
        );
    }

    let persona = match raw.persona.as_deref() {
        None => Persona::default(),
        Some(name) => name.parse::<Persona>().map_err(|e| invalid(e.to_string()))?,
    };

    if raw.expected_topics.is_empty() {
        return Err(invalid("expected_topics must be a non-empty list".to_string()));
    }

    // An empty outline carries no information.
    let conversation_flow = raw.conversation_flow.filter(|steps| !steps.is_empty());

    Ok(Scenario {
        name: raw.name,
        description: raw.description,
        initial_query: raw.initial_query,
        expected_topics: raw.expected_topics,
        expected_tool_use: raw.expected_tool_use,
        persona,
        max_turns,
        user_context: raw.user_context,
        user_goal: raw.user_goal,
        conversation_flow,
        scenario_number: raw.scenario_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_DOCUMENT: &str = r#"
{
  "version": "1.0",
  "description": "Support scenarios",
  "scenarios": [
    {
      "name": "return_policy",
      "description": "Return policy question",
      "initial_query": "How do I return an item?",
      "expected_topics": ["30 days", "unopened", "return shipping"]
    },
    {
      "name": "password_reset",
      "description": "Password reset",
      "initial_query": "I forgot my password...",
      "expected_topics": ["reset link"],
      "persona": "confused",
      "max_turns": 4,
      "user_context": "Remembers email address",
      "user_goal": "Log in again",
      "scenario_number": 2,
      "conversation_flow": [
        {"turn": 1, "expected_agent_action": "Explain reset", "user_response_hint": "Ask where the link is"},
        {"turn": 2, "expected_agent_action": "Clarify"}
      ]
    }
  ]
}
"#;

    #[test]
    fn test_parse_valid_document() {
        let set = ScenarioSet::from_json(VALID_DOCUMENT).unwrap();
        assert_eq!(set.version, "1.0");
        assert_eq!(set.len(), 2);

        let first = &set.scenarios[0];
        assert_eq!(first.persona, Persona::Polite);
        assert_eq!(first.max_turns, DEFAULT_MAX_TURNS);
        assert!(first.expected_tool_use);
        assert!(first.conversation_flow.is_none());

        let second = set.find("password_reset").unwrap();
        assert_eq!(second.persona, Persona::Confused);
        assert_eq!(second.max_turns, 4);
        assert_eq!(second.scenario_number, Some(2));
        assert_eq!(
            second.flow_step(1).unwrap().user_response_hint.as_deref(),
            Some("Ask where the link is")
        );
        assert!(second.flow_step(2).unwrap().user_response_hint.is_none());
        assert!(second.flow_step(3).is_none());
    }

    #[test]
    fn test_parse_yaml_document() {
        let yaml = r#"
version: "1.0"
scenarios:
  - name: warranty
    description: Warranty question
    initial_query: Tell me about the warranty
    expected_topics: ["1 year"]
    persona: detailed
"#;
        let set = ScenarioSet::from_yaml(yaml).unwrap();
        assert_eq!(set.scenarios[0].persona, Persona::Detailed);
        assert_eq!(set.description, "");
    }

    #[test]
    fn test_missing_version() {
        let result = ScenarioSet::from_json(r#"{"scenarios": []}"#);
        assert!(matches!(
            result,
            Err(ScenarioError::MissingDocumentField("version"))
        ));
    }

    #[test]
    fn test_missing_scenarios() {
        let result = ScenarioSet::from_json(r#"{"version": "1.0"}"#);
        assert!(matches!(
            result,
            Err(ScenarioError::MissingDocumentField("scenarios"))
        ));
    }

    #[test]
    fn test_missing_required_scenario_field() {
        let json = r#"{"version": "1.0", "scenarios": [
            {"name": "a", "description": "d", "expected_topics": ["x"]}
        ]}"#;
        let result = ScenarioSet::from_json(json);
        assert!(matches!(
            result,
            Err(ScenarioError::MissingField { index: 0, field: "initial_query" })
        ));
    }

    #[test]
    fn test_invalid_persona() {
        let json = r#"{"version": "1.0", "scenarios": [
            {"name": "a", "description": "d", "initial_query": "q",
             "expected_topics": ["x"], "persona": "angry"}
        ]}"#;
        let err = ScenarioSet::from_json(json).unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidScenario { index: 0, .. }));
        assert!(err.to_string().contains("invalid persona 'angry'"));
    }

    #[test]
    fn test_non_positive_max_turns() {
        for bad in ["0", "-2"] {
            let json = format!(
                r#"{{"version": "1.0", "scenarios": [
                    {{"name": "a", "description": "d", "initial_query": "q",
                      "expected_topics": ["x"], "max_turns": {}}}
                ]}}"#,
                bad
            );
            let err = ScenarioSet::from_json(&json).unwrap_err();
            assert!(err.to_string().contains("max_turns must be a positive integer"));
        }
    }

    #[test]
    fn test_non_integer_max_turns() {
        let json = r#"{"version": "1.0", "scenarios": [
            {"name": "a", "description": "d", "initial_query": "q",
             "expected_topics": ["x"], "max_turns": "three"}
        ]}"#;
        assert!(matches!(
            ScenarioSet::from_json(json),
            Err(ScenarioError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_high_max_turns_is_accepted() {
        let json = r#"{"version": "1.0", "scenarios": [
            {"name": "a", "description": "d", "initial_query": "q",
             "expected_topics": ["x"], "max_turns": 40}
        ]}"#;
        let set = ScenarioSet::from_json(json).unwrap();
        assert_eq!(set.scenarios[0].max_turns, 40);
    }

    #[test]
    fn test_empty_expected_topics() {
        let json = r#"{"version": "1.0", "scenarios": [
            {"name": "a", "description": "d", "initial_query": "q", "expected_topics": []}
        ]}"#;
        let err = ScenarioSet::from_json(json).unwrap_err();
        assert!(err.to_string().contains("expected_topics must be a non-empty list"));
    }

    #[test]
    fn test_duplicate_names() {
        let json = r#"{"version": "1.0", "scenarios": [
            {"name": "a", "description": "d", "initial_query": "q", "expected_topics": ["x"]},
            {"name": "a", "description": "d", "initial_query": "q", "expected_topics": ["y"]}
        ]}"#;
        assert!(matches!(
            ScenarioSet::from_json(json),
            Err(ScenarioError::DuplicateName(name)) if name == "a"
        ));
    }

    #[test]
    fn test_select_by_name() {
        let set = ScenarioSet::from_json(VALID_DOCUMENT).unwrap();
        assert_eq!(set.select(None).unwrap().len(), 2);
        assert_eq!(set.select(Some("return_policy")).unwrap()[0].name, "return_policy");
        assert!(matches!(
            set.select(Some("nope")),
            Err(ScenarioError::NotFound(_))
        ));
    }
}
