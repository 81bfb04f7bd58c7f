//! Tools a responder can offer to the model.
//!
//! Tools never fail from the responder's point of view: any problem is
//! reported to the model as text so the conversation can carry on.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::providers::ToolSpec;

mod knowledge;

pub use knowledge::{
    KnowledgeBase, KnowledgeError, KnowledgeIndex, KnowledgeSection, KnowledgeTool,
    DEFAULT_MAX_RESULTS, KNOWLEDGE_TOOL_NAME,
};

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the input object.
    fn input_schema(&self) -> JsonValue;

    /// Run the tool. Errors are returned as text.
    async fn invoke(&self, input: &BTreeMap<String, JsonValue>) -> String;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// The tools offered on one responder call. Cheap to clone.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    /// A set with no tools.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Invoke a tool by name. An unknown name yields an explanatory text.
    pub async fn invoke(&self, name: &str, input: &BTreeMap<String, JsonValue>) -> String {
        match self.get(name) {
            Some(tool) => tool.invoke(input).await,
            None => {
                tracing::warn!(tool = name, "Model requested an unknown tool");
                format!(
                    "Unknown tool '{}'. Available tools: {}",
                    name,
                    self.names().join(", ")
                )
            }
        }
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .finish()
    }
}
