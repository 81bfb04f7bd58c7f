//! Scenario loading and validation.
//!
//! Scenario documents are structured data validated against JSON Schema.
//! This module handles parsing JSON/YAML documents, validating them, and
//! normalizing defaults.

mod parser;
mod persona;
mod schema;

pub use parser::{
    ConversationFlowStep, Scenario, ScenarioError, ScenarioSet, DEFAULT_MAX_TURNS,
    MAX_RECOMMENDED_TURNS,
};
pub use persona::{Persona, UnknownPersona};
pub use schema::{validate_scenario_schema, SchemaError};
