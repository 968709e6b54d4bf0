//! Structured reasoning-engine output.
//!
//! The reasoning engine is asked to answer with a JSON object carrying the
//! spoken response and two control flags. [`AgentOutput::parse`] is the single
//! place where that raw text is validated; anything it rejects never reaches
//! the turn controller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Control flags produced fresh by every reasoning invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TurnFlags {
    /// The engine wants external knowledge before answering.
    pub needs_knowledge_lookup: bool,
    /// The engine is done and yields the floor to the caller.
    pub turn_complete: bool,
}

/// Validated result of one reasoning invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Text to speak to the caller.
    pub response: String,
    #[serde(rename = "query_knowledge", default)]
    pub needs_knowledge_lookup: bool,
    #[serde(rename = "end_turn", default)]
    pub turn_complete: bool,
}

/// Errors raised while validating raw reasoning output.
#[derive(Debug, Error)]
pub enum AgentOutputError {
    #[error("reasoning output is empty")]
    Empty,

    #[error("reasoning output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentOutput {
    pub fn new(response: impl Into<String>, needs_knowledge_lookup: bool, turn_complete: bool) -> Self {
        Self {
            response: response.into(),
            needs_knowledge_lookup,
            turn_complete,
        }
    }

    /// Parses and validates the raw text returned by the reasoning engine.
    ///
    /// The `response` field is required; both flags default to `false`.
    pub fn parse(raw: &str) -> Result<Self, AgentOutputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AgentOutputError::Empty);
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    pub fn flags(&self) -> TurnFlags {
        TurnFlags {
            needs_knowledge_lookup: self.needs_knowledge_lookup,
            turn_complete: self.turn_complete,
        }
    }

    /// JSON schema handed to the reasoning engine as its response format.
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "response": {
                    "type": "string",
                    "description": "The assistant's spoken response."
                },
                "query_knowledge": {
                    "type": "boolean",
                    "description": "Whether the knowledge base must be queried before answering."
                },
                "end_turn": {
                    "type": "boolean",
                    "description": "Whether the assistant is done with its turn."
                }
            },
            "required": ["response", "query_knowledge", "end_turn"],
            "additionalProperties": false
        })
    }
}
