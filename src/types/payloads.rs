//! Request payloads forwarded to the agent service
//!
//! These are the bodies clients put in the `payload` field of PROMPT,
//! COMMAND and ANSWER requests. The daemon decodes them once, and the
//! workers post them to the agent service unchanged.

use serde::{Deserialize, Serialize};

use super::identifiers::QuestionId;

/// Structured model identifier understood by the agent service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Provider, e.g. `zai-coding-plan`
    #[serde(rename = "providerID")]
    pub provider_id: String,
    /// Model within the provider, e.g. `glm-5`
    #[serde(rename = "modelID")]
    pub model_id: String,
}

impl ModelRef {
    /// Create a model reference
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }
}

/// One message part. Only text parts are produced by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Part type (`"text"`)
    #[serde(rename = "type")]
    pub part_type: String,
    /// Text content
    #[serde(default)]
    pub text: String,
}

impl Part {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            part_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Payload of a PROMPT request (`POST /session/{id}/message`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    /// Agent that should handle the message
    pub agent: String,
    /// Model to run the agent with
    pub model: ModelRef,
    /// Message parts
    pub parts: Vec<Part>,
}

impl PromptRequest {
    /// Build a single-text-part prompt
    pub fn text(agent: impl Into<String>, model: ModelRef, text: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            model,
            parts: vec![Part::text(text)],
        }
    }

    /// Text of the first part, if any
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.parts.first().map(|p| p.text.as_str())
    }
}

/// Payload of a COMMAND request (`POST /session/{id}/command`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Agent that should handle the command
    pub agent: String,
    /// Model to run the agent with
    pub model: ModelRef,
    /// Slash-command name
    pub command: String,
    /// Raw argument string
    #[serde(default)]
    pub arguments: String,
    /// Always empty on the wire, kept for the service's schema
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Payload of an ANSWER request (`POST /question/{id}/reply`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Question being answered
    #[serde(rename = "requestID")]
    pub request_id: QuestionId,
    /// One selection list per sub-question
    pub answers: Vec<Vec<String>>,
}

/// Agent and model a session last ran with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSelection {
    /// Agent name
    pub agent: String,
    /// Model reference
    pub model: ModelRef,
}

impl From<&PromptRequest> for AgentSelection {
    fn from(req: &PromptRequest) -> Self {
        Self {
            agent: req.agent.clone(),
            model: req.model.clone(),
        }
    }
}

impl From<&CommandRequest> for AgentSelection {
    fn from(req: &CommandRequest) -> Self {
        Self {
            agent: req.agent.clone(),
            model: req.model.clone(),
        }
    }
}
