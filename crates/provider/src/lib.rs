//! LLM provider abstraction for the planning engine.
//!
//! The engine talks to a [`Provider`] in terms of chat messages, declared
//! tools and parsed tool invocations. One backend ships here:
//! [`OpenRouterProvider`], which speaks the OpenAI-compatible chat
//! completions wire format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod openrouter;

pub use openrouter::OpenRouterProvider;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bad payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("api error: {0}")]
    Api(String),

    #[error("no api key configured")]
    NoApiKey,

    #[error("malformed completion response")]
    InvalidResponse,

    #[error("rate limited")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// A tool call the model asked for, with its arguments already parsed
/// into JSON (some backends send them as a string, some as an object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One model completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl Completion {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Chat message in the OpenAI-compatible shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<RawToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Assistant turn that carries the tool calls the model made, so the
    /// matching tool results can follow it in the transcript.
    pub fn assistant_with_calls(content: Option<String>, calls: &[ToolInvocation]) -> Self {
        let raw = calls
            .iter()
            .map(|call| RawToolCall {
                id: call.id.clone(),
                call_type: "function".to_string(),
                function: RawFunctionCall {
                    name: call.name.clone(),
                    // The wire format wants arguments as a JSON string.
                    arguments: call.arguments.to_string(),
                },
            })
            .collect();
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(raw),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(result.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// Tool call in the wire shape (arguments as a string).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: RawFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A tool the model is allowed to call, with its JSON Schema parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl DeclaredTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ToolChoice {
    Auto,
    Required(String),
    None,
}

/// Parameters for one completion round trip.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<DeclaredTool>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tool_choice: ToolChoice,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: 4096,
            temperature: 0.2,
            tool_choice: ToolChoice::Auto,
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}
