//! Request and response types for the chat completion API.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::ZhipuError;

// ============================================================================
// Models
// ============================================================================

/// ChatGLM Turbo.
pub const TURBO: &str = "chatglm_turbo";
/// ChatGLM Pro.
pub const PRO: &str = "chatglm_pro";
/// ChatGLM Standard.
pub const STD: &str = "chatglm_std";
/// ChatGLM Lite.
pub const LITE: &str = "chatglm_lite";

// ============================================================================
// Request
// ============================================================================

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionMessage {
    pub role: Role,
    pub content: String,
}

impl ChatCompletionMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Parameters for a chat completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier, also used as the URL segment.
    pub model: String,

    /// Conversation so far. Must not be empty.
    pub messages: Vec<ChatCompletionMessage>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling probability mass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,

    /// Caller-chosen id echoed back by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Ask the server for incremental deltas instead of a full message.
    #[serde(default)]
    pub incremental: bool,
}

impl ChatCompletionRequest {
    /// Create a request for `model` with the given messages.
    pub fn new(model: impl Into<String>, messages: Vec<ChatCompletionMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
            request_id: None,
            incremental: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_tokens(mut self, max_tokens: i32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Check the request before it is sent.
    pub fn validate(&self) -> Result<()> {
        if self.model.is_empty() {
            return Err(ZhipuError::Validation("model is required".to_string()));
        }
        if self.messages.is_empty() {
            return Err(ZhipuError::Validation(
                "at least one message is required".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Response
// ============================================================================

/// Why generation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    SensitiveContent,
    #[serde(other)]
    Other,
}

/// Token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

/// One generated message of a non-streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    #[serde(default)]
    pub index: i32,
    pub message: ChatCompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Full response of a non-streaming call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatCompletionResponse {
    /// Content of the first choice, or an empty string.
    pub fn text(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default()
    }
}

/// Partial message carried by a stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: String,
}

/// One choice within a stream chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionStreamChoice {
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub delta: ChatCompletionDelta,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// One event of a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionStreamResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatCompletionStreamChoice>,
    /// Present on the final chunk only.
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionStreamResponse {
    /// Concatenated delta content of all choices.
    pub fn delta_text(&self) -> String {
        self.choices
            .iter()
            .map(|c| c.delta.content.as_str())
            .collect()
    }

    /// Finish reason of the first choice that has one.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.choices.iter().find_map(|c| c.finish_reason.as_ref())
    }
}

#[cfg(test)]
#[path = "types.test.rs"]
mod tests;
