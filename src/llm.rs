//! LLM client abstraction and OpenAI chat-completions implementation.
//!
//! This module provides a generic [`LlmClient`] trait for interacting with
//! language models, along with concrete implementations:
//!
//! - [`OpenAiClient`]: production client for the OpenAI chat-completions API
//! - [`MockLlmClient`]: test double for unit tests
//!
//! Every component of the assistant (intent detection, question correction,
//! SQL generation, formatting, chat) talks to the model through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default chat model used by every component unless overridden.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP or network error occurred.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse the API response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Model returned no text content.
    #[error("Model returned empty response")]
    EmptyResponse,
}

// ============================================================================
// Completion Type
// ============================================================================

/// The result of a successful LLM completion request.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The generated text from the model.
    pub text: String,
}

// ============================================================================
// LlmClient Trait
// ============================================================================

/// Generic interface for LLM clients.
///
/// Supports simple system+user prompt completion with text response.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion given a system prompt and user message.
    ///
    /// # Arguments
    ///
    /// * `system` - System-level instructions for the model
    /// * `user` - User message or prompt
    ///
    /// # Returns
    ///
    /// A [`Completion`] containing the model's response text.
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError>;
}

// ============================================================================
// OpenAI API Implementation
// ============================================================================

/// Client for the OpenAI chat-completions API.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

/// Request body for the chat-completions endpoint.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<Message>,
}

/// A message in the conversation.
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Response from the chat-completions endpoint.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a client for `api_key` with the default model
    /// [`DEFAULT_MODEL`] and temperature `0`.
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            client: reqwest::Client::new(),
        }
    }

    /// Use a different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Use a different sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(Message {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: user.to_string(),
        });

        let request_body = ChatRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            messages,
        };

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        Ok(Completion { text })
    }
}

// ============================================================================
// Output Helpers
// ============================================================================

/// Strip markdown code fences from LLM output.
///
/// Handles both bare fences and fences carrying a language tag on the
/// opening line (```` ```csv ````). Text without a leading fence is only
/// trimmed.
pub fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let after_first_fence = trimmed
            .find('\n')
            .map(|i| &trimmed[i + 1..])
            .unwrap_or(trimmed);
        if let Some(end) = after_first_fence.rfind("```") {
            return after_first_fence[..end].trim().to_string();
        }
    }
    trimmed.to_string()
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// Mock LLM client for testing. Returns pre-programmed responses in FIFO order
/// and records every prompt it was given.
#[cfg(test)]
pub struct MockLlmClient {
    /// Pre-programmed responses to return in FIFO order.
    pub responses: std::sync::Mutex<std::collections::VecDeque<String>>,
    /// `(system, user)` pairs received, in call order.
    pub calls: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl MockLlmClient {
    /// Create a new mock client with a sequence of responses.
    ///
    /// # Panics
    ///
    /// Panics if [`complete`](LlmClient::complete) is called more times
    /// than there are responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Number of completions served so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The user message of the n-th call.
    pub fn user_prompt(&self, n: usize) -> String {
        self.calls.lock().unwrap()[n].1.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));

        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockLlmClient: no more responses available");

        Ok(Completion { text })
    }
}

/// LLM client that fails every call. Test only.
#[cfg(test)]
pub struct FailingLlmClient;

#[cfg(test)]
#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, LlmError> {
        Err(LlmError::Http("connection refused".into()))
    }
}

// ============================================================================
// Tests
// ============================================================================
