//! Completion Service
//!
//! The language model is an opaque text-completion collaborator. The pipeline
//! only depends on [`CompletionService`]; [`LlmClient`] is the HTTP
//! implementation for OpenAI-compatible and Azure OpenAI deployments.

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Message in OpenAI chat format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Text-completion provider
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete an ordered list of role-tagged prompts into plain text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        match &self.config.provider {
            LlmProvider::OpenAi { base_url, .. } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            LlmProvider::Azure { endpoint, deployment, api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, deployment, api_version
            ),
        }
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "messages": messages,
            "temperature": self.config.temperature,
        });

        match &self.config.provider {
            LlmProvider::OpenAi { model, .. } => {
                body["model"] = serde_json::json!(model);
                // Reasoning models reject max_tokens
                if model.starts_with("gpt-5") || model.starts_with("o1") || model.starts_with("gpt-4") {
                    body["max_completion_tokens"] = serde_json::json!(self.config.max_tokens);
                } else {
                    body["max_tokens"] = serde_json::json!(self.config.max_tokens);
                }
            }
            LlmProvider::Azure { .. } => {
                body["max_tokens"] = serde_json::json!(self.config.max_tokens);
            }
        }

        body
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = self.http.post(self.endpoint()).json(&self.request_body(messages));
        let request = match self.config.provider {
            LlmProvider::OpenAi { .. } => {
                request.header("Authorization", format!("Bearer {}", self.config.api_key))
            }
            LlmProvider::Azure { .. } => request.header("api-key", self.config.api_key.as_str()),
        };

        debug!("Sending {} messages to completion service", messages.len());

        let response = request
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AssistantError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

/// Pull the first choice's text out of a chat-completions payload
fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(AssistantError::Llm(format!("LLM API error: {}", error)));
    }

    let choices = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| AssistantError::Llm("No choices array in LLM response".to_string()))?;

    let first = choices
        .first()
        .ok_or_else(|| AssistantError::Llm("Empty choices array in LLM response".to_string()))?;

    match first.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(AssistantError::Llm(
                "LLM response was filtered by content policy".to_string(),
            ))
        }
        _ => {}
    }

    let content = first["message"]["content"].as_str().unwrap_or("").trim();
    if content.is_empty() {
        return Err(AssistantError::Llm("Empty content in LLM response".to_string()));
    }

    Ok(content.to_string())
}
