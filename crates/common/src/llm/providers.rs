//! Concrete text generation providers

use super::{Generation, TextGenerator};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> AppError {
    if e.is_timeout() {
        AppError::GenerationTimeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        AppError::Generation {
            message: format!("Request failed: {}", e),
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::GenerationRejected {
            status: status.as_u16(),
            message: body,
        });
    }
    Err(AppError::Generation {
        message: format!("API error {}: {}", status, body),
    })
}

// ============================================================================
// Anthropic
// ============================================================================

/// Anthropic messages API client
pub struct AnthropicGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

impl AnthropicGenerator {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            timeout,
        })
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: max_output_tokens,
            messages: vec![AnthropicMessage { role: "user", content: prompt }],
        };

        let response = self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let body: AnthropicResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Generation {
                message: format!("Failed to parse response: {}", e),
            })?;

        let text: String = body
            .content
            .into_iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text)
            .collect();

        if text.is_empty() {
            return Err(AppError::Generation {
                message: "Empty response from model".to_string(),
            });
        }

        Ok(Generation {
            text,
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// OpenAI-compatible
// ============================================================================

/// OpenAI-compatible chat completions client
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

impl OpenAiGenerator {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            timeout,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: max_output_tokens,
        };

        let response = self.client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let body: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Generation {
                message: format!("Failed to parse response: {}", e),
            })?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Generation {
                message: "Empty response from model".to_string(),
            })?;

        let usage = body.usage.unwrap_or_default();
        Ok(Generation {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Echo
// ============================================================================

/// Offline generator that reflects the tail of the prompt back.
///
/// Useful for smoke-testing the gateway without credentials.
#[derive(Default)]
pub struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generation> {
        let words: Vec<&str> = prompt.split_whitespace().collect();
        let keep = (max_output_tokens as usize).min(words.len()).min(64);
        let text = format!("[echo] {}", words[words.len() - keep..].join(" "));

        Ok(Generation {
            input_tokens: words.len() as u32,
            output_tokens: keep as u32,
            text,
        })
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anthropic_response_parsing() {
        let raw = r#"{
            "content": [{"type": "text", "text": "The dunes shift."}],
            "usage": {"input_tokens": 120, "output_tokens": 5}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "The dunes shift.");
        assert_eq!(parsed.usage.output_tokens, 5);
    }

    #[test]
    fn test_chat_response_without_usage() {
        let raw = r#"{"choices": [{"message": {"content": "APPROVED: fine"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("APPROVED: fine"));
    }

    #[tokio::test]
    async fn test_echo_respects_ceiling() {
        let echo = EchoGenerator;
        let out = echo.generate("one two three four five", 2).await.unwrap();
        assert_eq!(out.text, "[echo] four five");
        assert_eq!(out.output_tokens, 2);
    }
}
