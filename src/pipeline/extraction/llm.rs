//! OpenAI-compatible chat client for the structured-extraction stage.
//!
//! The production client targets DeepSeek by default but works against any
//! `/chat/completions` endpoint. Requests pin `temperature` to 0 and demand
//! a JSON object so the engine layer can parse deterministically.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_TOKENS: u32 = 2000;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM service not reachable")]
    NotReachable,

    #[error("LLM request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("LLM API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("Could not parse LLM response: {0}")]
    ResponseParsing(String),
}

/// Seam between the extraction engine and the chat backend.
///
/// Implementations send a system + user message pair and return the raw
/// content of the first choice, which the caller parses as JSON.
pub trait ChatClient: Send + Sync {
    fn chat_json(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// Model identifier recorded in usage logs.
    fn model_name(&self) -> &str;
}

// ──────────────────────────────────────────────
// DeepSeekClient
// ──────────────────────────────────────────────

pub struct DeepSeekClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl DeepSeekClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    fn map_transport_error(e: reqwest::Error) -> LlmError {
        if e.is_connect() {
            LlmError::NotReachable
        } else if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Http(e.to_string())
        }
    }
}

impl ChatClient for DeepSeekClient {
    fn chat_json(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let _span = tracing::info_span!("llm_chat", model = %self.model).entered();
        let start = std::time::Instant::now();

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            max_tokens: MAX_TOKENS,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            content_len = content.len(),
            "LLM extraction complete"
        );

        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ──────────────────────────────────────────────
// MockChatClient (testing)
// ──────────────────────────────────────────────

/// Mock chat client with a queue of scripted responses. When the queue is
/// exhausted the fallback response is returned (errors repeat the fallback
/// too, so one-response tests stay short).
pub struct MockChatClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
}

impl MockChatClient {
    pub fn new(fallback: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
        }
    }

    pub fn with_responses(fallback: &str, responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: fallback.to_string(),
        }
    }
}

impl ChatClient for MockChatClient {
    fn chat_json(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        let mut queue = self.responses.lock().unwrap();
        match queue.pop_front() {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_pops_scripted_responses_then_falls_back() {
        let mock = MockChatClient::with_responses(
            r#"{"fallback":true}"#,
            vec![Ok(r#"{"fullName":"Maria"}"#.into()), Err(LlmError::Timeout)],
        );
        assert_eq!(mock.chat_json("s", "u").unwrap(), r#"{"fullName":"Maria"}"#);
        assert!(matches!(mock.chat_json("s", "u"), Err(LlmError::Timeout)));
        assert_eq!(mock.chat_json("s", "u").unwrap(), r#"{"fallback":true}"#);
    }

    #[test]
    fn chat_response_parses_content() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"{\"a\":1}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        let content = parsed.choices[0].message.content.as_deref();
        assert_eq!(content, Some("{\"a\":1}"));
    }

    #[test]
    fn chat_request_serializes_json_object_format() {
        let req = ChatRequest {
            model: "deepseek-chat",
            messages: vec![],
            temperature: 0.0,
            max_tokens: MAX_TOKENS,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["max_tokens"], 2000);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client =
            DeepSeekClient::new("https://api.deepseek.com/".into(), "k".into(), "m".into())
                .unwrap();
        assert_eq!(client.base_url, "https://api.deepseek.com");
    }
}
