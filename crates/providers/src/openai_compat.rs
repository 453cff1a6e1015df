//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, vLLM, LMDeploy, Ollama, and any endpoint exposing
//! the OpenAI REST shape.
//!
//! Supports:
//! - `/chat/completions` with structured messages
//! - `/completions` with a prompt rendered by the InternLM2 meta template
//! - Streaming over SSE, surfaced as cumulative snapshots

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use roleplayer_config::{ProviderConfig, ProviderMode};
use roleplayer_core::error::ProviderError;
use roleplayer_core::message::{Message, Role};
use roleplayer_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::meta_template::MetaTemplate;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    mode: ProviderMode,
    template: MetaTemplate,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider in chat mode.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::build(
            name.into(),
            base_url.into(),
            api_key,
            model.into(),
            ProviderMode::Chat,
            Duration::from_secs(120),
        )
    }

    /// Create a provider from the `[provider]` config section.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Self::build(
            config.name.clone(),
            config.api_url.clone(),
            config.api_key.clone(),
            config.model.clone(),
            config.mode,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// A local LMDeploy `api_server` (convenience constructor).
    pub fn lmdeploy(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "lmdeploy",
            base_url.unwrap_or("http://localhost:23333/v1"),
            None,
            model,
        )
    }

    /// Switch between chat and completion endpoints.
    pub fn with_mode(mut self, mode: ProviderMode) -> Self {
        self.mode = mode;
        self
    }

    fn build(
        name: String,
        base_url: String,
        api_key: Option<String>,
        model: String,
        mode: ProviderMode,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model,
            mode,
            template: MetaTemplate::internlm2(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        match self.mode {
            ProviderMode::Chat => format!("{}/chat/completions", self.base_url),
            ProviderMode::Completion => format!("{}/completions", self.base_url),
        }
    }

    /// Convert prompt messages to OpenAI API format.
    ///
    /// The API has no environment role; action results are sent as system
    /// turns, still tagged with their sub-role name.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant | Role::Language | Role::Tool => "assistant",
                    Role::System | Role::Environment | Role::Execute => "system",
                }
                .into(),
                content: Some(m.text().to_string()),
                name: m.name.clone(),
            })
            .collect()
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let options = &request.options;
        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": options.temperature,
            "top_p": options.top_p,
            "top_k": options.top_k,
            "max_tokens": options.max_new_tokens,
            "repetition_penalty": options.repetition_penalty,
            "stream": stream,
        });

        let mut stop = options.stop.clone();
        match self.mode {
            ProviderMode::Chat => {
                body["messages"] = serde_json::json!(Self::to_api_messages(&request.messages));
            }
            ProviderMode::Completion => {
                body["prompt"] = serde_json::json!(self.template.render(&request.messages));
                let stop_word = self.template.stop_word().to_string();
                if !stop.contains(&stop_word) {
                    stop.push(stop_word);
                }
            }
        }

        if !stop.is_empty() {
            body["stop"] = serde_json::json!(stop);
        }

        body
    }

    async fn send(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }

    fn clean(&self, text: &str) -> String {
        clean_text(self.mode, &self.template, text)
    }
}

/// Completion endpoints may echo markup; chat endpoints return the reply.
fn clean_text(mode: ProviderMode, template: &MetaTemplate, text: &str) -> String {
    match mode {
        ProviderMode::Chat => text.to_string(),
        ProviderMode::Completion => template.extract_reply(text),
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let body = self.request_body(&request, false);

        debug!(provider = %self.name, model = %self.model, mode = ?self.mode, "Sending completion request");

        let response = self.send(&body, false).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let text = choice
            .message
            .and_then(|m| m.content)
            .or(choice.text)
            .unwrap_or_default();

        Ok(self.clean(&text))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let body = self.request_body(&request, true);

        debug!(provider = %self.name, model = %self.model, mode = ?self.mode, "Sending streaming request");

        let response = self.send(&body, true).await?;

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();
        let template = self.template.clone();
        let mode = self.mode;
        let clean = move |text: &str| clean_text(mode, &template, text);

        // Read the SSE byte stream; every delta is forwarded as the full
        // text generated so far.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut generated = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(StreamChunk {
                                status: ModelStatus::ServerErr,
                                text: clean(&generated),
                                meta: Some(serde_json::json!({ "error": e.to_string() })),
                            })
                            .await;
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    let data = match event {
                        SseEvent::Done => {
                            let _ = tx
                                .send(StreamChunk::new(ModelStatus::End, clean(&generated)))
                                .await;
                            return;
                        }
                        SseEvent::Data(data) => data,
                    };

                    match serde_json::from_str::<StreamResponse>(&data) {
                        Ok(stream_resp) => {
                            let Some(delta) = stream_resp.choices.first().and_then(StreamChoice::delta_text) else {
                                continue;
                            };
                            if delta.is_empty() {
                                continue;
                            }
                            generated.push_str(delta);
                            let chunk = StreamChunk::new(ModelStatus::StreamIng, clean(&generated));
                            if tx.send(chunk).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx
                .send(StreamChunk::new(ModelStatus::End, clean(&generated)))
                .await;
        });

        Ok(rx)
    }
}

// --- SSE framing ---

#[derive(Debug, Clone, PartialEq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Splits a byte stream into `data:` payloads, carrying partial lines over
/// between pushes.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        // Only complete lines are decoded; a code point split across
        // network chunks stays buffered until its line ends.
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let text = String::from_utf8_lossy(&raw[..line_end]);
            let line = text.trim_end_matches('\r');

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }
        events
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

/// Chat responses carry `message`, completion responses carry `text`.
#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    text: Option<String>,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    text: Option<String>,
}

impl StreamChoice {
    fn delta_text(&self) -> Option<&str> {
        self.delta
            .as_ref()
            .and_then(|d| d.content.as_deref())
            .or(self.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(mode: ProviderMode) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new("test", "http://localhost:8000/v1/", None, "internlm2")
            .unwrap()
            .with_mode(mode)
    }

    #[test]
    fn lmdeploy_constructor() {
        let provider = OpenAiCompatProvider::lmdeploy(None, "internlm2").unwrap();
        assert_eq!(provider.name(), "lmdeploy");
        assert!(provider.base_url.contains("localhost:23333"));
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn from_config_uses_mode_and_trims_url() {
        let config = ProviderConfig {
            api_url: "http://example.test/v1/".into(),
            api_key: Some(String::new()),
            mode: ProviderMode::Completion,
            ..ProviderConfig::default()
        };
        let provider = OpenAiCompatProvider::from_config(&config).unwrap();
        assert_eq!(provider.endpoint(), "http://example.test/v1/completions");
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            Message::system("meta"),
            Message::system("tools").with_name("plugin"),
            Message::user("Hello"),
            Message::assistant("Hi"),
            Message::environment("4").with_name("interpreter"),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        let roles: Vec<&str> = api.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "system", "user", "assistant", "system"]);
        assert_eq!(api[1].name.as_deref(), Some("plugin"));
        assert_eq!(api[4].content.as_deref(), Some("4"));
    }

    #[test]
    fn chat_body_carries_generation_options() {
        let provider = provider(ProviderMode::Chat);
        let request = ChatRequest {
            messages: vec![Message::user("hi")],
            options: GenerationOptions {
                max_new_tokens: 128,
                ..GenerationOptions::default()
            },
        };
        let body = provider.request_body(&request, false);
        assert_eq!(provider.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(body["model"], "internlm2");
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["top_k"], 1);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("stop").is_none());
        assert!(body.get("prompt").is_none());
    }

    #[test]
    fn completion_body_renders_prompt_and_stop_word() {
        let provider = provider(ProviderMode::Completion);
        let request = ChatRequest {
            messages: vec![Message::user("hi")],
            options: GenerationOptions::default(),
        };
        let body = provider.request_body(&request, true);
        assert_eq!(
            body["prompt"],
            "<|im_start|>user\nhi<|im_end|>\n<|im_start|>assistant\n"
        );
        assert_eq!(body["stop"], serde_json::json!(["<|im_end|>"]));
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn completion_output_is_cleaned() {
        let completion = provider(ProviderMode::Completion);
        assert_eq!(completion.clean("assistant\nHello<|im_end|>\n"), "Hello");
        assert_eq!(
            provider(ProviderMode::Chat).clean("Hello<|im_end|>"),
            "Hello<|im_end|>"
        );
    }

    // --- Response parsing tests ---

    #[test]
    fn parse_chat_and_completion_choices() {
        let chat: ApiResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"Hi"}}]}"#)
                .unwrap();
        assert_eq!(
            chat.choices[0].message.as_ref().unwrap().content.as_deref(),
            Some("Hi")
        );

        let completion: ApiResponse =
            serde_json::from_str(r#"{"choices":[{"text":"Hi","index":0}]}"#).unwrap();
        assert_eq!(completion.choices[0].text.as_deref(), Some("Hi"));
    }

    #[test]
    fn parse_stream_deltas() {
        let chat: StreamResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#)
                .unwrap();
        assert_eq!(chat.choices[0].delta_text(), Some("Hel"));

        let completion: StreamResponse =
            serde_json::from_str(r#"{"choices":[{"text":"lo","finish_reason":null}]}"#).unwrap();
        assert_eq!(completion.choices[0].delta_text(), Some("lo"));

        let finish: StreamResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap();
        assert_eq!(finish.choices[0].delta_text(), None);
    }

    // --- SSE framing tests ---

    #[test]
    fn sse_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let events = decoder.push(b":1}\r\n\n: keep-alive\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".into()), SseEvent::Done]
        );
    }

    #[test]
    fn sse_decoder_ignores_other_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"event: ping\nid: 3\ndata:{}\n");
        assert_eq!(events, vec![SseEvent::Data("{}".into())]);
    }

    #[test]
    fn sse_decoder_keeps_code_points_split_across_chunks() {
        let line = "data: {\"content\":\"狼\"}\n".as_bytes();
        let split = line.iter().position(|&b| b >= 0x80).unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&line[..split]).is_empty());
        let events = decoder.push(&line[split..]);
        assert_eq!(events, vec![SseEvent::Data("{\"content\":\"狼\"}".into())]);
    }
}
