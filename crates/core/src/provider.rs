//! Provider trait, the abstraction over LLM backends.
//!
//! A Provider takes the formatted prompt messages and returns the raw text
//! the model generated, either all at once or as a stream of cumulative
//! snapshots tagged with a model status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// Sampling parameters for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.75
}
fn default_top_p() -> f32 {
    0.75
}
fn default_top_k() -> u32 {
    1
}
fn default_max_new_tokens() -> u32 {
    512
}
fn default_repetition_penalty() -> f32 {
    1.001
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_new_tokens: default_max_new_tokens(),
            repetition_penalty: default_repetition_penalty(),
            stop: Vec::new(),
        }
    }
}

/// A request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The formatted prompt messages
    pub messages: Vec<Message>,

    #[serde(default)]
    pub options: GenerationOptions,
}

/// Status of a model stream. Negative codes are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    End,
    StreamIng,
    SessionReady,
    ServerErr,
    SessionClosed,
    SessionOutOfLimit,
    SessionInvalidArg,
}

impl ModelStatus {
    pub fn code(self) -> i32 {
        match self {
            ModelStatus::End => 0,
            ModelStatus::StreamIng => 1,
            ModelStatus::SessionReady => 2,
            ModelStatus::ServerErr => -1,
            ModelStatus::SessionClosed => -2,
            ModelStatus::SessionOutOfLimit => -3,
            ModelStatus::SessionInvalidArg => -4,
        }
    }

    pub fn is_error(self) -> bool {
        self.code() < 0
    }
}

/// One item of a model stream.
///
/// `text` is the whole response generated so far, not a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub status: ModelStatus,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl StreamChunk {
    pub fn new(status: ModelStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
            meta: None,
        }
    }
}

/// The core Provider trait.
///
/// The agent loop calls `chat()` or `stream_chat()` without knowing which
/// backend is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and get the complete response text.
    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError>;

    /// Send a request and get a stream of cumulative snapshots.
    ///
    /// Default implementation calls `chat()` and wraps the result as a single
    /// `End` chunk; a failure becomes a single `ServerErr` chunk.
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamChunk>, ProviderError> {
        let chunk = match self.chat(request).await {
            Ok(text) => StreamChunk::new(ModelStatus::End, text),
            Err(e) => StreamChunk {
                status: ModelStatus::ServerErr,
                text: String::new(),
                meta: Some(serde_json::json!({ "error": e.to_string() })),
            },
        };
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(chunk).await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider;

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<String, ProviderError> {
            Ok("fixed reply".into())
        }
    }

    #[test]
    fn generation_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.top_k, 1);
        assert!((opts.temperature - 0.75).abs() < f32::EPSILON);
        assert!(opts.stop.is_empty());
    }

    #[test]
    fn negative_codes_are_errors() {
        assert!(ModelStatus::ServerErr.is_error());
        assert!(ModelStatus::SessionInvalidArg.is_error());
        assert!(!ModelStatus::End.is_error());
        assert!(!ModelStatus::StreamIng.is_error());
    }

    #[tokio::test]
    async fn default_stream_wraps_chat() {
        let provider = FixedProvider;
        let mut rx = provider
            .stream_chat(ChatRequest {
                messages: vec![Message::user("hi")],
                options: GenerationOptions::default(),
            })
            .await
            .unwrap();
        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.status, ModelStatus::End);
        assert_eq!(chunk.text, "fixed reply");
        assert!(rx.recv().await.is_none());
    }
}
