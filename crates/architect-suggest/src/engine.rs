use async_trait::async_trait;
use futures::{Stream, StreamExt};
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, StructuredOutputFormat};
use llm::LLMProvider;
use serde_json::json;
use std::pin::Pin;
use thiserror::Error;

use architect_core::AiSettings;

use crate::prompt::response_schema;
use crate::SessionHandle;

/// Name the reply schema is registered under with the provider.
const RESPONSE_FORMAT_NAME: &str = "prompt_variations";

/// Incremental text fragments of one reply.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("assistant is not configured (provider '{provider}', model '{model}')")]
    NotConfigured { provider: String, model: String },

    #[error("build LLM: {0}")]
    Build(String),

    #[error("chat: {0}")]
    Request(String),

    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// The remote assistant, reached through a streaming request.
#[async_trait]
pub trait AssistantTransport: Send + Sync {
    /// Send `message` in the context of `handle` (system instruction plus
    /// prior exchanges) and return the reply as a stream of text chunks.
    async fn open_stream(
        &self,
        handle: &SessionHandle,
        message: &str,
    ) -> Result<ReplyStream, TransportError>;
}

fn map_backend(provider: &str) -> Result<LLMBackend, TransportError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(TransportError::UnknownProvider(other.to_string())),
    }
}

/// JSON-mode constraint for the reply. Only Google accepts a top-level array
/// schema; other backends rely on the schema embedded in the system
/// instruction.
fn response_format(backend: &LLMBackend) -> Result<Option<StructuredOutputFormat>, TransportError> {
    if !matches!(backend, LLMBackend::Google) {
        return Ok(None);
    }
    serde_json::from_value(json!({
        "name": RESPONSE_FORMAT_NAME,
        "schema": response_schema(),
    }))
    .map(Some)
    .map_err(|e| TransportError::Build(format!("response schema: {e}")))
}

/// Transport backed by the `llm` crate's provider clients.
#[derive(Debug, Clone)]
pub struct LlmTransport {
    settings: AiSettings,
}

impl LlmTransport {
    pub fn new(settings: AiSettings) -> Self {
        Self { settings }
    }

    /// Transport configured from the settings file and environment.
    pub fn from_global() -> Self {
        Self::new(architect_core::read_settings())
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }

    fn build(&self, handle: &SessionHandle) -> Result<Box<dyn LLMProvider>, TransportError> {
        if !architect_core::ai_configured(&self.settings) {
            return Err(TransportError::NotConfigured {
                provider: self.settings.provider.clone(),
                model: self.settings.model.clone(),
            });
        }
        let backend = map_backend(&self.settings.provider)?;
        let format = response_format(&backend)?;

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(&self.settings.model)
            .system(handle.system_instruction());

        if !self.settings.api_key.is_empty() {
            builder = builder.api_key(&self.settings.api_key);
        }
        if let Some(format) = format {
            builder = builder.schema(format);
        }

        builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))
    }
}

#[async_trait]
impl AssistantTransport for LlmTransport {
    async fn open_stream(
        &self,
        handle: &SessionHandle,
        message: &str,
    ) -> Result<ReplyStream, TransportError> {
        let llm = self.build(handle)?;

        let mut messages = Vec::with_capacity(handle.history().len() * 2 + 1);
        for exchange in handle.history() {
            messages.push(ChatMessage::user().content(exchange.message.as_str()).build());
            messages.push(ChatMessage::assistant().content(exchange.reply.as_str()).build());
        }
        messages.push(ChatMessage::user().content(message).build());

        tracing::debug!(
            provider = %self.settings.provider,
            model = %self.settings.model,
            prior = handle.history().len(),
            "opening assistant stream"
        );

        let stream = llm
            .chat_stream(&messages)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Box::pin(stream.map(|chunk| {
            chunk.map_err(|e| TransportError::Stream(e.to_string()))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_map() {
        for name in ["openai", "anthropic", "google", "ollama", "groq", "mistral", "deepseek"] {
            assert!(map_backend(name).is_ok(), "{name}");
        }
        assert_eq!(
            map_backend("palm").unwrap_err(),
            TransportError::UnknownProvider("palm".to_string())
        );
    }

    #[test]
    fn google_replies_are_held_to_the_suggestion_schema() {
        let format = response_format(&LLMBackend::Google)
            .unwrap()
            .expect("google takes a response schema");
        assert_eq!(format.name, RESPONSE_FORMAT_NAME);
        assert_eq!(format.schema, Some(response_schema()));

        assert!(response_format(&LLMBackend::OpenAI).unwrap().is_none());
        assert!(response_format(&LLMBackend::Anthropic).unwrap().is_none());
    }

    #[tokio::test]
    async fn unconfigured_settings_fail_before_any_request() {
        let transport = LlmTransport::new(AiSettings {
            api_key: String::new(),
            ..AiSettings::default()
        });
        let err = match transport.open_stream(&SessionHandle::new(), "hi").await {
            Err(e) => e,
            Ok(_) => panic!("expected a configuration error"),
        };
        assert!(matches!(err, TransportError::NotConfigured { .. }));
    }
}
