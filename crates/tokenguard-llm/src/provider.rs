use crate::error::{Capability, LlmError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokenguard_core::ChatMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    /// Response length cap forwarded to the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Response length cap forwarded to the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// The verb set every LLM provider adapter maps onto its own API.
///
/// Providers implement only the capabilities they have; the rest report
/// `LlmError::Unsupported`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name used in errors and logs
    fn name(&self) -> &str;

    /// Embedding vector for `request.text`
    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>> {
        let _ = request;
        Err(unsupported(self.name(), Capability::Embed))
    }

    /// Text completion for a single prompt
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let _ = request;
        Err(unsupported(self.name(), Capability::Complete))
    }

    /// Assistant reply to a chat history
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let _ = request;
        Err(unsupported(self.name(), Capability::Chat))
    }
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>> {
        (**self).embed(request).await
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        (**self).complete(request).await
    }

    async fn chat(&self, request: ChatRequest) -> Result<String> {
        (**self).chat(request).await
    }
}

fn unsupported(provider: &str, capability: Capability) -> LlmError {
    LlmError::Unsupported {
        provider: provider.to_string(),
        capability,
    }
}
