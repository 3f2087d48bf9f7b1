//! Budget-aware request composition.
//!
//! Every request is validated against the target model's context window
//! before it reaches the provider, and completion-style requests carry the
//! remaining budget as their response length cap.

use crate::error::Result;
use crate::provider::{ChatRequest, CompletionRequest, EmbeddingRequest, LanguageModel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokenguard_core::{BudgetValidator, ChatMessage};

/// Per-adapter model selection, passed explicitly to each client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDefaults {
    pub completion_model: String,
    pub chat_model: String,
    pub embeddings_model: String,
    pub temperature: f32,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            completion_model: "gpt-3.5-turbo".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            embeddings_model: "text-embedding-ada-002".to_string(),
            temperature: 0.0,
        }
    }
}

/// Wraps a provider so that nothing is sent without a budget check.
pub struct BudgetedClient<L> {
    llm: L,
    validator: Arc<BudgetValidator>,
    defaults: ModelDefaults,
}

impl<L: LanguageModel> BudgetedClient<L> {
    pub fn new(llm: L, validator: Arc<BudgetValidator>) -> Self {
        Self {
            llm,
            validator,
            defaults: ModelDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: ModelDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    pub fn validator(&self) -> &BudgetValidator {
        &self.validator
    }

    pub fn defaults(&self) -> &ModelDefaults {
        &self.defaults
    }

    /// Validated embedding request for the default embeddings model.
    pub fn compose_embedding(&self, text: &str) -> Result<EmbeddingRequest> {
        let model = &self.defaults.embeddings_model;
        self.validator.validate(text, model)?;

        Ok(EmbeddingRequest {
            model: model.clone(),
            text: text.to_string(),
        })
    }

    /// Validated completion request with `max_tokens` set from the budget.
    pub fn compose_completion(&self, prompt: &str) -> Result<CompletionRequest> {
        let model = &self.defaults.completion_model;
        let budget = self.validator.check(prompt, model)?;

        Ok(CompletionRequest {
            model: model.clone(),
            prompt: prompt.to_string(),
            temperature: self.defaults.temperature,
            max_tokens: Some(budget.max_response_tokens()),
        })
    }

    /// Validated chat request with `max_tokens` set from the budget.
    pub fn compose_chat(&self, messages: Vec<ChatMessage>) -> Result<ChatRequest> {
        let model = &self.defaults.chat_model;
        let budget = self.validator.check(&messages, model)?;

        Ok(ChatRequest {
            model: model.clone(),
            messages,
            temperature: self.defaults.temperature,
            max_tokens: Some(budget.max_response_tokens()),
        })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = self.compose_embedding(text)?;
        self.llm.embed(request).await
    }

    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let request = self.compose_completion(prompt)?;
        log::debug!(
            "{}: completion with {} ({:?} max tokens)",
            self.llm.name(),
            request.model,
            request.max_tokens
        );
        self.llm.complete(request).await
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = self.compose_chat(messages)?;
        log::debug!(
            "{}: chat with {} over {} messages ({:?} max tokens)",
            self.llm.name(),
            request.model,
            request.messages.len(),
            request.max_tokens
        );
        self.llm.chat(request).await
    }
}
