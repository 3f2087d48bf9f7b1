//! Core types for token budget validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a successful budget check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Model name the caller asked about (not the matched pattern)
    pub model: String,
    /// Context window of the resolved entry
    pub limit: u32,
    /// Tokens consumed by the input
    pub tokens_used: u32,
    /// Tokens left in the context window; zero at the exact limit
    pub tokens_remaining: u32,
    /// Separate cap some models put on completion length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

impl ValidationResult {
    /// Tokens a caller may request for the response.
    ///
    /// This is `tokens_remaining`, clamped to the model's completion cap when
    /// it has one (e.g. 128k-context models that only emit 4096 tokens).
    pub fn max_response_tokens(&self) -> u32 {
        match self.max_completion_tokens {
            Some(cap) => self.tokens_remaining.min(cap),
            None => self.tokens_remaining,
        }
    }

    /// Percentage of the context window consumed by the input.
    pub fn usage_percentage(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        (self.tokens_used as f64 / self.limit as f64) * 100.0
    }
}

/// Errors raised by the registry, the counter and the validator.
#[derive(Debug, Error)]
pub enum BudgetError {
    /// Model name matches neither an exact entry nor a family prefix
    #[error("Unknown model '{model}': no exact or family match in the model limit registry")]
    UnknownModel { model: String },

    /// Registry entry points at a tokenizer the counter does not provide
    #[error("Tokenizer '{tokenizer}' is not supported{}", required_by(.model))]
    UnsupportedTokenizer {
        tokenizer: String,
        model: Option<String>,
    },

    /// Input does not fit in the model's context window
    #[error("This model's maximum context length is {limit} tokens, but the given text is {used} tokens long.")]
    TokenLimitExceeded { limit: u32, used: u32 },

    /// A built-in encoding failed to load
    #[error("Failed to initialize tokenizer '{tokenizer}': {reason}")]
    TokenizerInit { tokenizer: String, reason: String },

    /// Model limit override file could not be read or parsed
    #[error("Invalid model limit configuration: {0}")]
    Config(String),
}

fn required_by(model: &Option<String>) -> String {
    model
        .as_ref()
        .map(|m| format!(" (required by model '{m}')"))
        .unwrap_or_default()
}

/// Discriminant of [`BudgetError`], for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetErrorKind {
    UnknownModel,
    UnsupportedTokenizer,
    TokenLimitExceeded,
    TokenizerInit,
    Config,
}

impl BudgetError {
    pub fn kind(&self) -> BudgetErrorKind {
        match self {
            Self::UnknownModel { .. } => BudgetErrorKind::UnknownModel,
            Self::UnsupportedTokenizer { .. } => BudgetErrorKind::UnsupportedTokenizer,
            Self::TokenLimitExceeded { .. } => BudgetErrorKind::TokenLimitExceeded,
            Self::TokenizerInit { .. } => BudgetErrorKind::TokenizerInit,
            Self::Config(_) => BudgetErrorKind::Config,
        }
    }

    /// Number of tokens over the limit, for `TokenLimitExceeded` only.
    pub fn overflow(&self) -> Option<u32> {
        match self {
            Self::TokenLimitExceeded { limit, used } => Some(used.saturating_sub(*limit)),
            _ => None,
        }
    }
}
