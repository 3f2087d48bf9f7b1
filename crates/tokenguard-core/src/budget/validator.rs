//! Budget validation: the single check callers run before sending a request.
//!
//! Resolves the model's limit, counts the input with that model's tokenizer,
//! and reports how many tokens remain for the response. Nothing is retried or
//! truncated here; those decisions belong to the caller.

use crate::budget::counter::{TokenizableInput, TokenizerSet};
use crate::budget::limits::{ModelLimitEntry, ModelLimitRegistry};
use crate::budget::types::{BudgetError, ValidationResult};
use std::sync::Arc;

/// Token budget validator shared by every provider adapter.
///
/// Holds only read-only state, so one instance can be cloned or shared
/// across threads and called concurrently.
#[derive(Debug, Clone)]
pub struct BudgetValidator {
    registry: Arc<ModelLimitRegistry>,
    tokenizers: Arc<TokenizerSet>,
}

impl BudgetValidator {
    /// Built-in limits and every built-in tokenizer, loaded eagerly.
    pub fn new() -> Result<Self, BudgetError> {
        Ok(Self::from_parts(
            ModelLimitRegistry::builtin(),
            TokenizerSet::builtin()?,
        ))
    }

    /// Built-in tokenizers with limits from [`ModelLimitRegistry::from_default_config`].
    pub fn from_default_config() -> Result<Self, BudgetError> {
        Ok(Self::from_parts(
            ModelLimitRegistry::from_default_config()?,
            TokenizerSet::builtin()?,
        ))
    }

    pub fn from_parts(registry: ModelLimitRegistry, tokenizers: TokenizerSet) -> Self {
        Self {
            registry: Arc::new(registry),
            tokenizers: Arc::new(tokenizers),
        }
    }

    pub fn registry(&self) -> &ModelLimitRegistry {
        &self.registry
    }

    pub fn tokenizers(&self) -> &TokenizerSet {
        &self.tokenizers
    }

    /// Tokens left for the response, or why the input cannot be sent.
    ///
    /// Input that exactly fills the window is accepted with `0` remaining.
    pub fn validate<'a>(
        &self,
        input: impl Into<TokenizableInput<'a>>,
        model: &str,
    ) -> Result<u32, BudgetError> {
        self.check(input, model).map(|result| result.tokens_remaining)
    }

    /// Same check as [`BudgetValidator::validate`], with the full accounting.
    pub fn check<'a>(
        &self,
        input: impl Into<TokenizableInput<'a>>,
        model: &str,
    ) -> Result<ValidationResult, BudgetError> {
        let entry = self.registry.limit_for(model)?;
        let used = self.count_with(&input.into(), entry, model)?;
        compare(entry, model, used)
    }

    /// Check a token count obtained elsewhere, e.g. from a provider's
    /// count-tokens endpoint for models with no local tokenizer.
    pub fn check_count(&self, used: u32, model: &str) -> Result<ValidationResult, BudgetError> {
        let entry = self.registry.limit_for(model)?;
        compare(entry, model, used)
    }

    /// Token length of `input` under `model`'s tokenizer, without comparing.
    pub fn count<'a>(
        &self,
        input: impl Into<TokenizableInput<'a>>,
        model: &str,
    ) -> Result<u32, BudgetError> {
        let entry = self.registry.limit_for(model)?;
        self.count_with(&input.into(), entry, model)
    }

    fn count_with(
        &self,
        input: &TokenizableInput<'_>,
        entry: &ModelLimitEntry,
        model: &str,
    ) -> Result<u32, BudgetError> {
        let tokenizer = entry
            .tokenizer
            .as_ref()
            .ok_or_else(|| BudgetError::UnsupportedTokenizer {
                tokenizer: "none".to_string(),
                model: Some(model.to_string()),
            })?;

        self.tokenizers
            .count(input, tokenizer)
            .map_err(|err| match err {
                BudgetError::UnsupportedTokenizer { tokenizer, .. } => {
                    BudgetError::UnsupportedTokenizer {
                        tokenizer,
                        model: Some(model.to_string()),
                    }
                }
                other => other,
            })
    }
}

fn compare(
    entry: &ModelLimitEntry,
    model: &str,
    used: u32,
) -> Result<ValidationResult, BudgetError> {
    let limit = entry.max_context_tokens;

    if used > limit {
        log::debug!(
            "Budget exceeded for {}: {} tokens used, limit {}",
            model,
            used,
            limit
        );
        return Err(BudgetError::TokenLimitExceeded { limit, used });
    }

    log::debug!(
        "Budget ok for {} (matched '{}'): {}/{} tokens used",
        model,
        entry.model_pattern,
        used,
        limit
    );

    Ok(ValidationResult {
        model: model.to_string(),
        limit,
        tokens_used: used,
        tokens_remaining: limit - used,
        max_completion_tokens: entry.max_completion_tokens,
    })
}
