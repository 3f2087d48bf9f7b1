//! Token budget validation for LLM requests.
//!
//! Answers, before a request leaves the process, whether the prompt fits the
//! target model's context window and how many tokens remain for the response.
//!
//! # Key Components
//!
//! - [`limits`]: Model context window limits registry
//! - [`counter`]: Token counting with the model's own encoding
//! - [`validator`]: Limit lookup + counting + boundary arithmetic
//! - [`types`]: Errors and `ValidationResult`

pub mod counter;
pub mod limits;
pub mod types;
pub mod validator;

pub use counter::{
    BpeTokenCounter, ChatMessage, HeuristicTokenCounter, SharedTokenCounter, TokenCounter,
    TokenizableInput, TokenizerId, TokenizerSet,
};
pub use limits::{
    default_config_path, KnownModel, MatchKind, ModelLimitEntry, ModelLimitRegistry,
    RegistryBuilder, KNOWN_MODEL_LIMITS, MODEL_LIMITS_ENV,
};
pub use types::{BudgetError, BudgetErrorKind, ValidationResult};
pub use validator::BudgetValidator;
