pub mod budget;

pub use budget::{
    default_config_path, BudgetError, BudgetErrorKind, BudgetValidator, ChatMessage, MatchKind,
    ModelLimitEntry, ModelLimitRegistry, RegistryBuilder, TokenCounter, TokenizableInput,
    TokenizerId, TokenizerSet, ValidationResult, MODEL_LIMITS_ENV,
};
