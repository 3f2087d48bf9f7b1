use std::fmt;
use thiserror::Error;
use tokenguard_core::BudgetError;

/// Verb a provider may or may not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Embed,
    Complete,
    Chat,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embed => "embed",
            Self::Complete => "complete",
            Self::Chat => "chat",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("Provider '{provider}' does not support {capability}")]
    Unsupported {
        provider: String,
        capability: Capability,
    },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl LlmError {
    /// The budget failure behind this error, if any.
    pub fn as_budget(&self) -> Option<&BudgetError> {
        match self {
            Self::Budget(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
