//! Provider adapters share one capability trait and one budget validator.
//!
//! [`BudgetedClient`] runs every outgoing request through
//! [`tokenguard_core::BudgetValidator`] first; [`vectorsearch`] builds on it
//! for retrieval-augmented question answering.

pub mod client;
pub mod error;
pub mod provider;
pub mod vectorsearch;

pub use client::{BudgetedClient, ModelDefaults};
pub use error::{Capability, LlmError, Result};
pub use provider::{ChatRequest, CompletionRequest, EmbeddingRequest, LanguageModel};
pub use vectorsearch::{
    generate_prompt, InMemoryVectorStore, SearchResult, VectorStore, CONTEXT_SEPARATOR, DEFAULT_K,
};
