//! Vector search over embedded texts, with retrieval-augmented `ask`.

mod memory;
mod similarity;

pub use memory::InMemoryVectorStore;
pub use similarity::cosine_similarity;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Results returned when a search does not name `k`.
pub const DEFAULT_K: usize = 4;

/// Placed between retrieved contexts in the generated prompt.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Question-answering prompt over retrieved contexts.
pub fn generate_prompt(question: &str, contexts: &[String]) -> String {
    format!(
        "Context:\n{}\n---\nQuestion: {}\n---\nAnswer:",
        contexts.join(CONTEXT_SEPARATOR),
        question
    )
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and store `texts`, returning their ids. Generated when `ids` is `None`.
    async fn add_texts(&self, texts: &[String], ids: Option<Vec<String>>) -> Result<Vec<String>>;

    /// Re-embed existing rows. Every id must already be stored.
    async fn update_texts(&self, texts: &[String], ids: &[String]) -> Result<Vec<String>>;

    /// Up to `k` stored texts closest to `query`, best first.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;

    async fn similarity_search_by_vector(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Answer `question` from the closest stored texts.
    async fn ask(&self, question: &str) -> Result<String>;
}
