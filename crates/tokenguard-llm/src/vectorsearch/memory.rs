use super::{cosine_similarity, generate_prompt, SearchResult, VectorStore, DEFAULT_K};
use crate::client::BudgetedClient;
use crate::error::{LlmError, Result};
use crate::provider::LanguageModel;
use async_trait::async_trait;
use std::collections::HashSet;
use tokenguard_core::ChatMessage;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Row {
    id: String,
    text: String,
    embedding: Vec<f32>,
}

/// Vector store kept in process memory.
///
/// Embeddings and the `ask` chat call go through a [`BudgetedClient`], so
/// oversized texts are rejected before reaching the provider.
pub struct InMemoryVectorStore<L> {
    client: BudgetedClient<L>,
    rows: RwLock<Vec<Row>>,
}

impl<L: LanguageModel> InMemoryVectorStore<L> {
    pub fn new(client: BudgetedClient<L>) -> Self {
        Self {
            client,
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn client(&self) -> &BudgetedClient<L> {
        &self.client
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.client.embed(text).await?);
        }
        Ok(embeddings)
    }
}

fn check_lengths(texts: usize, ids: usize) -> Result<()> {
    if texts != ids {
        return Err(LlmError::Store(format!("{texts} texts given with {ids} ids")));
    }
    Ok(())
}

/// Rejects ids already stored or repeated within the batch.
fn check_new_ids(rows: &[Row], ids: &[String]) -> Result<()> {
    let mut seen: HashSet<&str> = rows.iter().map(|row| row.id.as_str()).collect();
    match ids.iter().find(|id| !seen.insert(id.as_str())) {
        Some(id) => Err(LlmError::Store(format!("Duplicate id '{id}'"))),
        None => Ok(()),
    }
}

/// Every embedding must match the stored dimension, or the first of the
/// batch when the store is empty.
fn check_dimensions(rows: &[Row], embeddings: &[Vec<f32>]) -> Result<()> {
    let expected = rows
        .first()
        .map(|row| row.embedding.len())
        .or_else(|| embeddings.first().map(Vec::len));

    let Some(expected) = expected else {
        return Ok(());
    };
    match embeddings.iter().find(|e| e.len() != expected) {
        Some(embedding) => Err(LlmError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        }),
        None => Ok(()),
    }
}

fn positions_of(rows: &[Row], ids: &[String]) -> Result<Vec<usize>> {
    ids.iter()
        .map(|id| {
            rows.iter()
                .position(|row| &row.id == id)
                .ok_or_else(|| LlmError::Store(format!("Unknown id '{id}'")))
        })
        .collect()
}

#[async_trait]
impl<L: LanguageModel> VectorStore for InMemoryVectorStore<L> {
    async fn add_texts(&self, texts: &[String], ids: Option<Vec<String>>) -> Result<Vec<String>> {
        let ids = match ids {
            Some(ids) => {
                check_lengths(texts.len(), ids.len())?;
                ids
            }
            None => texts.iter().map(|_| Uuid::new_v4().to_string()).collect(),
        };

        check_new_ids(&self.rows.read().await, &ids)?;

        let embeddings = self.embed_all(texts).await?;

        let mut rows = self.rows.write().await;
        // Rows may have changed while embedding.
        check_new_ids(&rows, &ids)?;
        check_dimensions(&rows, &embeddings)?;

        rows.extend(
            ids.iter()
                .zip(texts)
                .zip(embeddings)
                .map(|((id, text), embedding)| Row {
                    id: id.clone(),
                    text: text.clone(),
                    embedding,
                }),
        );
        log::debug!("Stored {} texts ({} total)", ids.len(), rows.len());

        Ok(ids)
    }

    async fn update_texts(&self, texts: &[String], ids: &[String]) -> Result<Vec<String>> {
        check_lengths(texts.len(), ids.len())?;
        positions_of(&self.rows.read().await, ids)?;

        let embeddings = self.embed_all(texts).await?;

        let mut rows = self.rows.write().await;
        let positions = positions_of(&rows, ids)?;
        check_dimensions(&rows, &embeddings)?;

        for ((position, text), embedding) in positions.into_iter().zip(texts).zip(embeddings) {
            rows[position].text = text.clone();
            rows[position].embedding = embedding;
        }

        Ok(ids.to_vec())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let embedding = self.client.embed(query).await?;
        self.similarity_search_by_vector(&embedding, k).await
    }

    async fn similarity_search_by_vector(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let rows = self.rows.read().await;
        let k = k.min(rows.len());

        let mut results = rows
            .iter()
            .map(|row| {
                Ok(SearchResult {
                    id: row.id.clone(),
                    text: row.text.clone(),
                    score: cosine_similarity(&row.embedding, embedding)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);

        Ok(results)
    }

    async fn ask(&self, question: &str) -> Result<String> {
        let contexts: Vec<String> = self
            .similarity_search(question, DEFAULT_K)
            .await?
            .into_iter()
            .map(|result| result.text)
            .collect();

        let prompt = generate_prompt(question, &contexts);
        self.client.chat(vec![ChatMessage::user(prompt)]).await
    }
}
