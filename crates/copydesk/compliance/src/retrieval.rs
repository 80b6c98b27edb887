//! Retrieval collaborators supplying policy context to the evaluator.

use crate::{ComplianceError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// A scored passage from the policy corpus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub document_id: String,
    pub text: String,
    pub score: f32,
}

/// Semantic search over policy documents. An empty answer is valid.
#[async_trait]
pub trait Retrieval: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedPassage>>;
}

/// Maintenance side of the policy corpus.
#[async_trait]
pub trait DocumentIngestion: Send + Sync {
    /// Index (or re-index) a document. Returns the number of chunks stored.
    async fn index(&self, document_id: &str, text: &str, metadata: serde_json::Value)
        -> Result<usize>;

    /// Remove a document. Returns `false` if it was not indexed.
    async fn delete(&self, document_id: &str) -> Result<bool>;
}

/// Retrieval that never finds anything; evaluation falls back to rule matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRetrieval;

#[async_trait]
impl Retrieval for NoopRetrieval {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedPassage>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl DocumentIngestion for NoopRetrieval {
    async fn index(
        &self,
        _document_id: &str,
        _text: &str,
        _metadata: serde_json::Value,
    ) -> Result<usize> {
        Ok(0)
    }

    async fn delete(&self, _document_id: &str) -> Result<bool> {
        Ok(false)
    }
}

struct Chunk {
    document_id: String,
    text: String,
    terms: HashMap<String, f32>,
}

/// Bag-of-words index over paragraph chunks, scored by cosine similarity.
#[derive(Default)]
pub struct InMemoryPolicyIndex {
    chunks: RwLock<Vec<Chunk>>,
    metadata: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryPolicyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.metadata.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn metadata(&self, document_id: &str) -> Option<serde_json::Value> {
        self.metadata
            .read()
            .ok()
            .and_then(|m| m.get(document_id).cloned())
    }
}

#[async_trait]
impl Retrieval for InMemoryPolicyIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedPassage>> {
        let query_terms = term_frequencies(query);
        if query_terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let chunks = self
            .chunks
            .read()
            .map_err(|_| ComplianceError::Retrieval("policy index lock poisoned".to_string()))?;

        let mut hits = chunks
            .iter()
            .filter_map(|chunk| {
                cosine_similarity(&query_terms, &chunk.terms)
                    .filter(|score| *score > 0.0)
                    .map(|score| RetrievedPassage {
                        document_id: chunk.document_id.clone(),
                        text: chunk.text.clone(),
                        score,
                    })
            })
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[async_trait]
impl DocumentIngestion for InMemoryPolicyIndex {
    async fn index(
        &self,
        document_id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<usize> {
        if document_id.trim().is_empty() {
            return Err(ComplianceError::InvalidInput(
                "document id must not be empty".to_string(),
            ));
        }
        let fresh = split_paragraphs(text)
            .map(|paragraph| Chunk {
                document_id: document_id.to_string(),
                terms: term_frequencies(paragraph),
                text: paragraph.to_string(),
            })
            .filter(|chunk| !chunk.terms.is_empty())
            .collect::<Vec<_>>();
        let count = fresh.len();

        let mut chunks = self
            .chunks
            .write()
            .map_err(|_| ComplianceError::Retrieval("policy index lock poisoned".to_string()))?;
        chunks.retain(|chunk| chunk.document_id != document_id);
        chunks.extend(fresh);
        drop(chunks);

        self.metadata
            .write()
            .map_err(|_| ComplianceError::Retrieval("policy index lock poisoned".to_string()))?
            .insert(document_id.to_string(), metadata);
        Ok(count)
    }

    async fn delete(&self, document_id: &str) -> Result<bool> {
        let mut chunks = self
            .chunks
            .write()
            .map_err(|_| ComplianceError::Retrieval("policy index lock poisoned".to_string()))?;
        chunks.retain(|chunk| chunk.document_id != document_id);
        drop(chunks);

        let removed = self
            .metadata
            .write()
            .map_err(|_| ComplianceError::Retrieval("policy index lock poisoned".to_string()))?
            .remove(document_id)
            .is_some();
        Ok(removed)
    }
}

fn split_paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n")
        .flat_map(|block| block.split("\r\n\r\n"))
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut terms = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 1)
    {
        *terms.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

fn cosine_similarity(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> Option<f32> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let dot: f32 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.values().map(|y| y * y).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDBOOK: &str = "Water resistance claims must cite the IP rating.\n\n\
        Financial promotions must state that capital is at risk.\n\n\
        Health claims require documented clinical evidence.";

    #[tokio::test]
    async fn search_ranks_relevant_paragraph_first() {
        let index = InMemoryPolicyIndex::new();
        let chunks = index
            .index("handbook", HANDBOOK, serde_json::json!({"title": "Handbook"}))
            .await
            .unwrap();
        assert_eq!(chunks, 3);

        let hits = index.search("is our waterproof phone rating ok? water resistance", 2).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].text.starts_with("Water resistance"));
        assert!(hits.len() <= 2);
    }

    #[tokio::test]
    async fn reindex_replaces_and_delete_removes() {
        let index = InMemoryPolicyIndex::new();
        index
            .index("doc", HANDBOOK, serde_json::Value::Null)
            .await
            .unwrap();
        index
            .index("doc", "Only one paragraph about pricing.", serde_json::Value::Null)
            .await
            .unwrap();
        assert!(index.search("clinical evidence", 5).await.unwrap().is_empty());

        assert!(index.delete("doc").await.unwrap());
        assert!(!index.delete("doc").await.unwrap());
        assert!(index.search("pricing", 5).await.unwrap().is_empty());
        assert_eq!(index.document_count(), 0);
    }

    #[tokio::test]
    async fn noop_retrieval_is_empty() {
        let hits = NoopRetrieval.search("anything", 5).await.unwrap();
        assert!(hits.is_empty());
    }
}
