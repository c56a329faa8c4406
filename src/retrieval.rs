//! Semantic retrieval over a tenant-scoped namespace.
//!
//! Embeds the query and runs a top-k similarity search. An empty result is
//! a normal outcome (the composer renders the no-information message), not
//! an error.

use std::sync::Arc;

use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::Chunk;

pub struct Retriever {
    embeddings: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embeddings: Arc<dyn EmbeddingService>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embeddings, index }
    }

    /// Top-k most similar chunks for a query, best first, length ≤ k.
    pub async fn retrieve(&self, query: &str, namespace: &str, k: usize) -> Result<Vec<Chunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embeddings.embed(query).await?;
        let hits = self.index.search(namespace, &vector, k).await?;

        tracing::debug!(
            namespace = namespace,
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieval complete"
        );

        Ok(hits.into_iter().map(|h| h.chunk).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{ChunkMetadata, SearchHit, SourceType};
    use async_trait::async_trait;
    use chrono::Utc;

    struct FixedEmbeddings;

    #[async_trait]
    impl EmbeddingService for FixedEmbeddings {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct FixedIndex {
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn upsert(&self, _: &str, _: &[crate::models::IndexedVector]) -> Result<()> {
            Ok(())
        }

        async fn delete_by_document(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _: &str, _: &[f32], k: usize) -> Result<Vec<SearchHit>> {
            Ok(self.hits.iter().take(k).cloned().collect())
        }
    }

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            chunk: Chunk {
                id: id.to_string(),
                source_document_id: "issue:1".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                text: "text".to_string(),
                metadata: ChunkMetadata {
                    title: "t".to_string(),
                    last_modified_at: Utc::now(),
                    source_type: SourceType::Issue,
                    tenant_id: "acme".to_string(),
                    content_hash: "h".to_string(),
                },
            },
            score,
        }
    }

    #[tokio::test]
    async fn test_empty_namespace_returns_empty_not_error() {
        let retriever = Retriever::new(
            std::sync::Arc::new(FixedEmbeddings),
            std::sync::Arc::new(FixedIndex { hits: vec![] }),
        );
        let chunks = retriever.retrieve("anything", "empty-ns", 5).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_results_capped_at_k_and_ordered() {
        let retriever = Retriever::new(
            std::sync::Arc::new(FixedEmbeddings),
            std::sync::Arc::new(FixedIndex {
                hits: vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)],
            }),
        );
        let chunks = retriever.retrieve("query", "ns", 2).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "a");
        assert_eq!(chunks[1].id, "b");
    }

    #[tokio::test]
    async fn test_blank_query_short_circuits() {
        struct FailingIndex;

        #[async_trait]
        impl VectorIndex for FailingIndex {
            async fn upsert(&self, _: &str, _: &[crate::models::IndexedVector]) -> Result<()> {
                Ok(())
            }
            async fn delete_by_document(&self, _: &str, _: &str) -> Result<()> {
                Ok(())
            }
            async fn search(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<SearchHit>> {
                Err(Error::IndexQuery("should not be called".to_string()))
            }
        }

        let retriever = Retriever::new(
            std::sync::Arc::new(FixedEmbeddings),
            std::sync::Arc::new(FailingIndex),
        );
        let chunks = retriever.retrieve("   ", "ns", 5).await.unwrap();
        assert!(chunks.is_empty());
    }
}
