//! Vector index abstraction and the Pinecone-style HTTP implementation.
//!
//! A namespace is the isolation boundary: every operation is scoped to one
//! tenant+source combination, and the engine never issues an unscoped call.
//! The [`VectorIndex`] trait is the seam the sync engine and retriever
//! depend on; tests inject an in-memory stub that records its state.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkMetadata, IndexedVector, SearchHit, SourceType};

pub const API_KEY_ENV: &str = "PINECONE_API_KEY";

/// Namespaced upsert / delete / similarity-search over embedded chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace vectors by chunk id.
    async fn upsert(&self, namespace: &str, items: &[IndexedVector]) -> Result<()>;

    /// Delete every vector whose metadata matches the source document id.
    async fn delete_by_document(&self, namespace: &str, source_document_id: &str) -> Result<()>;

    /// Top-k most similar chunks for a query vector, best first.
    async fn search(&self, namespace: &str, vector: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// Vector index client speaking the Pinecone data-plane API.
pub struct PineconeIndex {
    base_url: String,
    client: reqwest::Client,
    api_key: String,
}

impl PineconeIndex {
    /// Create a client against an index data-plane host. Requires
    /// `PINECONE_API_KEY`.
    pub fn new(config: IndexConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| Error::InvalidConfig(format!("{} not set", API_KEY_ENV)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::IndexWrite(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            api_key,
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::IndexWrite(format!("index request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::IndexWrite(format!(
                "index API error {}: {}",
                status, body_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, items: &[IndexedVector]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let vectors: Vec<WireVector> = items
            .iter()
            .map(|item| WireVector {
                id: item.chunk.id.clone(),
                values: item.vector.clone(),
                metadata: WireMetadata::from_chunk(&item.chunk),
            })
            .collect();

        self.post(
            "/vectors/upsert",
            &UpsertRequest {
                vectors,
                namespace,
            },
        )
        .await?;

        Ok(())
    }

    async fn delete_by_document(&self, namespace: &str, source_document_id: &str) -> Result<()> {
        self.post(
            "/vectors/delete",
            &DeleteRequest {
                filter: serde_json::json!({
                    "source_document_id": { "$eq": source_document_id }
                }),
                namespace,
            },
        )
        .await?;

        Ok(())
    }

    async fn search(&self, namespace: &str, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .post(
                "/query",
                &QueryRequest {
                    vector,
                    top_k: k,
                    namespace,
                    include_metadata: true,
                },
            )
            .await
            .map_err(|e| match e {
                Error::IndexWrite(msg) => Error::IndexQuery(msg),
                other => other,
            })?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::IndexQuery(format!("invalid query response: {}", e)))?;

        let mut hits = Vec::with_capacity(parsed.matches.len());
        for m in parsed.matches {
            match m.metadata {
                Some(metadata) => hits.push(SearchHit {
                    chunk: metadata.into_chunk(m.id),
                    score: m.score,
                }),
                None => {
                    tracing::warn!(chunk_id = %m.id, "search hit without metadata, skipping");
                }
            }
        }

        Ok(hits)
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<WireVector>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct WireVector {
    id: String,
    values: Vec<f32>,
    metadata: WireMetadata,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    filter: serde_json::Value,
    namespace: &'a str,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    namespace: &'a str,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<WireMetadata>,
}

/// Flat metadata record stored alongside each vector. The chunk text rides
/// in metadata so retrieval can rebuild full chunks from a single query.
#[derive(Serialize, Deserialize)]
struct WireMetadata {
    source_document_id: String,
    chunk_index: usize,
    total_chunks: usize,
    text: String,
    title: String,
    last_modified_at: DateTime<Utc>,
    source_type: SourceType,
    tenant_id: String,
    content_hash: String,
}

impl WireMetadata {
    fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            source_document_id: chunk.source_document_id.clone(),
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            text: chunk.text.clone(),
            title: chunk.metadata.title.clone(),
            last_modified_at: chunk.metadata.last_modified_at,
            source_type: chunk.metadata.source_type,
            tenant_id: chunk.metadata.tenant_id.clone(),
            content_hash: chunk.metadata.content_hash.clone(),
        }
    }

    fn into_chunk(self, id: String) -> Chunk {
        Chunk {
            id,
            source_document_id: self.source_document_id,
            chunk_index: self.chunk_index,
            total_chunks: self.total_chunks,
            text: self.text,
            metadata: ChunkMetadata {
                title: self.title,
                last_modified_at: self.last_modified_at,
                source_type: self.source_type,
                tenant_id: self.tenant_id,
                content_hash: self.content_hash,
            },
        }
    }
}
