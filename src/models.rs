//! Core data models used throughout Waypoint.
//!
//! These types represent the tenants, source documents, chunks, and vectors
//! that flow through the sync and answering pipelines. Chunk ids are a pure
//! function of their inputs, which is what makes re-indexing idempotent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant resolved from configuration at request or sync entry.
///
/// Resolved once and threaded as an explicit value through every call;
/// the pipeline never mutates it and never keeps ambient tenant state.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: String,
    pub workspace: Option<WorkspaceSource>,
    pub codehost: Option<CodeHostSource>,
}

/// Workspace-docs source settings for one tenant.
#[derive(Debug, Clone)]
pub struct WorkspaceSource {
    pub database_id: String,
    /// Vector index namespace scoping this tenant's workspace chunks.
    pub namespace: String,
}

/// Code-host source settings for one tenant.
#[derive(Debug, Clone)]
pub struct CodeHostSource {
    pub owner: String,
    pub repo: String,
    /// Vector index namespace scoping this tenant's code-host chunks.
    pub namespace: String,
}

impl Tenant {
    /// The index namespace for a source kind, if the tenant has that source.
    pub fn namespace(&self, kind: SourceKind) -> Option<&str> {
        match kind {
            SourceKind::Workspace => self.workspace.as_ref().map(|s| s.namespace.as_str()),
            SourceKind::CodeHost => self.codehost.as_ref().map(|s| s.namespace.as_str()),
        }
    }
}

/// A syncable source family. One connector serves one kind; the code-host
/// connector yields several [`SourceType`]s (issues, PRs, commits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Workspace,
    CodeHost,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Workspace => "workspace",
            SourceKind::CodeHost => "codehost",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "workspace" => Ok(SourceKind::Workspace),
            "codehost" | "code-host" => Ok(SourceKind::CodeHost),
            other => Err(format!(
                "unknown source kind '{}'. Available: workspace, codehost",
                other
            )),
        }
    }
}

/// The concrete type of an upstream document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    WorkspaceDoc,
    Issue,
    PullRequest,
    Commit,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::WorkspaceDoc => "workspace-doc",
            SourceType::Issue => "issue",
            SourceType::PullRequest => "pull-request",
            SourceType::Commit => "commit",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of an upstream document, produced by a connector
/// fetch and consumed once per sync pass.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub source_type: SourceType,
    pub external_id: String,
    pub title: String,
    pub raw_text: String,
    pub last_modified_at: DateTime<Utc>,
}

impl SourceDocument {
    /// Stable document id shared by all chunks of this document.
    pub fn document_id(&self) -> String {
        format!("{}:{}", self.source_type, self.external_id)
    }
}

/// A bounded-size text fragment derived from a source document; the atomic
/// unit embedded and indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic id: `{source_type}:{external_id}:{chunk_index}`.
    /// Re-chunking the same document version yields the same id set.
    pub id: String,
    pub source_document_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Compute the deterministic chunk id for a document and position.
    pub fn id_for(source_type: SourceType, external_id: &str, chunk_index: usize) -> String {
        format!("{}:{}:{}", source_type, external_id, chunk_index)
    }
}

/// Metadata attached to every indexed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub last_modified_at: DateTime<Utc>,
    pub source_type: SourceType,
    pub tenant_id: String,
    /// SHA-256 of the chunk text, used for staleness checks.
    pub content_hash: String,
}

/// The unit stored in the vector index: one embedded chunk.
#[derive(Debug, Clone)]
pub struct IndexedVector {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One similarity-search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Outcome of one sync pass for a tenant and source kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Documents fully processed (deleted, chunked, embedded, upserted).
    pub processed: u64,
    /// Documents skipped because their text was empty.
    pub skipped: u64,
    /// Documents that failed; the pass continued without them.
    pub failed: u64,
    /// Chunks written across all processed documents (estimated on dry runs).
    pub chunks_written: u64,
}

/// Query category produced by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Conversation,
    WorkspaceDocs,
    CodeHost,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Conversation => "conversation",
            Category::WorkspaceDocs => "workspace-docs",
            Category::CodeHost => "code-host",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of one chat message sent to the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a completion request.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_deterministic() {
        let a = Chunk::id_for(SourceType::Issue, "42", 0);
        let b = Chunk::id_for(SourceType::Issue, "42", 0);
        assert_eq!(a, b);
        assert_eq!(a, "issue:42:0");
    }

    #[test]
    fn test_chunk_ids_distinct_across_types() {
        let issue = Chunk::id_for(SourceType::Issue, "42", 0);
        let pr = Chunk::id_for(SourceType::PullRequest, "42", 0);
        assert_ne!(issue, pr);
    }

    #[test]
    fn test_source_kind_parses_aliases() {
        assert_eq!("workspace".parse::<SourceKind>(), Ok(SourceKind::Workspace));
        assert_eq!("codehost".parse::<SourceKind>(), Ok(SourceKind::CodeHost));
        assert_eq!("code-host".parse::<SourceKind>(), Ok(SourceKind::CodeHost));
        assert!("slack".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_tenant_namespace_lookup() {
        let tenant = Tenant {
            id: "acme".to_string(),
            workspace: Some(WorkspaceSource {
                database_id: "db1".to_string(),
                namespace: "acme-workspace".to_string(),
            }),
            codehost: None,
        };
        assert_eq!(
            tenant.namespace(SourceKind::Workspace),
            Some("acme-workspace")
        );
        assert_eq!(tenant.namespace(SourceKind::CodeHost), None);
    }
}
