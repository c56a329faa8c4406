//! Error taxonomy for the answering and sync pipelines.
//!
//! The library surfaces typed errors; the `waypoint` binary wraps them in
//! `anyhow` at the top level. Two outcomes are deliberately *not* errors:
//! an empty retrieval result (signaled by an empty `Vec`) and a malformed
//! classifier response (resolved to the conversation default category).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad chunk sizing, unknown tenant, or missing source configuration.
    /// Fatal: surfaced to the caller, never retried.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A connector fetch against an upstream API failed. The current sync
    /// pass aborts before any index writes; the next scheduled pass retries.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// An embedding request failed for one unit of work.
    #[error("embedding request failed: {0}")]
    Embedding(String),

    /// A vector index upsert or delete failed for one unit of work.
    #[error("vector index write failed: {0}")]
    IndexWrite(String),

    /// A vector index similarity query failed.
    #[error("vector index query failed: {0}")]
    IndexQuery(String),

    /// An LLM completion request failed.
    #[error("completion request failed: {0}")]
    Completion(String),

    /// Checkpoint store I/O failed.
    #[error("checkpoint storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A sync pass for the same tenant and source is already running.
    #[error("sync already in progress for {tenant}/{source_kind}")]
    SyncInProgress { tenant: String, source_kind: String },
}
