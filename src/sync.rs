//! Incremental embedding sync engine.
//!
//! Orchestrates the full pass for one tenant and source kind:
//! connector listing → per-document delete-before-insert → chunking →
//! embedding → index upsert, with a bounded worker pool across the document
//! batch. One document failing is logged and counted; it never aborts the
//! pass. The per-(tenant, source) checkpoint is the only durable state and
//! is advanced to the pass start time in a single atomic upsert.
//!
//! Two passes for the *same* tenant and source are mutually exclusive;
//! passes for different tenants or sources run independently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chunker::{chunk_document, chunk_text};
use crate::config::{ChunkingConfig, Config};
use crate::connector::{connector_for, SourceConnector};
use crate::db;
use crate::embedding::{EmbeddingService, OpenAiEmbeddings};
use crate::error::{Error, Result};
use crate::index::{PineconeIndex, VectorIndex};
use crate::models::{IndexedVector, SourceDocument, SourceKind, SyncReport, Tenant};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Ignore the checkpoint and reprocess everything upstream reports.
    pub full: bool,
    /// Fetch and count chunks without writing to the index or checkpoint.
    pub dry_run: bool,
}

/// Sync trigger invoked by a scheduler or the CLI.
///
/// Resolves the tenant, wires the production clients, and runs one pass.
/// The database must have been initialized (`waypoint init`).
pub async fn trigger_sync(
    config: &Config,
    tenant_id: &str,
    kind: SourceKind,
    opts: SyncOptions,
) -> Result<SyncReport> {
    let tenant = config.resolve_tenant(tenant_id)?;
    let connector = connector_for(&tenant, kind)?;

    let embeddings: Arc<dyn EmbeddingService> =
        Arc::new(OpenAiEmbeddings::new(config.embedding.clone())?);
    let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::new(config.index.clone())?);

    let pool = db::connect(config).await?;
    let engine = SyncEngine::new(pool.clone(), embeddings, index, config);
    let report = engine.sync(&tenant, kind, connector, opts).await;
    pool.close().await;
    report
}

pub struct SyncEngine {
    pool: SqlitePool,
    embeddings: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
    max_concurrency: usize,
    lookback: Duration,
}

impl SyncEngine {
    pub fn new(
        pool: SqlitePool,
        embeddings: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        config: &Config,
    ) -> Self {
        Self {
            pool,
            embeddings,
            index,
            chunking: config.chunking.clone(),
            max_concurrency: config.sync.max_concurrency,
            lookback: Duration::hours(config.sync.lookback_hours as i64),
        }
    }

    /// Run one sync pass for a tenant and source kind.
    pub async fn sync(
        &self,
        tenant: &Tenant,
        kind: SourceKind,
        connector: Arc<dyn SourceConnector>,
        opts: SyncOptions,
    ) -> Result<SyncReport> {
        // Held for the whole pass; released on every exit path by Drop.
        let _guard = SyncLockRegistry::global().acquire(&tenant.id, kind)?;

        let namespace = tenant.namespace(kind).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "tenant '{}' has no {} source configured",
                tenant.id, kind
            ))
        })?;
        let namespace = namespace.to_string();

        let pass_started_at = Utc::now();
        let since = if opts.full {
            DateTime::<Utc>::UNIX_EPOCH
        } else {
            match get_checkpoint(&self.pool, &tenant.id, kind).await? {
                Some(checkpoint) => checkpoint,
                None => pass_started_at - self.lookback,
            }
        };

        tracing::info!(
            tenant = %tenant.id,
            source = %kind,
            %since,
            "sync pass started"
        );

        let documents = connector.list_changed(since).await?;
        tracing::info!(count = documents.len(), "fetched changed documents");

        if opts.dry_run {
            return self.preview(connector.as_ref(), documents).await;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for doc in documents {
            let semaphore = Arc::clone(&semaphore);
            let connector = Arc::clone(&connector);
            let embeddings = Arc::clone(&self.embeddings);
            let index = Arc::clone(&self.index);
            let chunking = self.chunking.clone();
            let namespace = namespace.clone();
            let tenant_id = tenant.id.clone();

            tasks.spawn(async move {
                // The semaphore lives for the whole pass and is never closed.
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let document_id = doc.document_id();
                let outcome = process_document(
                    connector.as_ref(),
                    embeddings.as_ref(),
                    index.as_ref(),
                    &chunking,
                    &tenant_id,
                    &namespace,
                    doc,
                )
                .await;
                (document_id, outcome)
            });
        }

        let mut report = SyncReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(DocOutcome::Indexed(chunks)))) => {
                    report.processed += 1;
                    report.chunks_written += chunks as u64;
                }
                Ok((_, Ok(DocOutcome::Skipped))) => report.skipped += 1,
                Ok((document_id, Err(e))) => {
                    tracing::warn!(
                        document = %document_id,
                        error = %e,
                        "document failed; pass continues"
                    );
                    report.failed += 1;
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "sync worker panicked");
                    report.failed += 1;
                }
            }
        }

        set_checkpoint(&self.pool, &tenant.id, kind, pass_started_at).await?;

        tracing::info!(
            tenant = %tenant.id,
            source = %kind,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            chunks = report.chunks_written,
            "sync pass complete"
        );

        Ok(report)
    }

    /// Dry run: hydrate and count chunks without any writes.
    async fn preview(
        &self,
        connector: &dyn SourceConnector,
        documents: Vec<SourceDocument>,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for mut doc in documents {
            if let Err(e) = connector.hydrate(&mut doc).await {
                tracing::warn!(document = %doc.document_id(), error = %e, "hydrate failed");
                report.failed += 1;
                continue;
            }
            if doc.raw_text.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            let pieces = chunk_text(&doc.raw_text, self.chunking.max_chars, self.chunking.overlap)?;
            report.processed += 1;
            report.chunks_written += pieces.len() as u64;
        }

        Ok(report)
    }
}

enum DocOutcome {
    Indexed(usize),
    Skipped,
}

/// Process one document end to end. Runs inside the worker pool; shares no
/// mutable state with other documents.
async fn process_document(
    connector: &dyn SourceConnector,
    embeddings: &dyn EmbeddingService,
    index: &dyn VectorIndex,
    chunking: &ChunkingConfig,
    tenant_id: &str,
    namespace: &str,
    mut doc: SourceDocument,
) -> Result<DocOutcome> {
    connector.hydrate(&mut doc).await?;

    if doc.raw_text.trim().is_empty() {
        return Ok(DocOutcome::Skipped);
    }

    let document_id = doc.document_id();

    // Delete-before-insert so stale chunks of a previous version never
    // coexist with fresh ones. The delete is attempted even when it fails;
    // a broken index will surface again at upsert.
    if let Err(e) = index.delete_by_document(namespace, &document_id).await {
        tracing::warn!(document = %document_id, error = %e, "stale vector delete failed");
    }

    let chunks = chunk_document(&doc, tenant_id, chunking.max_chars, chunking.overlap)?;
    if chunks.is_empty() {
        return Ok(DocOutcome::Skipped);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embeddings.embed_batch(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(Error::Embedding(format!(
            "expected {} vectors, got {}",
            chunks.len(),
            vectors.len()
        )));
    }

    let items: Vec<IndexedVector> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexedVector { chunk, vector })
        .collect();

    index.upsert(namespace, &items).await?;

    Ok(DocOutcome::Indexed(items.len()))
}

// ============ Checkpoints ============

pub async fn get_checkpoint(
    pool: &SqlitePool,
    tenant_id: &str,
    kind: SourceKind,
) -> Result<Option<DateTime<Utc>>> {
    let ts: Option<i64> = sqlx::query_scalar(
        "SELECT last_synced_at FROM checkpoints WHERE tenant_id = ? AND source_kind = ?",
    )
    .bind(tenant_id)
    .bind(kind.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(ts.and_then(|t| DateTime::from_timestamp(t, 0)))
}

async fn set_checkpoint(
    pool: &SqlitePool,
    tenant_id: &str,
    kind: SourceKind,
    at: DateTime<Utc>,
) -> Result<()> {
    let now = Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO checkpoints (tenant_id, source_kind, last_synced_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, source_kind) DO UPDATE SET
            last_synced_at = excluded.last_synced_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(tenant_id)
    .bind(kind.as_str())
    .bind(at.timestamp())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

// ============ Mutual exclusion ============

/// Process-wide registry of running sync passes, keyed by tenant + source.
struct SyncLockRegistry {
    held: Mutex<HashSet<(String, SourceKind)>>,
}

impl SyncLockRegistry {
    fn global() -> &'static SyncLockRegistry {
        static REGISTRY: OnceLock<SyncLockRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| SyncLockRegistry {
            held: Mutex::new(HashSet::new()),
        })
    }

    fn acquire(&'static self, tenant_id: &str, kind: SourceKind) -> Result<SyncLockGuard> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (tenant_id.to_string(), kind);
        if !held.insert(key) {
            return Err(Error::SyncInProgress {
                tenant: tenant_id.to_string(),
                source_kind: kind.as_str().to_string(),
            });
        }
        Ok(SyncLockGuard {
            registry: self,
            tenant_id: tenant_id.to_string(),
            kind,
        })
    }
}

/// Releases the pass lock on drop, which covers error and panic unwinds.
struct SyncLockGuard {
    registry: &'static SyncLockRegistry,
    tenant_id: String,
    kind: SourceKind,
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        let mut held = self
            .registry
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&(self.tenant_id.clone(), self.kind));
    }
}
