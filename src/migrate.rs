use sqlx::SqlitePool;

use crate::error::Result;

/// Create the checkpoint schema. Idempotent; the checkpoints table is the
/// only durable state this pipeline owns.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            tenant_id TEXT NOT NULL,
            source_kind TEXT NOT NULL,
            last_synced_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (tenant_id, source_kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
