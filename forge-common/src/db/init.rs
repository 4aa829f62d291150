//! Ledger initialization
//!
//! Opens (or creates) the SQLite ledger and creates every table the
//! pipeline relies on. Schema creation is idempotent and runs on each start.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every pooled connection
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Open the ledger file, creating it and its tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL lets the reporting API read while a scan cycle writes
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new ledger: {}", db_path.display());
    } else {
        info!("Opened existing ledger: {}", db_path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory ledger
///
/// Each SQLite in-memory connection is its own database, so the pool is
/// pinned to one connection that never expires.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all ledger tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_posts_table(pool).await?;
    create_candidates_table(pool).await?;
    create_scores_table(pool).await?;
    create_build_records_table(pool).await?;
    create_quota_windows_table(pool).await?;
    create_scan_cycles_table(pool).await?;

    tracing::debug!("Ledger schema ready");
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_posts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            title TEXT,
            text TEXT NOT NULL,
            author TEXT NOT NULL,
            posted_at TEXT NOT NULL,
            likes INTEGER NOT NULL DEFAULT 0,
            comments INTEGER NOT NULL DEFAULT 0,
            tags TEXT NOT NULL DEFAULT '[]',
            ingested_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_ingested ON posts(ingested_at DESC)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_candidates_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS candidates (
            post_id TEXT PRIMARY KEY REFERENCES posts(id),
            category TEXT NOT NULL,
            normalized_text TEXT NOT NULL,
            signals TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scores (
            post_id TEXT PRIMARY KEY REFERENCES candidates(post_id),
            technical_innovation REAL NOT NULL,
            business_potential REAL NOT NULL,
            practical_value REAL NOT NULL,
            engagement REAL NOT NULL,
            category_bonus REAL NOT NULL,
            total REAL NOT NULL,
            scored_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scores_total ON scores(total DESC)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_build_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_records (
            post_id TEXT PRIMARY KEY REFERENCES candidates(post_id),
            status TEXT NOT NULL CHECK (status IN (
                'admitted', 'rejected_low_score', 'rejected_quota_exhausted',
                'built', 'build_failed'
            )),
            quota_day TEXT,
            project_ref TEXT,
            detail TEXT,
            claimed_by TEXT,
            claimed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (status != 'built' OR project_ref IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_build_records_status ON build_records(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_build_records_day ON build_records(quota_day)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_quota_windows_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quota_windows (
            day TEXT PRIMARY KEY,
            slots_used INTEGER NOT NULL DEFAULT 0 CHECK (slots_used >= 0),
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_scan_cycles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_cycles (
            id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            outcome TEXT NOT NULL DEFAULT 'running',
            fetched INTEGER NOT NULL DEFAULT 0,
            ingested INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            malformed INTEGER NOT NULL DEFAULT 0,
            admitted INTEGER NOT NULL DEFAULT 0,
            rejected_low_score INTEGER NOT NULL DEFAULT 0,
            rejected_quota INTEGER NOT NULL DEFAULT 0,
            built INTEGER NOT NULL DEFAULT 0,
            build_failed INTEGER NOT NULL DEFAULT 0,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scan_cycles_started ON scan_cycles(started_at DESC)")
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_memory_schema_created() {
        let pool = init_memory_database().await.unwrap();
        let tables = table_names(&pool).await;

        for expected in [
            "build_records",
            "candidates",
            "posts",
            "quota_windows",
            "scan_cycles",
            "scores",
            "settings",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("forge.db");

        let pool = init_database(&db_path).await.unwrap();
        create_schema(&pool).await.unwrap();
        pool.close().await;

        // Reopen existing file
        let pool = init_database(&db_path).await.unwrap();
        assert_eq!(table_names(&pool).await.len(), 7);
    }

    #[tokio::test]
    async fn test_built_requires_project_ref() {
        let pool = init_memory_database().await.unwrap();

        sqlx::query(
            "INSERT INTO posts (id, text, author, posted_at, ingested_at)
             VALUES ('p1', 'x', 'a', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO candidates (post_id, category, normalized_text, created_at)
             VALUES ('p1', 'other', 'x', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = sqlx::query(
            "INSERT INTO build_records (post_id, status, created_at, updated_at)
             VALUES ('p1', 'built', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err(), "built without project_ref must violate CHECK");
    }
}
