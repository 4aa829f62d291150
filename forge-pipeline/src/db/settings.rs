//! Settings table accessors
//!
//! Key/value rows written by the operator to override pipeline options
//! without touching the config file.

use sqlx::SqlitePool;
use forge_common::{Error, Result};

/// Raw setting value
pub async fn get_raw_setting(db: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|(value,)| value))
}

/// Typed setting value
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_raw_setting(db, key).await? {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid setting {}={:?}: {}", key, value, e))),
        None => Ok(None),
    }
}

/// Insert or replace a setting
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_common::db::init_memory_database;

    #[tokio::test]
    async fn test_get_missing_setting() {
        let pool = init_memory_database().await.unwrap();
        let value: Option<u32> = get_setting(&pool, "daily_build_limit").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_set_then_update() {
        let pool = init_memory_database().await.unwrap();

        set_setting(&pool, "daily_build_limit", 5).await.unwrap();
        set_setting(&pool, "daily_build_limit", 7).await.unwrap();

        let value: Option<u32> = get_setting(&pool, "daily_build_limit").await.unwrap();
        assert_eq!(value, Some(7));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'daily_build_limit'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1, "Should have exactly one entry after update");
    }

    #[tokio::test]
    async fn test_unparsable_setting_is_config_error() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, "worker_count", "many").await.unwrap();

        let result: Result<Option<usize>> = get_setting(&pool, "worker_count").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
