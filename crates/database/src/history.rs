//! Analysis history persistence.
//!
//! History rows are denormalized: one analyze event produces one row per
//! reported issue, all sharing the event's idempotency key.

use sqlx::SqlitePool;

use crate::models::{AnalysisHistory, NewHistoryEntry};
use crate::Result;

/// Check whether a user already stored rows under `idempotency_key`.
///
/// This is a plain read; two concurrent writers with the same key can both
/// observe `false`.
pub async fn exists_for_key(pool: &SqlitePool, user_id: i64, idempotency_key: &str) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM analysis_history
            WHERE user_id = ? AND idempotency_key = ?
        )
        "#,
    )
    .bind(user_id)
    .bind(idempotency_key)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Insert history rows for one analyze event.
///
/// `created_at` falls back to the current time when `None`.
pub async fn insert_entries(
    pool: &SqlitePool,
    user_id: i64,
    idempotency_key: &str,
    created_at: Option<&str>,
    entries: &[NewHistoryEntry],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for entry in entries {
        let result = sqlx::query(
            r#"
            INSERT INTO analysis_history (
                user_id, language, purpose, error_type, error_message, idempotency_key, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, COALESCE(?, datetime('now')))
            "#,
        )
        .bind(user_id)
        .bind(&entry.language)
        .bind(&entry.purpose)
        .bind(&entry.error_type)
        .bind(&entry.error_message)
        .bind(idempotency_key)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// List all history rows of a user, oldest first.
pub async fn list_history_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<AnalysisHistory>> {
    let rows = sqlx::query_as::<_, AnalysisHistory>(
        r#"
        SELECT id, user_id, language, purpose, error_type, error_message, idempotency_key, created_at
        FROM analysis_history
        WHERE user_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
