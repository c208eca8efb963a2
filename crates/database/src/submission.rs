//! Code submission persistence.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{CodeSubmission, NewSubmission};

pub(crate) const SUBMISSION_COLUMNS: &str = "id, user_id, code, language, purpose, submitted_at";

/// Store a submission and return the created row.
pub async fn create_submission(pool: &SqlitePool, submission: &NewSubmission) -> Result<CodeSubmission> {
    let created = sqlx::query_as::<_, CodeSubmission>(&format!(
        r#"
        INSERT INTO code_submissions (user_id, code, language, purpose)
        VALUES (?, ?, ?, ?)
        RETURNING {SUBMISSION_COLUMNS}
        "#
    ))
    .bind(submission.user_id)
    .bind(&submission.code)
    .bind(&submission.language)
    .bind(&submission.purpose)
    .fetch_one(pool)
    .await?;

    Ok(created)
}

/// Get a submission by ID.
pub async fn get_submission(pool: &SqlitePool, id: i64) -> Result<CodeSubmission> {
    sqlx::query_as::<_, CodeSubmission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM code_submissions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::not_found("CodeSubmission", id))
}

/// Get a submission by ID, only if it belongs to `user_id`.
pub async fn get_submission_for_user(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
) -> Result<CodeSubmission> {
    sqlx::query_as::<_, CodeSubmission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM code_submissions WHERE id = ? AND user_id = ?"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::not_found("CodeSubmission", id))
}

/// List a user's submissions, newest first.
pub async fn list_submissions_for_user(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<CodeSubmission>> {
    let rows = sqlx::query_as::<_, CodeSubmission>(&format!(
        r#"
        SELECT {SUBMISSION_COLUMNS}
        FROM code_submissions
        WHERE user_id = ?
        ORDER BY id DESC
        "#
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delete a user's submission together with its analysis result.
pub async fn delete_submission(pool: &SqlitePool, id: i64, user_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM analysis_results
        WHERE submission_id IN (SELECT id FROM code_submissions WHERE id = ? AND user_id = ?)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query("DELETE FROM code_submissions WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("CodeSubmission", id));
    }

    tx.commit().await?;
    Ok(())
}
