//! Analysis result persistence.

use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{AnalysisResult, CodeSubmission, NewAnalysisResult, NewSubmission, OwnedResult};
use crate::submission::SUBMISSION_COLUMNS;

const RESULT_COLUMNS: &str = "r.id AS id, r.submission_id AS submission_id, \
     r.summary AS summary, r.suggestions AS suggestions, \
     r.maintainability_score AS maintainability_score, r.readability_score AS readability_score, \
     r.bug_probability AS bug_probability, r.score AS score, r.created_at AS created_at";

async fn insert_result(
    conn: &mut SqliteConnection,
    submission_id: i64,
    result: &NewAnalysisResult,
) -> Result<AnalysisResult> {
    sqlx::query_as::<_, AnalysisResult>(
        r#"
        INSERT INTO analysis_results (
            submission_id, summary, suggestions,
            maintainability_score, readability_score, bug_probability, score
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id, submission_id, summary, suggestions,
            maintainability_score, readability_score, bug_probability, score, created_at
        "#,
    )
    .bind(submission_id)
    .bind(&result.summary)
    .bind(&result.suggestions)
    .bind(result.maintainability_score)
    .bind(result.readability_score)
    .bind(result.bug_probability)
    .bind(result.score)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "AnalysisResult",
                    id: submission_id.to_string(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })
}

/// Store a fresh submission and its result atomically.
///
/// Either both rows exist afterwards or neither does.
pub async fn save_analysis(
    pool: &SqlitePool,
    submission: &NewSubmission,
    result: &NewAnalysisResult,
) -> Result<(CodeSubmission, AnalysisResult)> {
    let mut tx = pool.begin().await?;

    let stored = sqlx::query_as::<_, CodeSubmission>(&format!(
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
    .fetch_one(&mut *tx)
    .await?;

    let analysis = insert_result(&mut tx, stored.id, result).await?;

    tx.commit().await?;

    tracing::debug!(
        submission_id = stored.id,
        result_id = analysis.id,
        "Stored analysis"
    );

    Ok((stored, analysis))
}

/// Attach a result to an existing submission.
pub async fn create_result(
    pool: &SqlitePool,
    submission_id: i64,
    result: &NewAnalysisResult,
) -> Result<AnalysisResult> {
    let mut conn = pool.acquire().await?;
    insert_result(&mut conn, submission_id, result).await
}

/// Get a result by ID together with its owner.
pub async fn get_result(pool: &SqlitePool, id: i64) -> Result<OwnedResult> {
    sqlx::query_as::<_, OwnedResult>(&format!(
        r#"
        SELECT {RESULT_COLUMNS}, u.id AS user_id, u.email AS email
        FROM analysis_results r
        JOIN code_submissions s ON s.id = r.submission_id
        JOIN users u ON u.id = s.user_id
        WHERE r.id = ?
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::not_found("AnalysisResult", id))
}

/// Find the result of a submission.
pub async fn find_result_by_submission(
    pool: &SqlitePool,
    submission_id: i64,
) -> Result<Option<OwnedResult>> {
    let row = sqlx::query_as::<_, OwnedResult>(&format!(
        r#"
        SELECT {RESULT_COLUMNS}, u.id AS user_id, u.email AS email
        FROM analysis_results r
        JOIN code_submissions s ON s.id = r.submission_id
        JOIN users u ON u.id = s.user_id
        WHERE r.submission_id = ?
        "#
    ))
    .bind(submission_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Find the result of a submission, only if the submission belongs to `user_id`.
pub async fn find_result_by_submission_and_user(
    pool: &SqlitePool,
    submission_id: i64,
    user_id: i64,
) -> Result<Option<OwnedResult>> {
    let row = sqlx::query_as::<_, OwnedResult>(&format!(
        r#"
        SELECT {RESULT_COLUMNS}, u.id AS user_id, u.email AS email
        FROM analysis_results r
        JOIN code_submissions s ON s.id = r.submission_id
        JOIN users u ON u.id = s.user_id
        WHERE r.submission_id = ? AND s.user_id = ?
        "#
    ))
    .bind(submission_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// List every result belonging to a user, oldest first.
pub async fn list_results_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<OwnedResult>> {
    let rows = sqlx::query_as::<_, OwnedResult>(&format!(
        r#"
        SELECT {RESULT_COLUMNS}, u.id AS user_id, u.email AS email
        FROM analysis_results r
        JOIN code_submissions s ON s.id = r.submission_id
        JOIN users u ON u.id = s.user_id
        WHERE s.user_id = ?
        ORDER BY r.id ASC
        "#
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
