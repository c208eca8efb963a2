//! User persistence.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, email, password_hash, role, provider, provider_id, created_at";

fn map_unique_violation(e: sqlx::Error, email: &str) -> DatabaseError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return DatabaseError::AlreadyExists {
                entity: "User",
                id: email.to_string(),
            };
        }
    }
    DatabaseError::Sqlx(e)
}

/// Create a new user and return the stored row.
pub async fn create_user(pool: &SqlitePool, user: &NewUser) -> Result<User> {
    let id = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, role, provider, provider_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(&user.provider)
    .bind(&user.provider_id)
    .execute(pool)
    .await
    .map_err(|e| map_unique_violation(e, &user.email))?
    .last_insert_rowid();

    get_user(pool, id).await
}

/// Get a user by ID.
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("User", id))
}

/// Look up a user by email.
pub async fn find_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Get a user by email, failing with `NotFound` when absent.
pub async fn get_user_by_email(pool: &SqlitePool, email: &str) -> Result<User> {
    find_user_by_email(pool, email)
        .await?
        .ok_or_else(|| DatabaseError::not_found("User", email))
}

/// Check whether an email is already registered.
pub async fn exists_by_email(pool: &SqlitePool, email: &str) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)
        "#,
    )
    .bind(email)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Look up a social-login user by provider registration and subject.
pub async fn find_user_by_provider(
    pool: &SqlitePool,
    provider: &str,
    provider_id: &str,
) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE provider = ? AND provider_id = ?"
    ))
    .bind(provider)
    .bind(provider_id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Update email, password hash and role of an existing user.
pub async fn update_user(pool: &SqlitePool, user: &User) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET email = ?, password_hash = ?, role = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(user.id)
    .execute(pool)
    .await
    .map_err(|e| map_unique_violation(e, &user.email))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("User", user.id));
    }

    Ok(())
}

/// Attach an external identity to an existing account.
pub async fn link_provider(
    pool: &SqlitePool,
    id: i64,
    provider: &str,
    provider_id: &str,
) -> Result<User> {
    let result = sqlx::query("UPDATE users SET provider = ?, provider_id = ? WHERE id = ?")
        .bind(provider)
        .bind(provider_id)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| map_unique_violation(e, provider_id))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("User", id));
    }

    get_user(pool, id).await
}

/// Delete a user and everything they own.
///
/// Rows go in foreign-key order: results, submissions, history, user.
pub async fn delete_user_cascade(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM analysis_results
        WHERE submission_id IN (SELECT id FROM code_submissions WHERE user_id = ?)
        "#,
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM code_submissions WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM analysis_history WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("User", id));
    }

    tx.commit().await?;
    tracing::info!(user_id = id, "Deleted user and owned rows");
    Ok(())
}

/// Count total users.
pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    Ok(count)
}
