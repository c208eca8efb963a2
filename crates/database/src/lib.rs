//! SQLite persistence layer for CodeWise.
//!
//! This crate stores users, code submissions, analysis results and the
//! per-issue analysis history using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{models::NewUser, user, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:codewise.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let user = user::create_user(db.pool(), &NewUser::with_password("a@x.com", "$2b$...")).await?;
//!     println!("created user {}", user.id);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod history;
pub mod models;
pub mod result;
pub mod submission;
pub mod user;
pub mod validation;

pub use error::{DatabaseError, Result};
pub use models::{
    AnalysisHistory, AnalysisResult, CodeSubmission, NewAnalysisResult, NewHistoryEntry,
    NewSubmission, NewUser, OwnedResult, Role, User,
};
pub use validation::ValidationError;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// `sqlite::memory:` gives a fresh in-memory database (for testing).
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(url, pool_size, "Connected to database");

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
