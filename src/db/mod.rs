//! Record persistence.
//!
//! This module is split into two submodules:
//! - `model`: conversion between table rows and [`Record`].
//! - `repo`: SQL-only functions over a pool.
//!
//! Callers go through the [`RecordStore`] trait; [`SqliteStore`] is the
//! production implementation and adds reconnect-and-retry on top of `repo`.

pub mod model;
pub mod repo;

pub use repo::{fetch_record, list_record_ids, save_changes, Pool};

use crate::model::{PendingChanges, Record};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("cannot encode value: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("stored {field} is invalid: {message}")]
    Decode { field: &'static str, message: String },
}

impl StoreError {
    pub(crate) fn decode(field: &'static str, err: impl fmt::Display) -> Self {
        StoreError::Decode {
            field,
            message: err.to_string(),
        }
    }

    /// Failures a fresh connection may fix.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            StoreError::Database(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed)
        )
    }
}

/// Persists records field by field.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The stored record, or [`Record::empty`] when `id` is unknown.
    async fn get(&self, id: &str) -> Result<Record, StoreError>;
    /// Write exactly the fields in `changes`; other columns are untouched.
    async fn save(&self, id: &str, changes: &PendingChanges) -> Result<(), StoreError>;
}

/// How [`SqliteStore`] handles connection-class failures.
///
/// An operation is attempted at most `max_attempts` times. Before attempt
/// `n + 1` the store waits `backoff * n` and replaces its pool. Any other
/// error is returned on the spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(store: &crate::config::Store) -> Self {
        Self {
            max_attempts: store.max_attempts.max(1),
            backoff: Duration::from_millis(store.retry_backoff_ms),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

pub async fn init_pool(database_url: &str) -> Result<Pool, StoreError> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = if normalized.starts_with("sqlite::memory") {
        // Every connection to `:memory:` is a separate database; keep exactly one alive.
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&normalized)
            .await?
    } else {
        let pool = SqlitePoolOptions::new().connect(&normalized).await?;
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
        pool
    };
    Ok(pool)
}

/// Fresh in-memory database with the schema applied.
pub async fn connect_memory() -> Result<Pool, StoreError> {
    let pool = init_pool("sqlite::memory:").await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. Leaves in-memory URLs
/// untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{expanded_path}");
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// SQLite-backed [`RecordStore`] with reconnect-and-retry.
pub struct SqliteStore {
    url: String,
    pool: RwLock<Pool>,
    retry: RetryPolicy,
}

impl SqliteStore {
    /// Open the database at `url` and apply migrations.
    pub async fn connect(url: &str, retry: RetryPolicy) -> Result<Self, StoreError> {
        let pool = init_pool(url).await?;
        run_migrations(&pool).await?;
        Ok(Self::from_pool(url, pool, retry))
    }

    /// Wrap an already-migrated pool. `url` is used for reconnects.
    pub fn from_pool(url: &str, pool: Pool, retry: RetryPolicy) -> Self {
        Self {
            url: url.to_string(),
            pool: RwLock::new(pool),
            retry,
        }
    }

    /// Current pool handle.
    pub async fn pool(&self) -> Pool {
        self.pool.read().await.clone()
    }

    pub async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        self.with_retry("list", |pool| async move { repo::list_record_ids(&pool).await })
            .await
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        let fresh = init_pool(&self.url).await?;
        run_migrations(&fresh).await?;
        let stale = std::mem::replace(&mut *self.pool.write().await, fresh);
        stale.close().await;
        Ok(())
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: Fn(Pool) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match f(self.pool().await).await {
                Err(err) if err.is_connection() && attempt < self.retry.max_attempts => {
                    warn!(?err, op, attempt, "store connection failed; reconnecting");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    match self.reconnect().await {
                        Ok(()) => info!(op, "store reconnected"),
                        Err(err) => warn!(?err, op, "reconnect failed"),
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    #[instrument(skip_all, fields(record_id = %id))]
    async fn get(&self, id: &str) -> Result<Record, StoreError> {
        let found = self
            .with_retry("get", |pool| async move { repo::fetch_record(&pool, id).await })
            .await?;
        Ok(found.unwrap_or_else(|| Record::empty(id)))
    }

    #[instrument(skip_all, fields(record_id = %id, fields = changes.len()))]
    async fn save(&self, id: &str, changes: &PendingChanges) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        self.with_retry("save", |pool| async move {
            repo::save_changes(&pool, id, changes).await
        })
        .await
    }
}
