//! The lock service instance
//!
//! [`LockService`] owns the injected store-handle supplier, the logical
//! database and table it operates on, and the per-instance schema guard.
//! The operations themselves live in `engine`, `handle`, `isolate`, and
//! `bootstrap`; this module holds the shared plumbing.

use std::{fmt, future::Future, sync::Arc};

use sqlx::SqlitePool;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{validate_table_name, Config},
    store::{PoolProvider, StoreProvider, StoreRole},
    Error, Result,
};

/// Distributed mutex over one lock table.
///
/// Cloning is cheap and clones share the schema guard.
#[derive(Clone)]
pub struct LockService {
    provider: Arc<dyn StoreProvider>,
    database: String,
    table: String,
    pub(crate) sql: Arc<Statements>,
    pub(crate) schema_ready: Arc<OnceCell<()>>,
}

impl fmt::Debug for LockService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockService")
            .field("database", &self.database)
            .field("table", &self.table)
            .field("schema_ready", &self.schema_ready.initialized())
            .finish_non_exhaustive()
    }
}

impl LockService {
    /// Create a service for `table` in the logical `database`.
    pub fn new(
        provider: Arc<dyn StoreProvider>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            provider,
            database: database.into(),
            sql: Arc::new(Statements::for_table(&table)),
            table,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    /// Create a service whose pools are built from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = PoolProvider::from_config(&config.store)?;
        Self::new(
            Arc::new(provider),
            config.store.database.clone(),
            config.lock.table.clone(),
        )
    }

    /// Create a service over a single ready pool used for every role.
    pub fn with_pool(pool: SqlitePool, table: impl Into<String>) -> Result<Self> {
        let database = crate::config::DEFAULT_DATABASE;
        Self::new(Arc::new(PoolProvider::shared(database, pool)), database, table)
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) async fn pool(&self, role: StoreRole) -> Result<SqlitePool> {
        self.provider.handle(&self.database, role).await
    }
}

/// Run `fut` unless `cancel` fires first.
///
/// Dropping a pending `sqlx` transaction rolls it back, so abandoning the
/// future mid-flight leaves no partial write behind.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

pub(crate) fn require_non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidArgument(format!("{what} cannot be empty")))
    } else {
        Ok(())
    }
}

/// SQL text for one lock table, built once per service.
#[derive(Debug)]
pub(crate) struct Statements {
    pub create: String,
    pub insert: String,
    pub select: String,
    pub select_all: String,
    pub steal: String,
    pub touch: String,
    pub delete: String,
    pub delete_owned: String,
}

pub(crate) const TABLE_EXISTS: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?";

const COLUMNS: &str = "name, owner, timeout_seconds, created_at_utc, updated_at_utc";

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    name TEXT NOT NULL PRIMARY KEY CHECK(length(name) BETWEEN 1 AND 128),
                    owner TEXT NOT NULL CHECK(length(owner) BETWEEN 1 AND 128),
                    timeout_seconds INTEGER NOT NULL,
                    created_at_utc TEXT NOT NULL,
                    updated_at_utc TEXT NOT NULL
                )"
            ),
            insert: format!("INSERT INTO {table} ({COLUMNS}) VALUES (?, ?, ?, ?, ?)"),
            select: format!("SELECT {COLUMNS} FROM {table} WHERE name = ?"),
            select_all: format!("SELECT {COLUMNS} FROM {table} ORDER BY name"),
            steal: format!(
                "UPDATE {table}
                 SET owner = ?, timeout_seconds = ?, created_at_utc = ?, updated_at_utc = ?
                 WHERE name = ? AND updated_at_utc = ?"
            ),
            touch: format!("UPDATE {table} SET updated_at_utc = ? WHERE name = ?"),
            delete: format!("DELETE FROM {table} WHERE name = ?"),
            delete_owned: format!("DELETE FROM {table} WHERE name = ? AND owner = ?"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsafe_table_name() {
        let provider: Arc<dyn StoreProvider> = Arc::new(PoolProvider::new());
        let result = LockService::new(provider, "default", "locks;--");
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cancellable(&cancel, async { Ok(1) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_statements_use_table_name() {
        let sql = Statements::for_table("job_locks");
        assert!(sql.insert.starts_with("INSERT INTO job_locks"));
        assert!(sql.steal.contains("AND updated_at_utc = ?"));
    }
}
