//! Schema bootstrap
//!
//! Runs at most once per [`LockService`] (and its clones): concurrent first
//! callers wait on the same initialisation, and a failed creation leaves the
//! guard unset so the next caller tries again.

use crate::{
    service::{LockService, TABLE_EXISTS},
    store::StoreRole,
    Error, Result,
};

impl LockService {
    /// Make sure the lock table exists, creating it on first use.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| self.bootstrap())
            .await
            .map(|_| ())
    }

    async fn bootstrap(&self) -> Result<()> {
        match self.table_exists().await {
            Ok(true) => {
                tracing::debug!(table = %self.table(), "lock table present");
                return Ok(());
            }
            Ok(false) => {
                tracing::debug!(table = %self.table(), "lock table missing");
            }
            Err(e) => {
                tracing::warn!(
                    table = %self.table(),
                    error = %e,
                    "lock table existence check failed, attempting create"
                );
            }
        }
        self.create_table().await
    }

    async fn table_exists(&self) -> Result<bool> {
        let pool = self.pool(StoreRole::Reader).await?;
        let (count,): (i64,) = sqlx::query_as(TABLE_EXISTS)
            .bind(self.table())
            .fetch_one(&pool)
            .await
            .map_err(|source| Error::Store {
                operation: "table check",
                name: self.table().to_string(),
                source,
            })?;
        Ok(count > 0)
    }

    async fn create_table(&self) -> Result<()> {
        let pool = self.pool(StoreRole::SchemaOwner).await?;
        sqlx::query(&self.sql.create)
            .execute(&pool)
            .await
            .map_err(|source| {
                tracing::error!(
                    table = %self.table(),
                    error = %source,
                    "failed to create lock table"
                );
                Error::Bootstrap {
                    table: self.table().to_string(),
                    source,
                }
            })?;
        tracing::info!(table = %self.table(), database = %self.database(), "created lock table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use sqlx::SqlitePool;

    use super::*;
    use crate::{
        service::test_support::test_pool,
        store::{PoolProvider, StoreProvider},
    };

    /// Counts handle requests per role and can refuse the reader role.
    struct CountingProvider {
        inner: PoolProvider,
        reader_calls: AtomicUsize,
        owner_calls: AtomicUsize,
        reader_fails: bool,
    }

    impl CountingProvider {
        fn new(pool: SqlitePool, reader_fails: bool) -> Self {
            Self {
                inner: PoolProvider::shared("default", pool),
                reader_calls: AtomicUsize::new(0),
                owner_calls: AtomicUsize::new(0),
                reader_fails,
            }
        }
    }

    #[async_trait]
    impl StoreProvider for CountingProvider {
        async fn handle(&self, database: &str, role: StoreRole) -> Result<SqlitePool> {
            match role {
                StoreRole::Reader => {
                    self.reader_calls.fetch_add(1, Ordering::SeqCst);
                    if self.reader_fails {
                        return Err(Error::Handle {
                            database: database.to_string(),
                            role,
                            message: "reader credentials rejected".to_string(),
                        });
                    }
                }
                StoreRole::SchemaOwner => {
                    self.owner_calls.fetch_add(1, Ordering::SeqCst);
                }
                StoreRole::ReadWrite => {}
            }
            self.inner.handle(database, role).await
        }
    }

    async fn table_count(pool: &SqlitePool) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(TABLE_EXISTS)
            .bind("semaphore_locks")
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        Ok(count)
    }

    #[tokio::test]
    async fn test_creates_missing_table() -> Result<()> {
        let pool = test_pool().await?;
        let service = LockService::with_pool(pool.clone(), "semaphore_locks")?;
        assert_eq!(table_count(&pool).await?, 0);

        service.ensure_schema().await?;
        assert_eq!(table_count(&pool).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_runs_once_per_service_and_clones() -> Result<()> {
        let pool = test_pool().await?;
        let provider = Arc::new(CountingProvider::new(pool, false));
        let service = LockService::new(provider.clone(), "default", "semaphore_locks")?;
        let clone = service.clone();

        let (a, b) = tokio::join!(service.ensure_schema(), clone.ensure_schema());
        a?;
        b?;
        service.ensure_schema().await?;

        assert_eq!(provider.reader_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.owner_calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_table_skips_create() -> Result<()> {
        let pool = test_pool().await?;
        LockService::with_pool(pool.clone(), "semaphore_locks")?
            .ensure_schema()
            .await?;

        let provider = Arc::new(CountingProvider::new(pool, false));
        let service = LockService::new(provider.clone(), "default", "semaphore_locks")?;
        service.ensure_schema().await?;
        assert_eq!(provider.owner_calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_check_falls_back_to_create() -> Result<()> {
        let pool = test_pool().await?;
        let provider = Arc::new(CountingProvider::new(pool.clone(), true));
        let service = LockService::new(provider.clone(), "default", "semaphore_locks")?;

        service.ensure_schema().await?;
        assert_eq!(provider.owner_calls.load(Ordering::SeqCst), 1);
        assert_eq!(table_count(&pool).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_create_is_retried_by_next_caller() -> Result<()> {
        let pool = test_pool().await?;
        // An index squatting on the table name makes CREATE TABLE fail.
        for ddl in [
            "CREATE TABLE probe (x INTEGER)",
            "CREATE INDEX semaphore_locks ON probe (x)",
        ] {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(|e| Error::Io(e.to_string()))?;
        }
        let service = LockService::with_pool(pool.clone(), "semaphore_locks")?;

        let first = service.ensure_schema().await;
        assert!(matches!(first, Err(Error::Bootstrap { .. })));
        assert!(!service.schema_ready.initialized());

        sqlx::query("DROP INDEX semaphore_locks")
            .execute(&pool)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        service.ensure_schema().await?;
        assert!(service.schema_ready.initialized());
        Ok(())
    }
}
