//! Shared fixtures for file-backed integration tests.

#![allow(dead_code)]

use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use dbsem_core::{Config, LockService, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tempfile::TempDir;

pub const TABLE: &str = "semaphore_locks";

/// A throwaway database file plus a config pointing at it.
pub struct TestDb {
    _dir: TempDir,
    pub path: PathBuf,
    pub config: Config,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks.db");
        let mut config = Config::default();
        config.store.url = format!("sqlite://{}", path.display());
        config.store.max_connections = 4;
        config.store.busy_timeout_ms = 10_000;
        Self {
            _dir: dir,
            path,
            config,
        }
    }

    /// A fresh service instance, as a separate process would build one.
    pub fn service(&self) -> Result<LockService> {
        LockService::from_config(&self.config)
    }

    /// Raw pool for poking at rows directly.
    pub async fn raw_pool(&self) -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&self.config.store.url)
            .await
            .unwrap()
    }

    /// Pretend `secs` have passed since `name` was last touched.
    pub async fn backdate(&self, name: &str, secs: i64) {
        let pool = self.raw_pool().await;
        let (raw,): (String,) =
            sqlx::query_as(&format!("SELECT updated_at_utc FROM {TABLE} WHERE name = ?"))
                .bind(name)
                .fetch_one(&pool)
                .await
                .unwrap();
        let earlier = DateTime::parse_from_rfc3339(&raw).unwrap().with_timezone(&Utc)
            - chrono::Duration::seconds(secs);
        sqlx::query(&format!("UPDATE {TABLE} SET updated_at_utc = ? WHERE name = ?"))
            .bind(earlier.to_rfc3339_opts(SecondsFormat::Micros, true))
            .bind(name)
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    pub async fn row_count(&self, name: &str) -> i64 {
        let pool = self.raw_pool().await;
        let (count,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM {TABLE} WHERE name = ?"))
                .bind(name)
                .fetch_one(&pool)
                .await
                .unwrap();
        pool.close().await;
        count
    }
}

pub const TEN_SECS: Duration = Duration::from_secs(10);
