//! Store handles
//!
//! The lock service never opens connections itself. It asks an injected
//! [`StoreProvider`] for a ready pool per logical database and access role.

use std::{collections::HashMap, str::FromStr, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use strum::{Display, EnumString};

use crate::{config::StoreConfig, Error, Result};

/// Access level a handle is requested for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StoreRole {
    /// Read-only: queries and the table existence check
    Reader,
    /// Row writes: acquire, touch, release
    ReadWrite,
    /// DDL: table creation
    SchemaOwner,
}

/// Supplies ready-to-use store handles.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Handle for `database` with `role` access.
    async fn handle(&self, database: &str, role: StoreRole) -> Result<SqlitePool>;
}

#[derive(Debug, Clone)]
struct RolePools {
    reader: SqlitePool,
    read_write: SqlitePool,
    schema_owner: SqlitePool,
}

impl RolePools {
    fn all(pool: SqlitePool) -> Self {
        Self {
            reader: pool.clone(),
            read_write: pool.clone(),
            schema_owner: pool,
        }
    }

    const fn get(&self, role: StoreRole) -> &SqlitePool {
        match role {
            StoreRole::Reader => &self.reader,
            StoreRole::ReadWrite => &self.read_write,
            StoreRole::SchemaOwner => &self.schema_owner,
        }
    }
}

/// [`StoreProvider`] backed by `SQLite` pools, one set per logical database.
///
/// Pools connect lazily, so a missing database file surfaces on first use
/// rather than at construction.
#[derive(Debug, Clone, Default)]
pub struct PoolProvider {
    databases: HashMap<String, RolePools>,
}

impl PoolProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve one ready pool for every role of `database`.
    #[must_use]
    pub fn shared(database: impl Into<String>, pool: SqlitePool) -> Self {
        Self::new().with_pool(database, pool)
    }

    /// Add a ready pool serving every role of `database`.
    #[must_use]
    pub fn with_pool(mut self, database: impl Into<String>, pool: SqlitePool) -> Self {
        self.databases.insert(database.into(), RolePools::all(pool));
        self
    }

    /// Build role pools for the database described by `config`.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::new().with_database(config)
    }

    /// Add role pools for the database described by `config`.
    ///
    /// Readers open the file read-only, writers open it without creating
    /// it, and only the schema owner may create it. An in-memory URL gets a
    /// single pool for all roles; separate in-memory pools would be
    /// separate databases.
    pub fn with_database(mut self, config: &StoreConfig) -> Result<Self> {
        let handle_error = |role: StoreRole| {
            let database = config.database.clone();
            move |e: sqlx::Error| Error::Handle {
                database,
                role,
                message: e.to_string(),
            }
        };

        let base = SqliteConnectOptions::from_str(&config.url)
            .map_err(handle_error(StoreRole::ReadWrite))?
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool_options = || SqlitePoolOptions::new().max_connections(config.max_connections);

        let pools = if is_in_memory(&config.url) {
            RolePools::all(pool_options().min_connections(1).connect_lazy_with(base))
        } else {
            // Read-only WAL connections need a writer to have set up shared
            // memory first, so file databases use the rollback journal.
            let base = base.journal_mode(SqliteJournalMode::Delete);
            RolePools {
                reader: pool_options().connect_lazy_with(base.clone().read_only(true)),
                read_write: pool_options().connect_lazy_with(base.clone().create_if_missing(false)),
                schema_owner: pool_options().connect_lazy_with(base.create_if_missing(true)),
            }
        };

        tracing::debug!(database = %config.database, url = %config.url, "configured store pools");
        self.databases.insert(config.database.clone(), pools);
        Ok(self)
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[async_trait]
impl StoreProvider for PoolProvider {
    async fn handle(&self, database: &str, role: StoreRole) -> Result<SqlitePool> {
        self.databases
            .get(database)
            .map(|pools| pools.get(role).clone())
            .ok_or_else(|| Error::Handle {
                database: database.to_string(),
                role,
                message: "database is not configured".to_string(),
            })
    }
}
