//! Operations on an already-named lock: touch, release, query, list.
//!
//! None of these check ownership. Touch and release act on whatever row
//! carries the name, so a caller whose lease was stolen will extend or
//! release the new holder's lock.

use tokio_util::sync::CancellationToken;

use crate::{
    error::store_error,
    lock::{encode_timestamp, now_utc, LockInfo, LockRecord, LockRow},
    service::{cancellable, require_non_empty, LockService},
    store::StoreRole,
    Result,
};

impl LockService {
    /// Restart the lease clock on `name`.
    ///
    /// Touching a lock nobody holds has no effect.
    pub async fn touch(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        require_non_empty("lock name", name)?;
        cancellable(cancel, self.ensure_schema()).await?;
        let pool = self.pool(StoreRole::ReadWrite).await?;

        let stamp = encode_timestamp(now_utc());
        let result = cancellable(cancel, async {
            sqlx::query(&self.sql.touch)
                .bind(&stamp)
                .bind(name)
                .execute(&pool)
                .await
                .map_err(store_error("touch", name))
        })
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(lock = name, "touch found no lock to extend");
        } else {
            tracing::debug!(lock = name, updated_at = %stamp, "lock lease extended");
        }
        Ok(())
    }

    /// Delete `name` whoever holds it. Releasing a free lock is a no-op.
    pub async fn release(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        require_non_empty("lock name", name)?;
        cancellable(cancel, self.ensure_schema()).await?;
        let pool = self.pool(StoreRole::ReadWrite).await?;

        let result = cancellable(cancel, async {
            sqlx::query(&self.sql.delete)
                .bind(name)
                .execute(&pool)
                .await
                .map_err(store_error("release", name))
        })
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(lock = name, "release found no lock");
        } else {
            tracing::info!(lock = name, "lock released");
        }
        Ok(())
    }

    /// Delete `name` only if `owner` holds it. Not cancellable.
    pub(crate) async fn release_if_owner(&self, name: &str, owner: &str) -> Result<bool> {
        let pool = self.pool(StoreRole::ReadWrite).await?;
        let result = sqlx::query(&self.sql.delete_owned)
            .bind(name)
            .bind(owner)
            .execute(&pool)
            .await
            .map_err(store_error("release", name))?;
        Ok(result.rows_affected() > 0)
    }

    /// Current state of `name` as seen by `requester`, or `None` if free.
    ///
    /// Status is `Expired` when the lease has run out, otherwise `Acquired`
    /// when `requester` matches the owner ignoring case, otherwise
    /// `OwnedBySomeoneElse`.
    pub async fn query(
        &self,
        name: &str,
        requester: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<LockInfo>> {
        require_non_empty("lock name", name)?;
        cancellable(cancel, self.ensure_schema()).await?;
        let pool = self.pool(StoreRole::Reader).await?;

        let row: Option<LockRow> = cancellable(cancel, async {
            sqlx::query_as(&self.sql.select)
                .bind(name)
                .fetch_optional(&pool)
                .await
                .map_err(store_error("query", name))
        })
        .await?;

        let now = now_utc();
        row.map(|row| {
            LockRecord::try_from(row).map(|rec| rec.to_info(rec.status_for(requester, now)))
        })
        .transpose()
    }

    /// Every lock row, ordered by name, judged as [`LockService::query`] would.
    pub async fn list(&self, requester: &str, cancel: &CancellationToken) -> Result<Vec<LockInfo>> {
        cancellable(cancel, self.ensure_schema()).await?;
        let pool = self.pool(StoreRole::Reader).await?;

        let rows: Vec<LockRow> = cancellable(cancel, async {
            sqlx::query_as(&self.sql.select_all)
                .fetch_all(&pool)
                .await
                .map_err(store_error("list", self.table()))
        })
        .await?;

        let now = now_utc();
        rows.into_iter()
            .map(|row| {
                LockRecord::try_from(row).map(|rec| rec.to_info(rec.status_for(requester, now)))
            })
            .collect()
    }
}
