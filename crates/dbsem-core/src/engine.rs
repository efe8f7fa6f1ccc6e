//! Acquisition engine
//!
//! One attempt runs inside one transaction:
//!
//! 1. insert a fresh row; success means the lock was free
//! 2. on a unique-key violation, read the existing row
//! 3. unexpired lease: report the current owner
//! 4. expired lease: take it over with an update guarded by the
//!    `updated_at_utc` value just read
//!
//! A row that vanished between steps 1 and 2, or a guarded update that
//! matched nothing, means another caller got there first. The attempt is
//! abandoned and a fresh one starts from step 1.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::{
    error::store_error,
    lease,
    lock::{self, encode_timestamp, now_utc, LockInfo, LockRecord, LockRow, LockStatus},
    service::{cancellable, require_non_empty, LockService},
    store::StoreRole,
    Result,
};

enum Attempt {
    Done(LockInfo),
    Raced(&'static str),
}

impl LockService {
    /// Try once to take `name` for `requester` with a lease of `timeout`.
    ///
    /// Contention is not an error: a lock held by someone else comes back
    /// with status [`LockStatus::OwnedBySomeoneElse`]. Store failures are
    /// returned as-is and not retried here.
    pub async fn acquire(
        &self,
        name: &str,
        requester: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<LockInfo> {
        require_non_empty("lock name", name)?;
        require_non_empty("requester", requester)?;
        let timeout_secs = lock::timeout_secs(timeout)?;

        cancellable(cancel, self.ensure_schema()).await?;
        let pool = self.pool(StoreRole::ReadWrite).await?;

        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let outcome = cancellable(
                cancel,
                self.try_acquire(&pool, name, requester, timeout_secs),
            )
            .await?;
            match outcome {
                Attempt::Done(info) => return Ok(info),
                Attempt::Raced(reason) => {
                    tracing::debug!(lock = name, attempt, reason, "acquisition raced, restarting");
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    async fn try_acquire(
        &self,
        pool: &SqlitePool,
        name: &str,
        requester: &str,
        timeout_secs: i64,
    ) -> Result<Attempt> {
        let now = now_utc();
        let stamp = encode_timestamp(now);

        let mut tx = pool.begin().await.map_err(store_error("begin", name))?;

        let inserted = sqlx::query(&self.sql.insert)
            .bind(name)
            .bind(requester)
            .bind(timeout_secs)
            .bind(&stamp)
            .bind(&stamp)
            .execute(&mut *tx)
            .await;
        match inserted {
            Ok(_) => {
                tx.commit().await.map_err(store_error("commit", name))?;
                tracing::info!(lock = name, owner = requester, timeout_secs, "lock acquired");
                return Ok(Attempt::Done(held_info(
                    LockStatus::Acquired,
                    name,
                    requester,
                    timeout_secs,
                    now,
                )));
            }
            Err(e) if is_unique_violation(&e) => {}
            Err(e) => return Err(store_error("insert", name)(e)),
        }

        let row: Option<LockRow> = sqlx::query_as(&self.sql.select)
            .bind(name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error("select", name))?;
        let Some(row) = row else {
            tx.rollback().await.map_err(store_error("rollback", name))?;
            return Ok(Attempt::Raced("row released before it could be read"));
        };
        let existing = LockRecord::try_from(row)?;

        if !existing.is_expired(now) {
            tx.commit().await.map_err(store_error("commit", name))?;
            tracing::debug!(lock = name, owner = %existing.owner, "lock owned by someone else");
            return Ok(Attempt::Done(
                existing.to_info(LockStatus::OwnedBySomeoneElse),
            ));
        }

        let stolen = sqlx::query(&self.sql.steal)
            .bind(requester)
            .bind(timeout_secs)
            .bind(&stamp)
            .bind(&stamp)
            .bind(name)
            .bind(&existing.version)
            .execute(&mut *tx)
            .await
            .map_err(store_error("steal", name))?;

        if stolen.rows_affected() == 1 {
            tx.commit().await.map_err(store_error("commit", name))?;
            tracing::info!(
                lock = name,
                owner = requester,
                previous_owner = %existing.owner,
                expired_at = %existing.expires_at(),
                "expired lock forcibly acquired"
            );
            Ok(Attempt::Done(held_info(
                LockStatus::ForcedAcquired,
                name,
                requester,
                timeout_secs,
                now,
            )))
        } else {
            tx.rollback().await.map_err(store_error("rollback", name))?;
            Ok(Attempt::Raced("lease changed before it could be taken over"))
        }
    }
}

fn held_info(
    status: LockStatus,
    name: &str,
    owner: &str,
    timeout_secs: i64,
    now: DateTime<Utc>,
) -> LockInfo {
    LockInfo {
        status,
        name: name.to_string(),
        owner: owner.to_string(),
        timeout: Duration::from_secs(timeout_secs.unsigned_abs()),
        expires_at_utc: lease::expires_at(now, timeout_secs).unwrap_or(DateTime::<Utc>::MAX_UTC),
        created_at_utc: now,
        updated_at_utc: now,
    }
}

/// `SQLite` reports primary-key and unique collisions as extended codes
/// 1555 and 2067.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() || matches!(db.code().as_deref(), Some("1555" | "2067"))
        }
        _ => false,
    }
}
