//! Lock value types
//!
//! [`LockRecord`] is the decoded form of one row in the lock table. The
//! row's presence is the lock; there is no separate "free" marker.
//! [`LockInfo`] is the snapshot handed back to callers.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use strum::{Display, EnumString};

use crate::{lease, Error, Result};

/// Longest lease a caller may ask for: ten years.
pub const MAX_TIMEOUT_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Outcome of an acquisition attempt or a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LockStatus {
    /// The caller holds the lock (fresh insert, or query by the owner)
    Acquired,
    /// The caller took over a lock whose lease had expired
    ForcedAcquired,
    /// Someone else holds an unexpired lease
    OwnedBySomeoneElse,
    /// A row is present but its lease has run out (query only)
    Expired,
    /// Reserved, never produced
    ReleasedInTheMeanTime,
    /// Reserved, never produced
    ForcedReleased,
}

impl LockStatus {
    /// Whether this status means the caller now holds the lock.
    #[must_use]
    pub const fn is_held(self) -> bool {
        matches!(self, Self::Acquired | Self::ForcedAcquired)
    }
}

/// Snapshot of a lock, owned by whoever received it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockInfo {
    pub status: LockStatus,
    pub name: String,
    pub owner: String,
    #[serde(rename = "timeout_secs", serialize_with = "serialize_secs")]
    pub timeout: Duration,
    pub expires_at_utc: DateTime<Utc>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl LockInfo {
    /// Whether the caller that received this snapshot holds the lock.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.status.is_held()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_secs<S>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(value.as_secs())
}

/// Raw row as stored. Timestamps stay text so the version guard can
/// compare against exactly what was read.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct LockRow {
    pub name: String,
    pub owner: String,
    pub timeout_seconds: i64,
    pub created_at_utc: String,
    pub updated_at_utc: String,
}

/// Decoded lock row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub name: String,
    pub owner: String,
    pub timeout_secs: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `updated_at_utc` exactly as stored; the optimistic-concurrency token.
    pub version: String,
}

impl LockRecord {
    /// Decoded records always have a representable expiry.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        lease::expires_at(self.updated_at, self.timeout_secs).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        lease::is_expired(self.updated_at, self.timeout_secs, now)
    }

    /// Snapshot with the given status.
    #[must_use]
    pub fn to_info(&self, status: LockStatus) -> LockInfo {
        LockInfo {
            status,
            name: self.name.clone(),
            owner: self.owner.clone(),
            timeout: Duration::from_secs(self.timeout_secs.unsigned_abs()),
            expires_at_utc: self.expires_at(),
            created_at_utc: self.created_at,
            updated_at_utc: self.updated_at,
        }
    }

    /// Status a query by `requester` reports for this row at `now`.
    ///
    /// An expired lease reports `Expired` whoever holds it; otherwise the
    /// owner comparison is case-insensitive.
    #[must_use]
    pub fn status_for(&self, requester: &str, now: DateTime<Utc>) -> LockStatus {
        if self.is_expired(now) {
            LockStatus::Expired
        } else if self.owner.to_lowercase() == requester.to_lowercase() {
            LockStatus::Acquired
        } else {
            LockStatus::OwnedBySomeoneElse
        }
    }
}

impl TryFrom<LockRow> for LockRecord {
    type Error = Error;

    fn try_from(row: LockRow) -> Result<Self> {
        if row.timeout_seconds < 0 {
            return Err(Error::CorruptRecord {
                name: row.name,
                message: format!("negative timeout {}", row.timeout_seconds),
            });
        }
        let created_at = decode_timestamp(&row.name, &row.created_at_utc)?;
        let updated_at = decode_timestamp(&row.name, &row.updated_at_utc)?;
        if lease::expires_at(updated_at, row.timeout_seconds).is_none() {
            return Err(Error::CorruptRecord {
                name: row.name,
                message: format!("timeout {}s overflows the lease clock", row.timeout_seconds),
            });
        }
        Ok(Self {
            name: row.name,
            owner: row.owner,
            timeout_secs: row.timeout_seconds,
            created_at,
            updated_at,
            version: row.updated_at_utc,
        })
    }
}

/// Current time at the precision the store keeps.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 text with microseconds, e.g. `2026-01-02T03:04:05.000006Z`.
#[must_use]
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| Error::CorruptRecord {
            name: name.to_string(),
            message: format!("bad timestamp '{raw}': {e}"),
        })
}

/// Whole seconds for a lease, rounding sub-second remainders up.
pub fn timeout_secs(timeout: Duration) -> Result<i64> {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    if secs == 0 {
        return Err(Error::InvalidArgument(
            "lock timeout must be positive".to_string(),
        ));
    }
    if secs > MAX_TIMEOUT_SECS {
        return Err(Error::InvalidArgument(format!(
            "lock timeout {secs}s exceeds the maximum of {MAX_TIMEOUT_SECS}s"
        )));
    }
    i64::try_from(secs)
        .map_err(|_| Error::InvalidArgument(format!("lock timeout {secs}s is too large")))
}
