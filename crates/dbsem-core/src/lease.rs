//! Lease model
//!
//! A lease is anchored at the row's `updated_at_utc` and lasts
//! `timeout_seconds`. This module is the only place expiration is judged.

use chrono::{DateTime, TimeDelta, Utc};

/// When a lease touched at `updated_at` with `timeout_secs` runs out, or
/// `None` if that instant is past the representable range.
#[must_use]
pub fn expires_at(updated_at: DateTime<Utc>, timeout_secs: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(timeout_secs).and_then(|lease| updated_at.checked_add_signed(lease))
}

/// Whether the lease has run out at `now`.
///
/// The boundary instant itself still counts as held. A lease whose end
/// cannot be represented never runs out.
#[must_use]
pub fn is_expired(updated_at: DateTime<Utc>, timeout_secs: i64, now: DateTime<Utc>) -> bool {
    expires_at(updated_at, timeout_secs).is_some_and(|end| now > end)
}
