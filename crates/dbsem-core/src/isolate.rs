//! Work isolation
//!
//! Acquire, run, release. Contention is retried until the lock is won or
//! the caller cancels; there is no attempt limit. Once the lock is held it
//! is released exactly once, whether the work returns, fails, is cancelled,
//! or panics.

use std::{any::Any, future::Future, panic::AssertUnwindSafe, time::Duration};

use futures::FutureExt;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{LockConfig, DEFAULT_RETRY_DELAY_SECS, DEFAULT_TIMEOUT_SECS},
    lock::LockInfo,
    service::LockService,
    Error,
};

/// Timing for [`LockService::isolate_work`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolateOptions {
    /// Lease declared on each acquisition
    pub timeout: Duration,
    /// Wait between contended attempts
    pub retry_delay: Duration,
    /// Touch the lock this often while the work runs
    pub keepalive: Option<Duration>,
}

impl IsolateOptions {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            keepalive: None,
        }
    }

    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub const fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = Some(keepalive);
        self
    }

    /// A keepalive must fire before the lease it renews runs out.
    pub fn validate(&self) -> crate::Result<()> {
        match self.keepalive {
            Some(period) if period.is_zero() => Err(Error::InvalidArgument(
                "keepalive interval must be positive".to_string(),
            )),
            Some(period) if period >= self.timeout => Err(Error::InvalidArgument(format!(
                "keepalive interval {period:?} must be shorter than the lock timeout {:?}",
                self.timeout
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for IsolateOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl From<&LockConfig> for IsolateOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retry_delay: config.retry_delay(),
            keepalive: config.keepalive(),
        }
    }
}

/// Callback told about each contended attempt.
pub type Notify<'a> = &'a (dyn Fn(&str) + Send + Sync);

enum Held<T, E> {
    Finished(Result<T, E>),
    Cancelled,
    Panicked(Box<dyn Any + Send>),
}

impl LockService {
    /// Run `work` while holding `name`.
    ///
    /// While someone else holds the lock, `notify` (if given) receives a
    /// message naming the owner and the next retry, then the wrapper waits
    /// `options.retry_delay` and tries again.
    ///
    /// If the work succeeds but the release fails, the release error is
    /// returned. If the work failed, a release failure is only logged.
    pub async fn isolate_work<T, E, F, Fut>(
        &self,
        name: &str,
        requester: &str,
        options: &IsolateOptions,
        work: F,
        notify: Option<Notify<'_>>,
        cancel: &CancellationToken,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Error>,
    {
        options.validate()?;

        loop {
            let info = match self.acquire(name, requester, options.timeout, cancel).await {
                Ok(info) => info,
                Err(Error::Cancelled) => {
                    self.discard_unseen_acquisition(name, requester).await;
                    return Err(Error::Cancelled.into());
                }
                Err(e) => return Err(e.into()),
            };
            if info.is_held() {
                tracing::debug!(lock = name, status = %info.status, "running isolated work");
                break;
            }

            let message = contention_message(&info, options.retry_delay);
            tracing::debug!(lock = name, owner = %info.owner, "{message}");
            if let Some(notify) = notify {
                notify(&message);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled.into()),
                () = tokio::time::sleep(options.retry_delay) => {}
            }
        }

        let outcome = self.run_held(name, options.keepalive, work, cancel).await;

        // A cancelled caller still gets its lock released.
        let released = self.release(name, &CancellationToken::new()).await;
        if let Err(e) = &released {
            tracing::warn!(lock = name, error = %e, "failed to release lock after work");
        }

        match outcome {
            Held::Finished(Ok(value)) => released.map(|()| value).map_err(E::from),
            Held::Finished(Err(e)) => Err(e),
            Held::Cancelled => Err(Error::Cancelled.into()),
            Held::Panicked(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// [`LockService::isolate_work`] for side-effecting work, without a
    /// contention callback.
    pub async fn isolate<E, F, Fut>(
        &self,
        name: &str,
        requester: &str,
        options: &IsolateOptions,
        work: F,
        cancel: &CancellationToken,
    ) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<Error>,
    {
        self.isolate_work(name, requester, options, work, None, cancel)
            .await
    }

    /// Cancellation can land after the acquiring commit but before its
    /// result is seen, leaving a row this caller never learned it owns.
    async fn discard_unseen_acquisition(&self, name: &str, requester: &str) {
        match self.release_if_owner(name, requester).await {
            Ok(true) => {
                tracing::info!(
                    lock = name,
                    owner = requester,
                    "released lock acquired during cancellation"
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(lock = name, error = %e, "cleanup after cancelled acquire failed");
            }
        }
    }

    async fn run_held<T, E, F, Fut>(
        &self,
        name: &str,
        keepalive: Option<Duration>,
        work: F,
        cancel: &CancellationToken,
    ) -> Held<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let work = AssertUnwindSafe(async move { work().await }).catch_unwind();
        tokio::pin!(work);

        let mut ticker = keepalive
            .and_then(|period| Some((Instant::now().checked_add(period)?, period)))
            .map(|(start, period)| {
                let mut ticker = tokio::time::interval_at(start, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Held::Cancelled,
                result = &mut work => {
                    return match result {
                        Ok(result) => Held::Finished(result),
                        Err(payload) => Held::Panicked(payload),
                    };
                }
                () = next_tick(&mut ticker) => {
                    if let Err(e) = self.touch(name, cancel).await {
                        tracing::warn!(lock = name, error = %e, "keepalive touch failed");
                    }
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn contention_message(info: &LockInfo, retry_delay: Duration) -> String {
    format!(
        "Lock '{}' is held by '{}' until {}; retrying in {retry_delay:?}",
        info.name,
        info.owner,
        info.expires_at_utc.to_rfc3339(),
    )
}
