//! Work isolation across independent service instances.

mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use common::TestDb;
use dbsem_core::{CancellationToken, Error, IsolateOptions, Result};
use tokio::task::JoinSet;

fn options() -> IsolateOptions {
    IsolateOptions::new(Duration::from_secs(30)).with_retry_delay(Duration::from_millis(25))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_isolated_work_never_overlaps() -> Result<()> {
    let db = TestDb::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let mut set = JoinSet::new();
    for i in 0..6 {
        let service = db.service()?;
        let (inside, max_inside, runs) = (inside.clone(), max_inside.clone(), runs.clone());
        set.spawn(async move {
            let cancel = CancellationToken::new();
            service
                .isolate(
                    "critical",
                    &format!("worker-{i}"),
                    &options(),
                    || async move {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Error>(())
                    },
                    &cancel,
                )
                .await
        });
    }
    while let Some(joined) = set.join_next().await {
        joined.unwrap()?;
    }

    assert_eq!(runs.load(Ordering::SeqCst), 6);
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(db.row_count("critical").await, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_work_leaves_lock_reacquirable() -> Result<()> {
    let db = TestDb::new();
    let service = db.service()?;
    let cancel = CancellationToken::new();

    let result: std::result::Result<(), Error> = service
        .isolate(
            "critical",
            "worker-1",
            &options(),
            || async { Err(Error::InvalidArgument("work failed".into())) },
            &cancel,
        )
        .await;
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    let next = db
        .service()?
        .acquire("critical", "worker-2", Duration::from_secs(5), &cancel)
        .await?;
    assert!(next.is_held());
    Ok(())
}

#[tokio::test]
async fn test_cancel_after_acquire_releases() -> Result<()> {
    let db = TestDb::new();
    let service = db.service()?;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let result: std::result::Result<(), Error> = service
        .isolate(
            "critical",
            "worker-1",
            &options(),
            || async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                trigger.cancel();
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            &cancel,
        )
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(db.row_count("critical").await, 0);
    Ok(())
}
