//! `dbsem run`: hold a lock for the lifetime of a child process.
//!
//! The child is killed if the lock wait or the run is cancelled, and the
//! lock is released before the child's exit code is passed on.

use std::time::Duration;

use anyhow::{Context as _, Result};
use dbsem_core::IsolateOptions;
use tokio::process::Command;

use super::Context;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub name: String,
    pub owner: String,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub keepalive: Option<Duration>,
    pub command: Vec<String>,
}

pub async fn run(ctx: &Context, options: &RunOptions) -> Result<i32> {
    let Some((program, args)) = options.command.split_first() else {
        anyhow::bail!("No command given to run");
    };

    let isolate = IsolateOptions {
        timeout: options.timeout,
        retry_delay: options.retry_delay,
        keepalive: options.keepalive,
    };
    let notify = |message: &str| eprintln!("{message}");

    ctx.service
        .isolate_work(
            &options.name,
            &options.owner,
            &isolate,
            || async {
                tracing::info!(lock = %options.name, program = %program, "starting command");
                let status = Command::new(program)
                    .args(args)
                    .kill_on_drop(true)
                    .status()
                    .await
                    .with_context(|| format!("Failed to run '{program}'"))?;
                Ok::<_, anyhow::Error>(exit_code(status))
            },
            Some(&notify),
            &ctx.cancel,
        )
        .await
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}
