//! Subcommand implementations
//!
//! Each command returns the process exit code on success; failures are
//! returned as errors and mapped to an exit code in `main`.

pub mod lock;
pub mod run;

use std::time::Duration;

use anyhow::Result;
use dbsem_core::{CancellationToken, Config, LockService};

/// Exit code for a lock that someone else holds.
pub const EXIT_HELD_ELSEWHERE: i32 = 3;

/// What every command runs against.
#[derive(Debug)]
pub struct Context {
    pub service: LockService,
    pub config: Config,
    pub json: bool,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(config: Config, json: bool, cancel: CancellationToken) -> Result<Self> {
        let service = LockService::from_config(&config)?;
        Ok(Self {
            service,
            config,
            json,
            cancel,
        })
    }

    pub fn timeout_or_default(&self, secs: Option<u64>) -> Duration {
        secs.map_or_else(|| self.config.lock.timeout(), Duration::from_secs)
    }
}

/// `--owner`, else `<user>@<host>:<pid>`.
pub fn resolve_owner(explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|owner| !owner.is_empty())
        .map_or_else(default_owner, ToString::to_string)
}

fn default_owner() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{user}@{host}:{}", std::process::id())
}
