//! # dbsem-core
//!
//! A distributed mutex whose only coordination point is one row per lock
//! name in a shared SQL table. Processes on different machines take, renew,
//! and drop leases by name; a lease nobody renews before its timeout may be
//! taken over by the next caller.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use dbsem_core::{CancellationToken, Config, IsolateOptions, LockService};
//!
//! # async fn demo() -> dbsem_core::Result<()> {
//! let service = LockService::from_config(&Config::default())?;
//! let cancel = CancellationToken::new();
//! let options = IsolateOptions::new(Duration::from_secs(60));
//!
//! let rows = service
//!     .isolate_work(
//!         "nightly-import",
//!         "worker-1",
//!         &options,
//!         || async { Ok::<_, dbsem_core::Error>(42) },
//!         None,
//!         &cancel,
//!     )
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod bootstrap;
pub mod config;
mod engine;
mod error;
mod handle;
pub mod isolate;
pub mod lease;
pub mod lock;
mod service;
pub mod store;

pub use config::{load_config, load_config_from, Config, LockConfig, StoreConfig};
pub use error::{Error, Result};
pub use isolate::{IsolateOptions, Notify};
pub use lock::{LockInfo, LockRecord, LockStatus};
pub use service::LockService;
pub use store::{PoolProvider, StoreProvider, StoreRole};
pub use tokio_util::sync::CancellationToken;
