//! dbsem - command-line front end for the `dbsem-core` distributed mutex
//!
//! Every subcommand builds one [`dbsem_core::LockService`] from the layered
//! configuration plus command-line overrides, runs a single operation, and
//! maps the outcome to a process exit code.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod signals;
