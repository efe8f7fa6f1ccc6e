pub mod handlers;

use clap::{value_parser, Arg, ArgAction, Command};
use dbsem_core::lock::MAX_TIMEOUT_SECS;

pub fn build_cli() -> Command {
    Command::new("dbsem")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Distributed mutex backed by a shared SQL table")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print results as JSON"),
        )
        .arg(
            Arg::new("database-url")
                .long("database-url")
                .global(true)
                .value_name("URL")
                .help("SQLite URL of the lock store (overrides config and DBSEM_DATABASE_URL)"),
        )
        .arg(
            Arg::new("table")
                .long("table")
                .global(true)
                .value_name("NAME")
                .help("Lock table name (overrides config and DBSEM_TABLE)"),
        )
        .subcommand(cmd_acquire())
        .subcommand(cmd_touch())
        .subcommand(cmd_release())
        .subcommand(cmd_query())
        .subcommand(cmd_list())
        .subcommand(cmd_run())
}

fn name_arg() -> Arg {
    Arg::new("name")
        .required(true)
        .value_name("NAME")
        .help("Lock name (at most 128 characters)")
}

fn owner_arg() -> Arg {
    Arg::new("owner")
        .long("owner")
        .env("DBSEM_OWNER")
        .value_name("ID")
        .help("Requester identity [default: <user>@<host>:<pid>]")
}

fn timeout_arg() -> Arg {
    Arg::new("timeout")
        .long("timeout")
        .value_name("SECS")
        .value_parser(value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))
        .help("Lease length in seconds [default: lock.timeout_secs]")
}

fn cmd_acquire() -> Command {
    Command::new("acquire")
        .about("Try once to take a lock; exits 3 if someone else holds it")
        .arg(name_arg())
        .arg(owner_arg())
        .arg(timeout_arg())
}

fn cmd_touch() -> Command {
    Command::new("touch")
        .about("Restart the lease clock on a lock")
        .arg(name_arg())
}

fn cmd_release() -> Command {
    Command::new("release")
        .about("Delete a lock whoever holds it")
        .arg(name_arg())
}

fn cmd_query() -> Command {
    Command::new("query")
        .about("Show who holds a lock")
        .arg(name_arg())
        .arg(owner_arg())
}

fn cmd_list() -> Command {
    Command::new("list")
        .about("Show every lock in the table")
        .arg(owner_arg())
}

fn cmd_run() -> Command {
    Command::new("run")
        .about("Run a command while holding a lock, waiting for it if necessary")
        .arg(name_arg())
        .arg(owner_arg())
        .arg(timeout_arg())
        .arg(
            Arg::new("retry-delay")
                .long("retry-delay")
                .value_name("SECS")
                .value_parser(value_parser!(u64).range(1..))
                .help(
                    "Wait between attempts while the lock is held elsewhere \
                     [default: lock.retry_delay_secs]",
                ),
        )
        .arg(
            Arg::new("keepalive")
                .long("keepalive")
                .value_name("SECS")
                .value_parser(value_parser!(u64).range(1..))
                .help("Touch the lock this often while the command runs"),
        )
        .arg(
            Arg::new("command")
                .required(true)
                .num_args(1..)
                .last(true)
                .value_name("CMD")
                .help("Command and arguments, after --"),
        )
}
