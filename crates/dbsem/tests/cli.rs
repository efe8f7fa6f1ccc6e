//! End-to-end tests for the `dbsem` binary against a throwaway database.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

struct Sandbox {
    dir: TempDir,
    url: String,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("locks.db").display());
        Self { dir, url }
    }

    /// `dbsem` isolated from the caller's config files and `DBSEM_*` env.
    fn dbsem(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_dbsem"));
        cmd.current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path().join("config"))
            .env("RUST_LOG", "warn")
            .env("DBSEM_DATABASE_URL", &self.url);
        for key in [
            "DBSEM_DATABASE",
            "DBSEM_TABLE",
            "DBSEM_TIMEOUT_SECS",
            "DBSEM_RETRY_DELAY_SECS",
            "DBSEM_KEEPALIVE_SECS",
            "DBSEM_OWNER",
        ] {
            cmd.env_remove(key);
        }
        cmd
    }
}

#[test]
fn test_acquire_then_contend() {
    let sandbox = Sandbox::new();

    sandbox
        .dbsem()
        .args(["acquire", "job-1", "--owner", "hostA", "--timeout", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Acquired lock 'job-1' as hostA"));

    sandbox
        .dbsem()
        .args(["acquire", "job-1", "--owner", "hostB"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("held by hostA"));
}

#[test]
fn test_query_json_reports_status() {
    let sandbox = Sandbox::new();
    sandbox
        .dbsem()
        .args(["acquire", "job-1", "--owner", "hostA"])
        .assert()
        .success();

    sandbox
        .dbsem()
        .args(["query", "job-1", "--owner", "hostB", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"owned_by_someone_else\""))
        .stdout(predicate::str::contains("\"owner\": \"hostA\""))
        .stdout(predicate::str::contains("\"timeout_secs\": 60"));
}

#[test]
fn test_release_frees_lock_for_next_owner() {
    let sandbox = Sandbox::new();
    sandbox
        .dbsem()
        .args(["acquire", "job-1", "--owner", "hostA"])
        .assert()
        .success();

    sandbox
        .dbsem()
        .args(["release", "job-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Released lock 'job-1'"));

    sandbox
        .dbsem()
        .args(["acquire", "job-1", "--owner", "hostB"])
        .assert()
        .success();
}

#[test]
fn test_touch_json_ack() {
    let sandbox = Sandbox::new();
    sandbox
        .dbsem()
        .args(["acquire", "job-1", "--owner", "hostA"])
        .assert()
        .success();

    sandbox
        .dbsem()
        .args(["--json", "touch", "job-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"touched\""));
}

#[test]
fn test_query_missing_lock() {
    let sandbox = Sandbox::new();
    sandbox
        .dbsem()
        .args(["query", "nobody"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Lock 'nobody' is not held"));
}

#[test]
fn test_list_json_is_empty_array() {
    let sandbox = Sandbox::new();
    sandbox
        .dbsem()
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[cfg(unix)]
#[test]
fn test_run_forwards_exit_code_and_releases() {
    let sandbox = Sandbox::new();

    sandbox
        .dbsem()
        .args(["run", "job-1", "--owner", "hostA", "--", "sh", "-c", "exit 7"])
        .assert()
        .code(7);

    sandbox
        .dbsem()
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No locks"));
}

#[cfg(unix)]
#[test]
fn test_run_sees_its_own_lock() {
    let sandbox = Sandbox::new();
    let bin = env!("CARGO_BIN_EXE_dbsem");
    let script = format!("{bin} query job-1 --owner hostA");

    sandbox
        .dbsem()
        .args(["run", "job-1", "--owner", "hostA", "--", "sh", "-c", &script])
        .assert()
        .success()
        .stdout(predicate::str::contains("job-1 held by hostA [acquired]"));
}

#[cfg(unix)]
#[test]
fn test_run_rejects_keepalive_not_shorter_than_timeout() {
    let sandbox = Sandbox::new();
    let marker = sandbox.dir.path().join("ran");

    sandbox
        .dbsem()
        .args(["run", "job-1", "--owner", "hostA", "--timeout", "5", "--keepalive", "10"])
        .arg("--")
        .arg("touch")
        .arg(&marker)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("keepalive"));

    assert!(!marker.exists());
    sandbox
        .dbsem()
        .args(["query", "job-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Lock 'job-1' is not held"));
}

#[test]
fn test_keepalive_config_not_shorter_than_timeout_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox
        .dbsem()
        .env("DBSEM_TIMEOUT_SECS", "30")
        .env("DBSEM_KEEPALIVE_SECS", "30")
        .args(["list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("lock.keepalive_secs"));
}

#[test]
fn test_invalid_table_is_config_error() {
    let sandbox = Sandbox::new();
    sandbox
        .dbsem()
        .args(["list", "--table", "locks;drop"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("lock.table"));
}

#[test]
fn test_bad_config_file_is_rejected() {
    let sandbox = Sandbox::new();
    let project = sandbox.dir.path().join(".dbsem");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(project.join("config.toml"), "[lock]\nunknown_key = 1\n").unwrap();

    sandbox
        .dbsem()
        .args(["list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load configuration"));
}
