// SPDX-License-Identifier: MIT
//! Pre-flight checks for the `vicod doctor` subcommand.
//!
//! Run before the daemon starts to catch environment problems early:
//! port conflicts, unwritable data dir, a database that will not open,
//! an unreachable upstream. Self-contained, no AppContext required.

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::ConnectOptions;

use crate::config::DaemonConfig;
use crate::upstream::VibeClient;

/// The result of a single diagnostic check.
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Run all diagnostic checks and return a list of results.
pub async fn run_doctor(config: &DaemonConfig) -> Vec<CheckResult> {
    vec![
        check_port_available(config.port),
        check_data_dir_writable(config),
        check_database_opens(config).await,
        check_upstream_reachable(config).await,
        check_auth_token(config),
    ]
}

// ─── Individual checks ────────────────────────────────────────────────────────

/// Check 1: the configured port is free.
fn check_port_available(port: u16) -> CheckResult {
    let passed = std::net::TcpListener::bind(("127.0.0.1", port)).is_ok();
    CheckResult {
        name: "Port available",
        passed,
        detail: if passed {
            format!("port {port} is free")
        } else {
            format!("port {port} is in use by another process")
        },
    }
}

/// Check 2: the data directory exists (or can be created) and is writable.
fn check_data_dir_writable(config: &DaemonConfig) -> CheckResult {
    let dir = &config.data_dir;
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult {
            name: "Data directory writable",
            passed: false,
            detail: format!("cannot create {}: {e}", dir.display()),
        };
    }
    let test_path = dir.join(".doctor_write_test");
    match std::fs::write(&test_path, b"ok") {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_path);
            CheckResult {
                name: "Data directory writable",
                passed: true,
                detail: format!("{} is writable", dir.display()),
            }
        }
        Err(e) => CheckResult {
            name: "Data directory writable",
            passed: false,
            detail: format!("cannot write to {}: {e}", dir.display()),
        },
    }
}

/// Check 3: the SQLite database opens if it exists.
async fn check_database_opens(config: &DaemonConfig) -> CheckResult {
    let db_path = config.data_dir.join("vicod.db");
    if !db_path.exists() {
        return CheckResult {
            name: "SQLite DB",
            passed: true,
            detail: format!(
                "{} not found (will be created on first start)",
                db_path.display()
            ),
        };
    }
    let opts = SqliteConnectOptions::new()
        .filename(&db_path)
        .read_only(true);
    match opts.connect().await {
        Ok(conn) => {
            drop(conn);
            CheckResult {
                name: "SQLite DB",
                passed: true,
                detail: format!("{} opens", db_path.display()),
            }
        }
        Err(e) => CheckResult {
            name: "SQLite DB",
            passed: false,
            detail: format!("cannot open {}: {e}", db_path.display()),
        },
    }
}

/// Check 4: the upstream suggestion service answers HTTP.
///
/// Any status code counts as reachable — the root path of the service is not
/// required to be a real route, only to answer.
async fn check_upstream_reachable(config: &DaemonConfig) -> CheckResult {
    let base_url = config.upstream.base_url.clone();
    let client = match VibeClient::new(&config.upstream) {
        Ok(c) => c,
        Err(e) => {
            return CheckResult {
                name: "Upstream reachable",
                passed: false,
                detail: format!("cannot build HTTP client: {e}"),
            }
        }
    };
    match client.probe().await {
        Ok(status) => CheckResult {
            name: "Upstream reachable",
            passed: true,
            detail: format!("HTTP {status} from {base_url}"),
        },
        Err(e) => CheckResult {
            name: "Upstream reachable",
            passed: false,
            detail: format!("cannot reach {base_url}: {e}"),
        },
    }
}

/// Check 5: the local auth token file, if present, is readable and non-empty.
fn check_auth_token(config: &DaemonConfig) -> CheckResult {
    let path = config.data_dir.join("auth_token");
    if !path.exists() {
        return CheckResult {
            name: "Auth token",
            passed: true,
            detail: "not found (will be generated on first start)".to_string(),
        };
    }
    match std::fs::read_to_string(&path) {
        Ok(token) if !token.trim().is_empty() => CheckResult {
            name: "Auth token",
            passed: true,
            detail: format!("{} present", path.display()),
        },
        Ok(_) => CheckResult {
            name: "Auth token",
            passed: false,
            detail: format!("{} is empty — run `vicod token --reset`", path.display()),
        },
        Err(e) => CheckResult {
            name: "Auth token",
            passed: false,
            detail: format!("cannot read {}: {e}", path.display()),
        },
    }
}

// ─── Output ───────────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Print a formatted table of check results to stdout.
pub fn print_doctor_results(results: &[CheckResult]) {
    println!();
    println!("{BOLD}vicod doctor — pre-flight checks{RESET}");
    println!("{}", "─".repeat(60));

    for r in results {
        let (symbol, color) = if r.passed {
            ("✓", GREEN)
        } else {
            ("✗", RED)
        };
        println!("  {color}{symbol}{RESET}  {:<30}  {}", r.name, r.detail);
    }

    println!("{}", "─".repeat(60));

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed == 0 {
        println!("{GREEN}All checks passed.{RESET}");
    } else {
        println!("{RED}{failed} check(s) failed. See above for details.{RESET}");
    }
    println!();
}
