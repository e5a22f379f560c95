use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use vicod::{
    auth,
    chat::ChatManager,
    config::{ConfigWatcher, DaemonConfig, HotConfig},
    doctor,
    editor::EditorState,
    ipc::event::EventBroadcaster,
    review::ReviewManager,
    storage::Storage,
    suggest::SuggestEngine,
    upstream::{UpstreamApi, VibeClient},
    AppContext,
};

/// Queries slower than this are logged at WARN by the sqlx driver.
const SLOW_QUERY_MS: u64 = 250;

#[derive(Parser)]
#[command(
    name = "vicod",
    about = "Vibe Coding host daemon — AI editing brain for thin editor clients",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "VICOD_PORT")]
    port: Option<u16>,

    /// Data directory for config, review backups, and the SQLite database
    #[arg(long, env = "VICOD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VICOD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "VICOD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs vicod in the foreground, listening on 127.0.0.1 only.
    ///
    /// Examples:
    ///   vicod serve
    ///   vicod
    Serve,
    /// Show daemon status (running, version, pending reviews).
    ///
    /// Queries the daemon's HTTP health endpoint and prints a summary line.
    /// Exits 0 if healthy, 1 if stopped or unresponsive.
    ///
    /// Examples:
    ///   vicod status
    ///   vicod status --json
    Status {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },
    /// Show or rotate the daemon auth token.
    ///
    /// The token lives at {data_dir}/auth_token. Editor extensions read it
    /// to authenticate their WebSocket connection.
    ///
    /// Examples:
    ///   vicod token
    ///   vicod token --reset
    Token {
        /// Mint a new token, replacing the old one. New connections need
        /// the new token; established ones keep working.
        #[arg(long)]
        reset: bool,
    },
    /// View the daemon log file.
    ///
    /// Prints the last N lines from the daemon log. Use --follow to tail live output.
    ///
    /// Examples:
    ///   vicod logs
    ///   vicod logs -f
    ///   vicod logs --lines 100
    ///   vicod logs --filter warn
    Logs {
        /// Follow log output in real time (like tail -f)
        #[arg(long, short)]
        follow: bool,
        /// Number of lines to show (0 = all)
        #[arg(long, short = 'n', default_value = "50")]
        lines: u64,
        /// Minimum log level to show: trace, debug, info, warn, error
        #[arg(long)]
        filter: Option<String>,
    },
    /// Run diagnostic checks on daemon prerequisites.
    ///
    /// Checks port availability, data directory writability, SQLite database
    /// accessibility, upstream reachability, and the auth token file.
    ///
    /// Exit code 0 if all checks pass, 1 if any check fails.
    ///
    /// Examples:
    ///   vicod doctor
    Doctor,
    /// Sample a workspace into one prompt-sized context document.
    ///
    /// Walks the directory, picks representative files per folder, strips
    /// comments or skeletonizes bodies, and prints the result. The same
    /// routine backs the workspace.sample RPC.
    ///
    /// Examples:
    ///   vicod sample .
    ///   vicod sample /path/to/project --json
    Sample {
        /// Workspace root to sample
        path: std::path::PathBuf,
        /// Print the full report as JSON instead of the sample text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format = std::env::var("VICOD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    match args.command {
        Some(Command::Status { json }) => {
            let config = DaemonConfig::new(args.port, args.data_dir, Some("error".to_string()));
            let exit_code = run_status(&config, json).await;
            std::process::exit(exit_code);
        }
        Some(Command::Token { reset }) => {
            let config = DaemonConfig::new(None, args.data_dir, Some("error".to_string()));
            run_token(&config, reset)?;
        }
        Some(Command::Logs {
            follow,
            lines,
            filter,
        }) => {
            let config = DaemonConfig::new(None, args.data_dir, Some("error".to_string()));
            run_logs(&config, follow, lines, filter.as_deref())?;
        }
        Some(Command::Doctor) => {
            let config = DaemonConfig::new(args.port, args.data_dir, Some("error".to_string()));
            let results = doctor::run_doctor(&config).await;
            doctor::print_doctor_results(&results);
            let failed = results.iter().filter(|r| !r.passed).count();
            std::process::exit(if failed == 0 { 0 } else { 1 });
        }
        Some(Command::Sample { path, json }) => {
            let config = DaemonConfig::new(None, args.data_dir, Some("error".to_string()));
            run_sample(&path, &config, json).await?;
        }
        None | Some(Command::Serve) => {
            run_server(args.port, args.data_dir, args.log).await?;
        }
    }

    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("vicod.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}

// ── Panic hook + crash log ────────────────────────────────────────────────────

/// Install a custom panic hook that writes panic info + backtrace to
/// `{data_dir}/crash.log`.
///
/// The crash log is checked and removed on the next startup (`check_crash_log`).
fn install_panic_hook(data_dir: std::path::PathBuf) {
    let original = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        // Call the original hook first (prints to stderr).
        original(info);

        let crash_path = data_dir.join("crash.log");
        let msg = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("unknown panic");

        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        let backtrace = std::backtrace::Backtrace::capture();
        let content = format!(
            "vicod panic at {location}\n\
             message: {msg}\n\
             version: {}\n\
             backtrace:\n{backtrace:#}\n",
            env!("CARGO_PKG_VERSION")
        );

        // Best-effort write — if this fails, we can't do much.
        let _ = std::fs::write(&crash_path, &content);
    }));
}

/// Check for a crash log from the previous run, log it at error level, then delete it.
///
/// Called early in `run_server()` after logging is initialized.
fn check_crash_log(data_dir: &std::path::Path) {
    let crash_path = data_dir.join("crash.log");
    match std::fs::read_to_string(&crash_path) {
        Ok(content) => {
            tracing::error!(
                crash_report = %content.trim(),
                "previous daemon run ended with a panic — see crash report above"
            );
            let _ = std::fs::remove_file(&crash_path);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(err = %e, "could not read crash.log");
        }
    }
}

// ── vicod status ──────────────────────────────────────────────────────────────

/// Returns exit code: 0 = healthy, 1 = stopped/unresponsive.
async fn run_status(config: &DaemonConfig, json: bool) -> i32 {
    let url = format!("http://127.0.0.1:{}/health", config.port);
    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3))
        .build()
    {
        Ok(c) => c,
        Err(_) => return 1,
    };

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let version = body["version"].as_str().unwrap_or("?");
            let pending = body["pendingReviews"].as_u64().unwrap_or(0);
            let uptime_str = format_uptime(body["uptime"].as_u64().unwrap_or(0));

            if json {
                println!("{}", serde_json::to_string(&body).unwrap_or_default());
            } else {
                println!(
                    "vicod {version} — Running ({pending} pending reviews, uptime {uptime_str})"
                );
            }
            0
        }
        _ => {
            if json {
                println!(r#"{{"status":"not_running"}}"#);
            } else {
                println!("vicod: not running");
            }
            1
        }
    }
}

/// Format uptime seconds as "2h 14m" or "45m 3s".
fn format_uptime(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

// ── vicod token ───────────────────────────────────────────────────────────────

fn run_token(config: &DaemonConfig, reset: bool) -> Result<()> {
    if reset {
        let token = auth::reset_token(&config.data_dir)?;
        println!("{token}");
        return Ok(());
    }

    let token_path = config.data_dir.join("auth_token");
    match std::fs::read_to_string(&token_path) {
        Ok(token) => {
            println!("{}", token.trim());
            Ok(())
        }
        Err(_) => {
            eprintln!("error: auth token not found at {}", token_path.display());
            eprintln!("       Is the daemon running? Start it with: vicod serve");
            std::process::exit(1);
        }
    }
}

// ── vicod logs ────────────────────────────────────────────────────────────────

fn run_logs(config: &DaemonConfig, follow: bool, lines: u64, filter: Option<&str>) -> Result<()> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    // Resolve log path: VICOD_LOG_FILE env wins; otherwise tail the newest
    // dated file the daily appender wrote under the data dir.
    let log_path = match std::env::var("VICOD_LOG_FILE") {
        Ok(p) => std::path::PathBuf::from(p),
        Err(_) => newest_log_file(&config.data_dir, "vicod.log")?,
    };

    if !log_path.exists() {
        anyhow::bail!(
            "log file not found: {}\n  Start the daemon first: vicod serve --log-file {}",
            log_path.display(),
            log_path.display()
        );
    }

    let content = std::fs::read_to_string(&log_path)
        .with_context(|| format!("cannot read log file: {}", log_path.display()))?;

    let all_lines: Vec<&str> = content.lines().collect();

    let min_level = filter.map(|f| f.to_ascii_lowercase());

    // Apply level filter (heuristic: check for level strings in each line)
    let filtered: Vec<&&str> = if let Some(ref level) = min_level {
        let levels = log_level_order(level);
        all_lines
            .iter()
            .filter(|line| {
                let l = line.to_ascii_lowercase();
                levels.iter().any(|lvl| l.contains(lvl))
            })
            .collect()
    } else {
        all_lines.iter().collect()
    };

    // Print last N lines (0 = all)
    let start = if lines == 0 || lines as usize >= filtered.len() {
        0
    } else {
        filtered.len() - lines as usize
    };

    for line in &filtered[start..] {
        println!("{line}");
    }

    if !follow {
        return Ok(());
    }

    // Follow mode: poll file every 250ms, print new content as it appears
    let mut file = File::open(&log_path)
        .with_context(|| format!("cannot open log file: {}", log_path.display()))?;
    let mut pos = file
        .seek(SeekFrom::End(0))
        .context("cannot seek log file")?;

    loop {
        std::thread::sleep(std::time::Duration::from_millis(250));

        // Handle log rotation: if file shrunk, reopen from start
        let meta = std::fs::metadata(&log_path);
        let new_size = meta.map(|m| m.len()).unwrap_or(0);
        if new_size < pos {
            if let Ok(f) = File::open(&log_path) {
                file = f;
                pos = 0;
            }
        }

        file.seek(SeekFrom::Start(pos))
            .context("cannot seek log file")?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .context("cannot read log file")?;

        if !buf.is_empty() {
            let should_print = if let Some(ref level) = min_level {
                let levels = log_level_order(level);
                levels.iter().any(|lvl| buf.to_ascii_lowercase().contains(lvl))
            } else {
                true
            };
            if should_print {
                print!("{buf}");
            }
            pos += buf.len() as u64;
        }
    }
}

/// Newest file in `dir` whose name starts with `stem`. The daily-rolling
/// appender writes `vicod.log.<YYYY-MM-DD>`, one file per day.
fn newest_log_file(dir: &std::path::Path, stem: &str) -> Result<std::path::PathBuf> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read log directory: {}", dir.display()))?;

    let mut newest: Option<(std::time::SystemTime, std::path::PathBuf)> = None;
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(stem) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }

    match newest {
        Some((_, path)) => Ok(path),
        None => anyhow::bail!(
            "no log files in {}\n  Start the daemon first: vicod serve",
            dir.display()
        ),
    }
}

/// Return all log levels at or above `min_level` (for line filtering).
fn log_level_order(min_level: &str) -> Vec<&'static str> {
    match min_level {
        "error" => vec!["error"],
        "warn" | "warning" => vec!["warn", "error"],
        "info" => vec!["info", "warn", "error"],
        "debug" => vec!["debug", "info", "warn", "error"],
        _ => vec!["trace", "debug", "info", "warn", "error"],
    }
}

// ── vicod sample ──────────────────────────────────────────────────────────────

async fn run_sample(path: &std::path::Path, config: &DaemonConfig, json: bool) -> Result<()> {
    let report = vicod::sampler::sample_workspace(path, &config.sampler).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print!("{}", report.content);
    eprintln!(
        "\n— {} file(s) in {} folder(s){}",
        report.files.len(),
        report.folders,
        if report.truncated {
            ", truncated to budget"
        } else {
            ""
        }
    );
    Ok(())
}

// ── vicod serve ───────────────────────────────────────────────────────────────

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
) -> Result<()> {
    // Warn when a non-default port is used — stock editor extensions dial 13110.
    if let Some(p) = port {
        if p != 13110 {
            eprintln!(
                "warning: non-default port {p}.\n  Editor extensions connect to 13110 — point them at this port explicitly."
            );
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "vicod starting");

    let config = Arc::new(DaemonConfig::new(port, data_dir, log));
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        upstream = %config.upstream.base_url,
        "config loaded"
    );

    // ── Panic hook: write crash.log on panic ─────────────────────────────────
    install_panic_hook(config.data_dir.clone());
    // If previous run panicked, log the crash report and delete it.
    check_crash_log(&config.data_dir);

    let storage = Arc::new(Storage::new_with_slow_query(&config.data_dir, SLOW_QUERY_MS).await?);

    let broadcaster = Arc::new(EventBroadcaster::new());

    // ── Config hot-reload (log level, inline.enabled) ────────────────────────
    let config_watcher = ConfigWatcher::start(&config.data_dir);
    let hot = match &config_watcher {
        Some(w) => w.hot.clone(),
        None => Arc::new(tokio::sync::RwLock::new(HotConfig {
            log_level: config.log.clone(),
            inline_enabled: config.inline.enabled,
        })),
    };

    let upstream: Arc<dyn UpstreamApi> = Arc::new(VibeClient::new(&config.upstream)?);

    // Probe the upstream once at startup so a dead backend shows in the logs
    // instead of as silent empty suggestions.
    {
        let upstream_cfg = config.upstream.clone();
        tokio::spawn(async move {
            match VibeClient::new(&upstream_cfg) {
                Ok(client) => match client.probe().await {
                    Ok(status) => info!(status, url = %upstream_cfg.base_url, "upstream reachable"),
                    Err(e) => warn!(
                        err = %e,
                        url = %upstream_cfg.base_url,
                        "upstream not reachable — suggestions and chat will degrade"
                    ),
                },
                Err(e) => warn!(err = %e, "upstream probe client failed to build"),
            }
        });
    }

    let chat = Arc::new(ChatManager::new(
        storage.clone(),
        upstream.clone(),
        broadcaster.clone(),
        config.upstream.user_id.clone(),
        config.chat.history_limit,
    ));
    let suggest = Arc::new(SuggestEngine::new(
        config.inline.clone(),
        config.upstream.user_id.clone(),
        upstream.clone(),
        hot.clone(),
        broadcaster.clone(),
    ));
    let review = Arc::new(ReviewManager::new(&config.data_dir, broadcaster.clone()));

    let auth_token = match auth::get_or_create_token(&config.data_dir) {
        Ok(t) => {
            info!("auth token ready");
            t
        }
        Err(e) => {
            // Auth token is required — running without it leaves the daemon fully
            // open to any local process. Startup configuration error, not
            // a recoverable condition.
            eprintln!("FATAL: failed to generate auth token: {e:#}");
            std::process::exit(1);
        }
    };

    let ctx = Arc::new(AppContext {
        config: config.clone(),
        hot,
        storage,
        broadcaster,
        chat,
        suggest,
        review,
        editor: Arc::new(EditorState::new()),
        auth_token,
        started_at: std::time::Instant::now(),
    });

    // Keep the watcher alive for the server's lifetime; dropping it stops
    // hot-reload.
    let _config_watcher = config_watcher;

    vicod::ipc::run(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn newest_log_file_picks_the_latest_dated_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("vicod.log.2026-08-27"), "old").unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), "x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        std::fs::write(dir.path().join("vicod.log.2026-08-28"), "new").unwrap();

        let path = newest_log_file(dir.path(), "vicod.log").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "vicod.log.2026-08-28"
        );
    }

    #[test]
    fn newest_log_file_errors_when_none_written_yet() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "").unwrap();

        let err = newest_log_file(dir.path(), "vicod.log").unwrap_err();
        assert!(err.to_string().contains("no log files"));
    }
}
