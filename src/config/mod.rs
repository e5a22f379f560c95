use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

const DEFAULT_PORT: u16 = 13110;
const DEFAULT_UPSTREAM_URL: &str = "http://localhost:13100";
const DEFAULT_USER_ID: &str = "vscode-user";

// ─── UpstreamConfig ───────────────────────────────────────────────────────────

/// Upstream assistant service configuration (`[upstream]` in config.toml).
///
/// The daemon proxies every suggestion and chat request to this HTTP service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the assistant service (default: http://localhost:13100).
    /// Override with the `VICOD_UPSTREAM_URL` env var.
    pub base_url: String,
    /// User identifier sent with every upstream request when no account is
    /// linked for the workspace (default: "vscode-user").
    pub user_id: String,
    /// Request timeout in seconds (default: 30).
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            timeout_secs: 30,
        }
    }
}

// ─── InlineConfig ─────────────────────────────────────────────────────────────

/// Inline suggestion configuration (`[inline]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InlineConfig {
    /// Enable inline suggestions. Default: true. Hot-reloadable.
    pub enabled: bool,
    /// Debounce delay before a request is sent upstream (milliseconds). Default: 600.
    pub debounce_ms: u64,
    /// Lines of context captured above and below the cursor. Default: 40.
    pub context_radius: usize,
    /// Context radius for Python files, which lean on longer scopes. Default: 80.
    pub python_context_radius: usize,
    /// Hard cap on suggestion length in characters. Default: 120.
    pub max_chars: usize,
    /// Same-line suggestions shorter than this are discarded as noise. Default: 3.
    pub min_line_chars: usize,
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 600,
            context_radius: 40,
            python_context_radius: 80,
            max_chars: 120,
            min_line_chars: 3,
        }
    }
}

// ─── ChatConfig ───────────────────────────────────────────────────────────────

/// Chat configuration (`[chat]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    /// How many recent messages are replayed as history on each send. Default: 40.
    pub history_limit: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { history_limit: 40 }
    }
}

// ─── SamplerConfig ────────────────────────────────────────────────────────────

/// Workspace sampler configuration (`[sampler]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Character budget for an assembled sample (default: 40000, ~10k tokens).
    pub target_chars: usize,
    /// Maximum files included per folder bucket. Default: 2.
    pub max_files_per_folder: usize,
    /// Files larger than this many bytes are truncated before processing. Default: 262144.
    pub max_file_bytes: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_chars: 40_000,
            max_files_per_folder: 2,
            max_file_bytes: 256 * 1024,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `[daemon]` section of config.toml — all fields are optional overrides.
#[derive(Deserialize, Default)]
struct DaemonSection {
    /// WebSocket server port (default: 13110).
    port: Option<u16>,
    /// Log level filter string, e.g. "debug", "info,vicod=trace" (default: "info").
    log_level: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured for log aggregators).
    log_format: Option<String>,
}

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Daemon basics (`[daemon]`).
    daemon: Option<DaemonSection>,
    /// Upstream assistant service (`[upstream]`).
    upstream: Option<UpstreamConfig>,
    /// Inline suggestions (`[inline]`).
    inline: Option<InlineConfig>,
    /// Chat history (`[chat]`).
    chat: Option<ChatConfig>,
    /// Workspace sampler (`[sampler]`).
    sampler: Option<SamplerConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── DaemonConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Log output format: "pretty" (default) | "json" (structured for Loki/Elasticsearch).
    pub log_format: String,
    /// Upstream assistant service: base URL, user id, timeout.
    pub upstream: UpstreamConfig,
    /// Inline suggestions: debounce, context radius, output caps.
    pub inline: InlineConfig,
    /// Chat: history window size.
    pub chat: ChatConfig,
    /// Workspace sampler: budgets and per-folder caps.
    pub sampler: SamplerConfig,
}

impl DaemonConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(port: Option<u16>, data_dir: Option<PathBuf>, log: Option<String>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();
        let daemon = toml.daemon.unwrap_or_default();

        let port = port.or(daemon.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(daemon.log_level).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("VICOD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(daemon.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let mut upstream = toml.upstream.unwrap_or_default();
        if let Ok(url) = std::env::var("VICOD_UPSTREAM_URL") {
            if !url.is_empty() {
                upstream.base_url = url;
            }
        }
        if let Ok(user) = std::env::var("VICOD_USER_ID") {
            if !user.is_empty() {
                upstream.user_id = user;
            }
        }

        let inline = toml.inline.unwrap_or_default();
        let chat = toml.chat.unwrap_or_default();
        let sampler = toml.sampler.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            log_format,
            upstream,
            inline,
            chat,
            sampler,
        }
    }
}

// ─── Hot-reloadable config subset ─────────────────────────────────────────────

/// Non-critical config fields that can be changed without restarting the daemon.
#[derive(Debug, Clone)]
pub struct HotConfig {
    pub log_level: String,
    /// Inline suggestions on/off. Also flipped at runtime by `inline.enabled` RPCs.
    pub inline_enabled: bool,
}

/// Watches `config.toml` for changes and reloads non-critical fields.
///
/// The watcher uses the `notify` crate (kqueue on macOS, inotify on Linux)
/// to detect file modifications. Only `log_level` and `inline.enabled` are
/// reloaded; port, upstream URL, and other startup-only fields require a
/// full restart.
pub struct ConfigWatcher {
    pub hot: Arc<RwLock<HotConfig>>,
    // Hold the watcher alive; dropping it stops the file watch.
    _watcher: notify_debouncer_full::Debouncer<
        notify_debouncer_full::notify::RecommendedWatcher,
        notify_debouncer_full::FileIdMap,
    >,
}

impl ConfigWatcher {
    /// Start watching `{data_dir}/config.toml` for changes.
    ///
    /// Returns `None` if the watcher could not be created (non-fatal; the
    /// daemon runs fine without hot-reload).
    pub fn start(data_dir: &Path) -> Option<Self> {
        let config_path = data_dir.join("config.toml");
        let initial = load_hot_config(&config_path);
        let hot = Arc::new(RwLock::new(initial));

        let hot_clone = hot.clone();
        let config_path_clone = config_path.clone();
        let rt_handle = tokio::runtime::Handle::current();

        let watcher = notify_debouncer_full::new_debouncer(
            std::time::Duration::from_secs(2),
            None,
            move |result: notify_debouncer_full::DebounceEventResult| {
                if let Ok(events) = result {
                    // Only act on modify/create events
                    let relevant = events.iter().any(|e| {
                        use notify_debouncer_full::notify::EventKind;
                        matches!(e.event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    });
                    if relevant {
                        let hot = hot_clone.clone();
                        let path = config_path_clone.clone();
                        rt_handle.spawn(async move {
                            let new_config = load_hot_config(&path);
                            let mut guard = hot.write().await;
                            if guard.log_level != new_config.log_level
                                || guard.inline_enabled != new_config.inline_enabled
                            {
                                info!(
                                    log_level = %new_config.log_level,
                                    inline_enabled = new_config.inline_enabled,
                                    "config.toml reloaded"
                                );
                                *guard = new_config;
                            }
                        });
                    }
                }
            },
        );

        match watcher {
            Ok(mut debouncer) => {
                use notify_debouncer_full::notify::Watcher as _;
                // Watch the data_dir (parent of config.toml) since watching a
                // non-existent file fails on some platforms.
                let watch_path = config_path.parent().unwrap_or_else(|| Path::new("."));
                if let Err(e) = debouncer.watcher().watch(
                    watch_path,
                    notify_debouncer_full::notify::RecursiveMode::NonRecursive,
                ) {
                    warn!("config watcher failed to start: {e} — hot-reload disabled");
                    return None;
                }
                info!(path = %config_path.display(), "config hot-reload watcher started");
                Some(Self {
                    hot,
                    _watcher: debouncer,
                })
            }
            Err(e) => {
                warn!("config watcher creation failed: {e} — hot-reload disabled");
                None
            }
        }
    }
}

/// Load only the hot-reloadable fields from config.toml.
fn load_hot_config(path: &Path) -> HotConfig {
    let toml = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str::<TomlConfig>(&s).ok())
        .unwrap_or_default();
    HotConfig {
        log_level: toml
            .daemon
            .and_then(|d| d.log_level)
            .unwrap_or_else(|| "info".to_string()),
        inline_enabled: toml.inline.map(|i| i.enabled).unwrap_or(true),
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/vicod
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("vicod");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/vicod or ~/.local/share/vicod
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("vicod");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("vicod");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\vicod
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("vicod");
        }
    }
    // Fallback
    PathBuf::from(".vicod")
}
