pub mod account;
pub mod chat;
pub mod config;
pub mod doctor;
pub mod editor;
pub mod fileset;
pub mod ipc;
pub mod review;
pub mod sampler;
pub mod storage;
pub mod suggest;
pub mod upstream;

// Re-export auth so main.rs can use vicod::auth directly.
pub use ipc::auth;

use std::sync::Arc;

use chat::ChatManager;
use config::{DaemonConfig, HotConfig};
use editor::EditorState;
use ipc::event::EventBroadcaster;
use review::ReviewManager;
use storage::Storage;
use suggest::SuggestEngine;

/// Shared application state passed to every RPC handler and background task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    /// Settings that may change at runtime (config file watcher, RPC toggles).
    pub hot: Arc<tokio::sync::RwLock<HotConfig>>,
    pub storage: Arc<Storage>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Chat conversations: persistence plus upstream round-trips.
    pub chat: Arc<ChatManager>,
    /// Inline suggestion engine (debounce, supersession, cache).
    pub suggest: Arc<SuggestEngine>,
    /// Pending file reviews and their on-disk backups.
    pub review: Arc<ReviewManager>,
    /// Last editor context reported by a connected client.
    pub editor: Arc<EditorState>,
    /// Local WebSocket auth token.  Every new connection must send a
    /// `daemon.auth` RPC with this token before any other method call.
    /// Empty string means auth is disabled (not recommended).
    pub auth_token: String,
    pub started_at: std::time::Instant,
}
