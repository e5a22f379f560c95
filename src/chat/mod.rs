use crate::ipc::event::EventBroadcaster;
use crate::storage::{ChatMessageRow, Storage};
use crate::upstream::{HistoryItem, UpstreamApi};
use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

// ─── View types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageView {
    pub id: String,
    pub workspace: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

fn row_to_view(row: ChatMessageRow) -> ChatMessageView {
    ChatMessageView {
        id: row.id,
        workspace: row.workspace,
        role: row.role,
        content: row.content,
        created_at: row.created_at,
    }
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// One conversation per workspace. Content is opaque to the daemon — the
/// client may embed structured blocks in it and parse them out later via
/// `files.write`.
pub struct ChatManager {
    storage: Arc<Storage>,
    upstream: Arc<dyn UpstreamApi>,
    broadcaster: Arc<EventBroadcaster>,
    /// Default upstream user id for workspaces without a linked account.
    user_id: String,
    history_limit: u32,
}

impl ChatManager {
    pub fn new(
        storage: Arc<Storage>,
        upstream: Arc<dyn UpstreamApi>,
        broadcaster: Arc<EventBroadcaster>,
        user_id: String,
        history_limit: u32,
    ) -> Self {
        Self {
            storage,
            upstream,
            broadcaster,
            user_id,
            history_limit,
        }
    }

    /// Handle `chat.send`: persist the user message, replay recent history to
    /// the upstream, persist and return the assistant reply.
    ///
    /// The user message survives an upstream failure so the client can retry
    /// without retyping.
    pub async fn send(
        &self,
        workspace: &str,
        content: &str,
        bearer: Option<&str>,
    ) -> Result<ChatMessageView> {
        let user_msg = self
            .storage
            .create_chat_message(workspace, "user", content)
            .await?;
        let user_view = row_to_view(user_msg);
        self.broadcaster.broadcast(
            "chat.messageCreated",
            json!({ "workspace": workspace, "message": &user_view }),
        );

        // Prior history: the newest messages before the one just stored.
        let rows = self
            .storage
            .recent_chat_messages(workspace, self.history_limit as i64 + 1)
            .await?;
        let history: Vec<HistoryItem> = rows
            .iter()
            .filter(|r| r.id != user_view.id)
            .map(|r| HistoryItem {
                role: r.role.clone(),
                content: r.content.clone(),
            })
            .collect();

        let reply = self
            .upstream
            .chat(&self.user_id, bearer, content, &history)
            .await
            .map_err(|e| anyhow::anyhow!("UPSTREAM_UNAVAILABLE: {e}"))?;

        let assistant_msg = self
            .storage
            .create_chat_message(workspace, "assistant", &reply)
            .await?;
        let assistant_view = row_to_view(assistant_msg);
        self.broadcaster.broadcast(
            "chat.messageCreated",
            json!({ "workspace": workspace, "message": &assistant_view }),
        );

        info!(workspace = %workspace, history = history.len(), "chat turn completed");
        Ok(assistant_view)
    }

    /// Handle `chat.history`: messages for a workspace, oldest first.
    pub async fn history(&self, workspace: &str, limit: Option<u32>) -> Result<Vec<ChatMessageView>> {
        let limit = limit.unwrap_or(self.history_limit) as i64;
        let rows = self.storage.recent_chat_messages(workspace, limit).await?;
        Ok(rows.into_iter().map(row_to_view).collect())
    }

    /// Handle `chat.clear`: delete the workspace conversation. Returns the
    /// number of messages removed.
    pub async fn clear(&self, workspace: &str) -> Result<u64> {
        let removed = self.storage.clear_chat_messages(workspace).await?;
        info!(workspace = %workspace, removed, "chat history cleared");
        Ok(removed)
    }

    /// Total stored messages for a workspace (reported by `daemon.status`).
    pub async fn count(&self, workspace: &str) -> Result<u64> {
        self.storage.count_chat_messages(workspace).await
    }
}
