// SPDX-License-Identifier: MIT
//! Last-known editor state.
//!
//! Thin clients report their active file, cursor, and selection as the user
//! moves around; the daemon keeps the latest values so chat and sampling can
//! answer "what is the user looking at" without a round-trip to the editor.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Selected line range, inclusive, 0-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub start_line: u32,
    pub end_line: u32,
}

/// Snapshot of the client's editor as last reported.
///
/// Every field is optional — a client may omit anything it cannot determine,
/// and nothing has been reported at daemon start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorContext {
    pub file_path: Option<String>,
    pub language: Option<String>,
    /// 0-based line of the primary cursor.
    pub cursor_line: Option<u32>,
    pub selection: Option<Selection>,
    /// ISO-8601 UTC timestamp of the last update, if any.
    pub updated_at: Option<String>,
}

/// Partial update; `None` fields keep their previous value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorContextUpdate {
    pub file_path: Option<String>,
    pub language: Option<String>,
    pub cursor_line: Option<u32>,
    pub selection: Option<Selection>,
}

/// Holds the most recent [`EditorContext`] across all connected clients.
pub struct EditorState {
    inner: RwLock<EditorContext>,
}

impl Default for EditorState {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(EditorContext::default()),
        }
    }

    /// Merge a partial update and stamp `updated_at`. Returns the new state.
    pub async fn update(&self, update: EditorContextUpdate) -> EditorContext {
        let mut ctx = self.inner.write().await;
        if let Some(v) = update.file_path {
            ctx.file_path = Some(v);
        }
        if let Some(v) = update.language {
            ctx.language = Some(v);
        }
        if let Some(v) = update.cursor_line {
            ctx.cursor_line = Some(v);
        }
        if let Some(v) = update.selection {
            ctx.selection = Some(v);
        }
        ctx.updated_at = Some(chrono::Utc::now().to_rfc3339());
        ctx.clone()
    }

    pub async fn get(&self) -> EditorContext {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_empty() {
        let state = EditorState::new();
        let ctx = state.get().await;
        assert!(ctx.file_path.is_none());
        assert!(ctx.updated_at.is_none());
    }

    #[tokio::test]
    async fn partial_update_merges() {
        let state = EditorState::new();
        state
            .update(EditorContextUpdate {
                file_path: Some("src/app.ts".into()),
                language: Some("typescript".into()),
                ..Default::default()
            })
            .await;

        let ctx = state
            .update(EditorContextUpdate {
                cursor_line: Some(42),
                ..Default::default()
            })
            .await;

        assert_eq!(ctx.file_path.as_deref(), Some("src/app.ts"));
        assert_eq!(ctx.language.as_deref(), Some("typescript"));
        assert_eq!(ctx.cursor_line, Some(42));
        assert!(ctx.updated_at.is_some());
    }

    #[tokio::test]
    async fn selection_replaces_previous() {
        let state = EditorState::new();
        state
            .update(EditorContextUpdate {
                selection: Some(Selection {
                    start_line: 1,
                    end_line: 5,
                }),
                ..Default::default()
            })
            .await;
        let ctx = state
            .update(EditorContextUpdate {
                selection: Some(Selection {
                    start_line: 7,
                    end_line: 7,
                }),
                ..Default::default()
            })
            .await;
        assert_eq!(
            ctx.selection,
            Some(Selection {
                start_line: 7,
                end_line: 7
            })
        );
    }
}
