// SPDX-License-Identifier: MIT
//
// editor.* RPC handlers: the client's "what am I looking at" state.

use crate::editor::EditorContextUpdate;
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

/// `editor.updateContext` — merge a partial update of the active file,
/// cursor, and selection.
///
/// Params: { filePath?, language?, cursorLine?, selection? }. Returns the
/// merged context with its new `updatedAt` stamp.
pub async fn update_context(params: Value, ctx: &AppContext) -> Result<Value> {
    let update: EditorContextUpdate = serde_json::from_value(params)?;
    let merged = ctx.editor.update(update).await;
    Ok(json!(merged))
}

/// `editor.getContext` — the context as last reported.
pub async fn get_context(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(json!(ctx.editor.get().await))
}
