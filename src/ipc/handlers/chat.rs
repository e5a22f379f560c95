// SPDX-License-Identifier: MIT
//
// chat.* RPC handlers. Conversation state lives in SQLite behind
// ChatManager; these are thin parameter shims.

use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

/// `chat.send` — one conversational turn.
///
/// Params: { workspace, content }. Persists the user message, replays
/// recent history to the upstream, persists the assistant reply, and
/// returns it: `{ "message": { id, workspace, role, content, createdAt } }`.
///
/// An unreachable upstream is an RPC error; the user message stays
/// persisted so the client can retry without retyping.
pub async fn send(params: Value, ctx: &AppContext) -> Result<Value> {
    #[derive(serde::Deserialize)]
    struct Params {
        workspace: String,
        content: String,
    }

    let bearer = super::workspace_bearer(&params, ctx).await;
    let p: Params = serde_json::from_value(params)?;
    let reply = ctx
        .chat
        .send(&p.workspace, &p.content, bearer.as_deref())
        .await?;
    Ok(json!({ "message": reply }))
}

/// `chat.history` — messages for a workspace, oldest first.
///
/// Params: { workspace, limit? }.
pub async fn history(params: Value, ctx: &AppContext) -> Result<Value> {
    let workspace = params["workspace"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing workspace"))?;
    let limit = params["limit"].as_u64().map(|l| l as u32);

    let messages = ctx.chat.history(workspace, limit).await?;
    Ok(json!({ "messages": messages }))
}

/// `chat.clear` — delete the workspace conversation.
///
/// Params: { workspace }. Returns the number of messages removed.
pub async fn clear(params: Value, ctx: &AppContext) -> Result<Value> {
    let workspace = params["workspace"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing workspace"))?;

    let removed = ctx.chat.clear(workspace).await?;
    Ok(json!({ "cleared": removed }))
}
