// SPDX-License-Identifier: MIT
//
// inline.* RPC handlers: ghost-text suggestions, dismissal, and
// comment-to-code generation. The heavy lifting (debounce, supersession,
// cache, prompt assembly) lives in `crate::suggest`.

use crate::suggest::{CommentRequest, SuggestRequest};
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

/// `inline.suggest` — ghost text for the cursor position.
///
/// Parameters (JSON):
/// ```json
/// {
///   "filePath": "src/auth.ts",
///   "language": "typescript",
///   "cursorLine": 10,
///   "fileContent": "full file content",
///   "workspace": "/path/to/workspace"
/// }
/// ```
///
/// Returns:
/// ```json
/// { "text": "...", "line": 10, "linePrefix": "...", "source": "upstream" | "cache" | "none" }
/// ```
///
/// Never fails: upstream trouble and superseded requests degrade to an
/// empty suggestion.
pub async fn suggest(params: Value, ctx: &AppContext) -> Result<Value> {
    let bearer = super::workspace_bearer(&params, ctx).await;
    let req: SuggestRequest = serde_json::from_value(params)?;
    let resp = ctx.suggest.suggest(req, bearer.as_deref()).await;
    Ok(json!(resp))
}

/// `inline.dismiss` — drop the live suggestion and tell clients to clear
/// ghost text.
pub async fn dismiss(_params: Value, ctx: &AppContext) -> Result<Value> {
    ctx.suggest.dismiss();
    Ok(json!({ "dismissed": true }))
}

/// `inline.fromComment` — generate the code a comment line describes.
///
/// Params: { filePath, language?, commentLine, fileContent, workspace? }.
/// Returns `{ "text": "..." }`; empty when the line is not a comment or
/// the upstream produced nothing usable.
pub async fn from_comment(params: Value, ctx: &AppContext) -> Result<Value> {
    let bearer = super::workspace_bearer(&params, ctx).await;
    let req: CommentRequest = serde_json::from_value(params)?;
    let text = ctx.suggest.from_comment(req, bearer.as_deref()).await;
    Ok(json!({ "text": text }))
}
