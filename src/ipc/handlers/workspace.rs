// SPDX-License-Identifier: MIT
//
// workspace.sample RPC handler: build the "teach the AI this codebase"
// context document for a workspace root.

use crate::sampler;
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};
use std::path::Path;

/// `workspace.sample` — sample a workspace into one prompt-sized document.
///
/// Params: { root }. Returns `{ content, files, folders, truncated }`.
/// Consent is the caller's concern; the daemon samples whatever root the
/// client names.
pub async fn sample(params: Value, ctx: &AppContext) -> Result<Value> {
    let root = params["root"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing root"))?;

    let report = sampler::sample_workspace(Path::new(root), &ctx.config.sampler).await?;
    Ok(json!(report))
}
