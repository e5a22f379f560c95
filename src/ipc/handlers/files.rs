// SPDX-License-Identifier: MIT
//
// files.write RPC handler: parse [writeFile]/[file] blocks out of an
// assistant message and write each file through the review manager.

use crate::fileset;
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

/// `files.write` — materialize the file blocks of an AI reply.
///
/// Params: { workspace, message }. Every parsed file is backed up and
/// written under the workspace root via the review manager, then left
/// pending for accept/reject.
///
/// Returns `{ "filesCreated": n, "files": [{ "path", "existed" }] }`.
/// A message with no parseable blocks is not an error (`filesCreated: 0`);
/// the client shows its own warning. A block whose path escapes the
/// workspace fails the whole call before any file is touched.
pub async fn write(params: Value, ctx: &AppContext) -> Result<Value> {
    #[derive(serde::Deserialize)]
    struct Params {
        workspace: String,
        message: String,
    }

    let p: Params = serde_json::from_value(params)?;
    let root = Path::new(&p.workspace);

    let parsed = fileset::parse_file_blocks(&p.message);

    // Validate every path up front: one bad block must not leave the
    // earlier blocks applied and pending.
    let mut rels = Vec::with_capacity(parsed.len());
    for file in &parsed {
        rels.push(fileset::sanitize_rel_path(&file.path)?);
    }

    let mut files = Vec::with_capacity(parsed.len());
    for (file, rel) in parsed.iter().zip(&rels) {
        let existed = ctx.review.open(&root.join(rel), &file.content).await?;
        files.push(json!({ "path": rel, "existed": existed }));
    }

    info!(workspace = %p.workspace, files = files.len(), "files.write applied");
    Ok(json!({ "filesCreated": files.len(), "files": files }))
}
