// SPDX-License-Identifier: MIT
//
// review.* RPC handlers. The manager applies changes immediately and
// keeps backups; these endpoints drive the accept/reject lifecycle.

use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};
use std::path::Path;

/// review.open — back up a file and write AI-generated contents to it.
///
/// Params: { path, contents }. `path` is absolute — clients resolve
/// against their workspace root (`files.write` does it server-side).
pub async fn open(params: Value, ctx: &AppContext) -> Result<Value> {
    let path = params["path"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing path"))?;
    let contents = params["contents"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing contents"))?;

    let existed = ctx.review.open(Path::new(path), contents).await?;
    Ok(json!({ "path": path, "existed": existed }))
}

/// review.accept — keep the applied change and drop its backup.
///
/// Params: { path }. Accepts either the live path or the backup path,
/// so a client holding only the diff view's backup URI still works.
pub async fn accept(params: Value, ctx: &AppContext) -> Result<Value> {
    let path = params["path"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing path"))?;

    let live = ctx.review.accept(Path::new(path)).await?;
    Ok(json!({ "path": live, "kept": true }))
}

/// review.reject — restore the pre-AI contents, or delete a file the
/// edit created.
///
/// Params: { path }. Live or backup path, as with accept.
pub async fn reject(params: Value, ctx: &AppContext) -> Result<Value> {
    let path = params["path"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing path"))?;

    let live = ctx.review.reject(Path::new(path)).await?;
    Ok(json!({ "path": live, "kept": false }))
}

/// review.acceptAll — keep every pending change.
///
/// Backup-deletion failures are logged and counted, never fatal.
pub async fn accept_all(_params: Value, ctx: &AppContext) -> Result<Value> {
    let (accepted, failed) = ctx.review.accept_all().await;
    Ok(json!({ "accepted": accepted, "failed": failed }))
}

/// review.list — pending entries, sorted by path.
pub async fn list(_params: Value, ctx: &AppContext) -> Result<Value> {
    let reviews = ctx.review.list().await;
    let pending = reviews.len();
    Ok(json!({ "reviews": reviews, "pending": pending }))
}
