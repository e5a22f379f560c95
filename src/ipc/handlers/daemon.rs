use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn ping(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "pong": true }))
}

/// daemon.status — liveness and workload snapshot.
///
/// Params: { workspace? }. The per-workspace message count is included
/// only when the caller names its workspace.
pub async fn status(params: Value, ctx: &AppContext) -> Result<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let pending_reviews = ctx.review.pending_count().await;
    let subscribers = ctx.broadcaster.subscriber_count();
    let inline_enabled = ctx.hot.read().await.inline_enabled;

    let chat_messages = match params.get("workspace").and_then(Value::as_str) {
        Some(workspace) => Some(ctx.chat.count(workspace).await?),
        None => None,
    };

    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    let memory_used_percent = if total == 0 {
        0.0
    } else {
        (sys.used_memory() as f64 / total as f64) * 100.0
    };

    // RSS of this process, in bytes.
    let pid = sysinfo::Pid::from_u32(std::process::id());
    sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    let memory_rss = sys.process(pid).map(|p| p.memory()).unwrap_or(0);

    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime,
        "port": ctx.config.port,
        "pendingReviews": pending_reviews,
        "subscribers": subscribers,
        "inlineEnabled": inline_enabled,
        "chatMessages": chat_messages,
        "memoryRss": memory_rss,
        "memoryUsedPercent": memory_used_percent
    }))
}
