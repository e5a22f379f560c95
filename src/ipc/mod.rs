pub mod auth;
pub mod event;
pub mod handlers;

use crate::AppContext;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ─── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

// ─── Error codes — shared with the editor extensions' RPC client ─────────────
//
// unauthorized        = -32004
// reviewNotFound      = -32010  (no pending review for the path)
// invalidPath         = -32011  (path empty or escapes the workspace)
// upstreamUnavailable = -32012  (Vibe backend unreachable — chat surfaces it)

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
const UNAUTHORIZED: i32 = -32004;
const REVIEW_NOT_FOUND: i32 = -32010;
const INVALID_PATH: i32 = -32011;
const UPSTREAM_UNAVAILABLE: i32 = -32012;

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("127.0.0.1:{}", ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "IPC server listening (WebSocket + HTTP health on same port)");

    // Broadcast daemon.ready to anyone who subscribes after connect
    ctx.broadcaster.broadcast(
        "daemon.ready",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "port": ctx.config.port
        }),
    );

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    // Pinned so we can use it in the select! loop without moving.
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping IPC server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("IPC server stopped");
    Ok(())
}

/// Respond to an HTTP `GET /health` request with a JSON status document.
///
/// The daemon shares port 13110 for both WebSocket (JSON-RPC) and a plain
/// HTTP health endpoint so clients can check liveness without a WS library.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request (we don't inspect it — any GET /health is fine).
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let uptime_secs = ctx.started_at.elapsed().as_secs();
    let pending = ctx.review.pending_count().await;
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime_secs,
        "pendingReviews": pending,
        "port": ctx.config.port,
    });
    let body_str = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish HTTP health checks from WebSocket upgrades.
    // Both share the same port. An HTTP GET starts with "GET "; WS upgrade also starts
    // with "GET " but has an "Upgrade: websocket" header — we detect health checks by
    // looking for paths that don't have WebSocket headers.
    //
    // Simpler approach: peek for "GET /health" specifically. All other GET requests
    // (including WebSocket upgrades) fall through to the WS handshake as normal.
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    // ── Auth challenge ───────────────────────────────────────────────────────
    // The first message from every client must be a `daemon.auth` RPC call
    // carrying the correct token.  This prevents other local processes from
    // connecting to the daemon and issuing arbitrary RPC commands.
    //
    // Token is stored at {data_dir}/auth_token with mode 0600.  Editor
    // extensions read this file and send it here on every connect.
    if !ctx.auth_token.is_empty() {
        let first = tokio::time::timeout(std::time::Duration::from_secs(10), stream.next()).await;

        let text = match first {
            Ok(Some(Ok(Message::Text(t)))) => t,
            // Timeout, connection closed, or non-text frame — reject silently.
            _ => return Ok(()),
        };

        // Parse the RPC request
        let req: RpcRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(_) => {
                let _ = sink
                    .send(Message::Text(error_response(
                        Value::Null,
                        PARSE_ERROR,
                        "Parse error",
                    )))
                    .await;
                return Ok(());
            }
        };

        let id = req.id.clone().unwrap_or(Value::Null);

        if req.method != "daemon.auth" {
            let _ = sink
                .send(Message::Text(error_response(
                    id,
                    UNAUTHORIZED,
                    "Unauthorized — send daemon.auth first",
                )))
                .await;
            return Ok(());
        }

        let provided = req
            .params
            .as_ref()
            .and_then(|p| p.get("token"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if provided != ctx.auth_token {
            let _ = sink
                .send(Message::Text(error_response(
                    id,
                    UNAUTHORIZED,
                    "Unauthorized — invalid token",
                )))
                .await;
            return Ok(());
        }

        // Auth success — send the RPC response and continue.
        let resp = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "authenticated": true }
        });
        let _ = sink.send(Message::Text(resp.to_string())).await;
        debug!("client authenticated");
    }

    let mut broadcast_rx = ctx.broadcaster.subscribe();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = dispatch_text(&text, &ctx).await;
                        if let Err(e) = sink.send(Message::Text(response)).await {
                            warn!(err = %e, "send error");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(err = %e, "ws error");
                        break;
                    }
                    _ => {}
                }
            }
            // Outgoing broadcast event
            event = broadcast_rx.recv() => {
                match event {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            warn!(err = %e, "broadcast send error");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "broadcast lagged");
                    }
                }
            }
        }
    }
    Ok(())
}

pub(crate) async fn dispatch_text(text: &str, ctx: &AppContext) -> String {
    // Parse
    let req: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            return error_response(Value::Null, PARSE_ERROR, "Parse error");
        }
    };

    // Validate jsonrpc field
    if req.jsonrpc != "2.0" {
        return error_response(
            req.id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "Invalid Request",
        );
    }

    let id = req.id.unwrap_or(Value::Null);
    let params = req.params.unwrap_or(Value::Null);

    debug!(method = %req.method, "rpc dispatch");

    let result = dispatch(&req.method, params, ctx).await;

    match result {
        Ok(value) => {
            let resp = RpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            };
            serde_json::to_string(&resp).unwrap_or_default()
        }
        Err(e) => {
            // Map specific errors to RPC codes
            let (code, msg) = classify_error(&e, &req.method);
            error_response(id, code, &msg)
        }
    }
}

async fn dispatch(method: &str, params: Value, ctx: &AppContext) -> anyhow::Result<Value> {
    match method {
        // Connections only reach dispatch after the handshake, so a repeat
        // daemon.auth is a no-op.
        "daemon.auth" => Ok(serde_json::json!({ "authenticated": true })),
        "daemon.ping" => handlers::daemon::ping(params, ctx).await,
        "daemon.status" => handlers::daemon::status(params, ctx).await,
        "inline.suggest" => handlers::inline::suggest(params, ctx).await,
        "inline.dismiss" => handlers::inline::dismiss(params, ctx).await,
        "inline.fromComment" => handlers::inline::from_comment(params, ctx).await,
        "chat.send" => handlers::chat::send(params, ctx).await,
        "chat.history" => handlers::chat::history(params, ctx).await,
        "chat.clear" => handlers::chat::clear(params, ctx).await,
        "files.write" => handlers::files::write(params, ctx).await,
        "review.open" => handlers::review::open(params, ctx).await,
        "review.accept" => handlers::review::accept(params, ctx).await,
        "review.reject" => handlers::review::reject(params, ctx).await,
        "review.acceptAll" => handlers::review::accept_all(params, ctx).await,
        "review.list" => handlers::review::list(params, ctx).await,
        "edit.applySelection" => handlers::edit::apply_selection(params, ctx).await,
        "workspace.sample" => handlers::workspace::sample(params, ctx).await,
        "editor.updateContext" => handlers::editor::update_context(params, ctx).await,
        "editor.getContext" => handlers::editor::get_context(params, ctx).await,
        "account.link" => handlers::account::link(params, ctx).await,
        "account.validate" => handlers::account::validate(params, ctx).await,
        "account.get" => handlers::account::get(params, ctx).await,
        _ => Err(anyhow::anyhow!("METHOD_NOT_FOUND:{}", method)),
    }
}

fn classify_error(e: &anyhow::Error, _method: &str) -> (i32, String) {
    let msg = e.to_string();
    if msg.starts_with("METHOD_NOT_FOUND:") {
        return (METHOD_NOT_FOUND, "Method not found".to_string());
    }
    if msg.contains("REVIEW_NOT_FOUND") {
        return (REVIEW_NOT_FOUND, "Review entry not found".to_string());
    }
    if msg.contains("INVALID_PATH") {
        return (INVALID_PATH, msg);
    }
    if msg.contains("UPSTREAM_UNAVAILABLE") {
        return (UPSTREAM_UNAVAILABLE, msg);
    }
    if msg.starts_with("INVALID_PARAMS:") {
        return (INVALID_PARAMS, msg);
    }
    if msg.contains("missing field") || msg.contains("invalid type") {
        return (INVALID_PARAMS, format!("Invalid params: {}", msg));
    }
    error!(err = %e, "internal error");
    (INTERNAL_ERROR, "Internal error".to_string())
}

fn error_response(id: Value, code: i32, message: &str) -> String {
    let resp = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_string(),
        }),
    };
    serde_json::to_string(&resp).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatManager;
    use crate::config::{DaemonConfig, HotConfig};
    use crate::editor::EditorState;
    use crate::ipc::event::EventBroadcaster;
    use crate::review::ReviewManager;
    use crate::storage::Storage;
    use crate::suggest::SuggestEngine;
    use crate::upstream::{HistoryItem, UpstreamApi, UpstreamError};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct EchoUpstream;

    #[async_trait]
    impl UpstreamApi for EchoUpstream {
        async fn suggest(
            &self,
            _user_id: &str,
            _bearer: Option<&str>,
            _message: &str,
        ) -> Result<String, UpstreamError> {
            Ok("suggestion".to_string())
        }

        async fn chat(
            &self,
            _user_id: &str,
            _bearer: Option<&str>,
            message: &str,
            _history: &[HistoryItem],
        ) -> Result<String, UpstreamError> {
            Ok(format!("echo: {message}"))
        }
    }

    async fn test_ctx(dir: &TempDir) -> AppContext {
        let config = Arc::new(DaemonConfig::new(
            Some(0),
            Some(dir.path().to_path_buf()),
            None,
        ));
        let hot = Arc::new(tokio::sync::RwLock::new(HotConfig {
            log_level: "info".to_string(),
            inline_enabled: true,
        }));
        let storage = Arc::new(Storage::new(&config.data_dir).await.unwrap());
        let broadcaster = Arc::new(EventBroadcaster::new());
        let upstream: Arc<dyn UpstreamApi> = Arc::new(EchoUpstream);
        let chat = Arc::new(ChatManager::new(
            storage.clone(),
            upstream.clone(),
            broadcaster.clone(),
            config.upstream.user_id.clone(),
            config.chat.history_limit,
        ));
        let suggest = Arc::new(SuggestEngine::new(
            config.inline.clone(),
            config.upstream.user_id.clone(),
            upstream.clone(),
            hot.clone(),
            broadcaster.clone(),
        ));
        let review = Arc::new(ReviewManager::new(&config.data_dir, broadcaster.clone()));
        AppContext {
            config,
            hot,
            storage,
            broadcaster,
            chat,
            suggest,
            review,
            editor: Arc::new(EditorState::new()),
            auth_token: String::new(),
            started_at: std::time::Instant::now(),
        }
    }

    fn parsed(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap()
    }

    #[tokio::test]
    async fn ping_round_trips() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let raw =
            dispatch_text(r#"{"jsonrpc":"2.0","id":1,"method":"daemon.ping"}"#, &ctx).await;
        let resp = parsed(&raw);
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["pong"], true);
    }

    #[tokio::test]
    async fn status_reports_own_process_memory() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let raw =
            dispatch_text(r#"{"jsonrpc":"2.0","id":2,"method":"daemon.status"}"#, &ctx).await;
        let resp = parsed(&raw);
        // The RSS is this process's own, so it is never zero.
        assert!(resp["result"]["memoryRss"].as_u64().unwrap() > 0);
        assert!(resp["result"]["memoryUsedPercent"].as_f64().unwrap() >= 0.0);
        assert_eq!(resp["result"]["pendingReviews"], 0);
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let resp = parsed(&dispatch_text("{not json", &ctx).await);
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        assert_eq!(resp["id"], Value::Null);
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_invalid_request() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let raw =
            dispatch_text(r#"{"jsonrpc":"1.0","id":7,"method":"daemon.ping"}"#, &ctx).await;
        let resp = parsed(&raw);
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
        assert_eq!(resp["id"], 7);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let raw =
            dispatch_text(r#"{"jsonrpc":"2.0","id":2,"method":"daemon.nope"}"#, &ctx).await;
        let resp = parsed(&raw);
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_params_are_invalid_params() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let raw = dispatch_text(
            r#"{"jsonrpc":"2.0","id":3,"method":"chat.history","params":{}}"#,
            &ctx,
        )
        .await;
        let resp = parsed(&raw);
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn accept_of_unknown_review_maps_to_review_not_found() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let raw = dispatch_text(
            r#"{"jsonrpc":"2.0","id":4,"method":"review.accept","params":{"path":"/no/such/file.rs"}}"#,
            &ctx,
        )
        .await;
        let resp = parsed(&raw);
        assert_eq!(resp["error"]["code"], REVIEW_NOT_FOUND);
    }

    #[tokio::test]
    async fn traversal_path_in_files_write_maps_to_invalid_path() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let msg = "[writeFile][file name=\"../escape.txt\"]x[/file][/writeFile]";
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "files.write",
            "params": { "workspace": dir.path().join("ws"), "message": msg }
        });
        let resp = parsed(&dispatch_text(&req.to_string(), &ctx).await);
        assert_eq!(resp["error"]["code"], INVALID_PATH);
    }

    #[tokio::test]
    async fn files_write_rejects_whole_batch_when_one_path_escapes() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;
        let ws = dir.path().join("ws");

        // Good block first, traversal second: no file may land at all.
        let msg = "[writeFile]\
                   [file name=\"good.txt\"]fine[/file]\
                   [file name=\"../evil.txt\"]bad[/file]\
                   [/writeFile]";
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 15,
            "method": "files.write",
            "params": { "workspace": ws, "message": msg }
        });
        let resp = parsed(&dispatch_text(&req.to_string(), &ctx).await);
        assert_eq!(resp["error"]["code"], INVALID_PATH);
        assert!(!ws.join("good.txt").exists());
        assert!(!dir.path().join("evil.txt").exists());
        assert_eq!(ctx.review.pending_count().await, 0);
    }

    #[tokio::test]
    async fn files_write_leaves_reviews_pending() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;
        let ws = dir.path().join("ws");

        let msg = "[writeFile][file name=\"src/lib.rs\"]pub fn f() {}[/file][/writeFile]";
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 6,
            "method": "files.write",
            "params": { "workspace": ws, "message": msg }
        });
        let resp = parsed(&dispatch_text(&req.to_string(), &ctx).await);
        assert_eq!(resp["result"]["filesCreated"], 1);
        assert_eq!(resp["result"]["files"][0]["existed"], false);
        assert!(ws.join("src/lib.rs").is_file());
        assert_eq!(ctx.review.pending_count().await, 1);
    }

    #[tokio::test]
    async fn repeat_auth_after_handshake_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let raw = dispatch_text(
            r#"{"jsonrpc":"2.0","id":8,"method":"daemon.auth","params":{"token":"whatever"}}"#,
            &ctx,
        )
        .await;
        let resp = parsed(&raw);
        assert_eq!(resp["result"]["authenticated"], true);
    }

    #[tokio::test]
    async fn account_link_then_validate() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir).await;

        let raw = dispatch_text(
            r#"{"jsonrpc":"2.0","id":9,"method":"account.link","params":{"workspace":"/w","userId":"u1"}}"#,
            &ctx,
        )
        .await;
        let link = parsed(&raw);
        let token = link["result"]["token"].as_str().unwrap().to_string();
        assert_eq!(token.len(), 32);

        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 10,
            "method": "account.validate",
            "params": { "workspace": "/w", "token": token }
        });
        let resp = parsed(&dispatch_text(&req.to_string(), &ctx).await);
        assert_eq!(resp["result"]["valid"], true);
    }
}
