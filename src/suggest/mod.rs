// SPDX-License-Identifier: MIT
// Inline suggestion engine — debounce, supersession, cache, post-processing.
//
// Each request is stamped with a sequence number. The engine sleeps out the
// debounce window, consults the LRU cache, and only then pays for an
// upstream round-trip. A request that is no longer the newest resolves
// empty at every checkpoint, so a fast typist never sees stale ghost text.

pub mod cache;
pub mod prompt;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{HotConfig, InlineConfig};
use crate::ipc::event::EventBroadcaster;
use crate::upstream::UpstreamApi;

use cache::{CacheEntry, SuggestCache};

const CACHE_CAPACITY: usize = 256;

// ─── Request / Response types ─────────────────────────────────────────────────

/// Input parameters for an inline suggestion request.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestRequest {
    /// Path of the file being edited (language detection, prompt header).
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// Editor language id; derived from the file extension when absent.
    #[serde(default)]
    pub language: Option<String>,
    /// 0-based line number of the cursor.
    #[serde(rename = "cursorLine", default)]
    pub cursor_line: usize,
    /// 0-based column of the cursor. Accepted on the wire; suggestions are
    /// keyed off the full line prefix, so the column itself is unused.
    #[serde(rename = "cursorCol", default)]
    pub cursor_col: usize,
    /// Full file content at request time.
    #[serde(rename = "fileContent")]
    pub file_content: String,
}

/// Input parameters for comment-to-code generation.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentRequest {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(default)]
    pub language: Option<String>,
    /// 0-based line holding the comment to implement.
    #[serde(rename = "commentLine", default)]
    pub comment_line: usize,
    #[serde(rename = "fileContent")]
    pub file_content: String,
}

/// Result returned to the caller and broadcast as `inline.suggestion`.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestResponse {
    /// Ghost text to render; empty means nothing to show.
    pub text: String,
    /// 0-based line the suggestion belongs to (the cursor line at request time).
    pub line: usize,
    /// Typed prefix the suggestion is valid against. Clients drop the
    /// suggestion once the cursor leaves the line or the prefix changes.
    #[serde(rename = "linePrefix")]
    pub line_prefix: String,
    /// Where it came from: "upstream" | "cache" | "none".
    pub source: String,
}

impl SuggestResponse {
    fn none(line: usize) -> Self {
        Self {
            text: String::new(),
            line,
            line_prefix: String::new(),
            source: "none".to_string(),
        }
    }
}

/// The suggestion most recently handed to clients, kept for re-validation.
#[derive(Debug, Clone)]
pub struct LastSuggestion {
    pub text: String,
    pub line: usize,
    pub line_prefix: String,
}

// ─── Engine ───────────────────────────────────────────────────────────────────

pub struct SuggestEngine {
    cfg: InlineConfig,
    /// Default upstream user id for workspaces without a linked account.
    user_id: String,
    upstream: Arc<dyn UpstreamApi>,
    hot: Arc<RwLock<HotConfig>>,
    broadcaster: Arc<EventBroadcaster>,
    /// Monotonic request stamp; only the holder of the latest stamp may
    /// publish a suggestion.
    seq: AtomicU64,
    cache: Mutex<SuggestCache>,
    last: Mutex<Option<LastSuggestion>>,
}

impl SuggestEngine {
    pub fn new(
        cfg: InlineConfig,
        user_id: String,
        upstream: Arc<dyn UpstreamApi>,
        hot: Arc<RwLock<HotConfig>>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            cfg,
            user_id,
            upstream,
            hot,
            broadcaster,
            seq: AtomicU64::new(0),
            cache: Mutex::new(SuggestCache::new(CACHE_CAPACITY)),
            last: Mutex::new(None),
        }
    }

    /// Handle `inline.suggest`. Always resolves; upstream failures and
    /// superseded requests degrade to an empty response, never an error.
    pub async fn suggest(&self, req: SuggestRequest, bearer: Option<&str>) -> SuggestResponse {
        if !self.hot.read().await.inline_enabled {
            self.clear_pending();
            return SuggestResponse::none(req.cursor_line);
        }

        let id = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(std::time::Duration::from_millis(self.cfg.debounce_ms)).await;
        if self.seq.load(Ordering::SeqCst) != id {
            // A newer keystroke arrived while this one was debouncing.
            return SuggestResponse::none(req.cursor_line);
        }

        let lines: Vec<&str> = req.file_content.lines().collect();
        let (source, next_line) = if req.cursor_line >= lines.len() {
            // Cursor on a fresh line past the stored text (Enter at EOF).
            match lines.last() {
                Some(l) if !l.trim().is_empty() => (lines.len() - 1, true),
                _ => return SuggestResponse::none(req.cursor_line),
            }
        } else {
            match prompt::select_source_line(&lines, req.cursor_line) {
                Some(s) => s,
                None => return SuggestResponse::none(req.cursor_line),
            }
        };

        let line_text = lines[source];
        let cleaned = prompt::strip_comment_markers(line_text.trim());
        if !next_line && cleaned.chars().count() < self.cfg.min_line_chars {
            return SuggestResponse::none(req.cursor_line);
        }

        let language = req
            .language
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| prompt::detect_language(&req.file_path).to_string());
        let is_html = language == "html" || req.file_path.to_lowercase().ends_with(".html");
        let radius = if language == "python" || req.file_path.ends_with(".py") {
            self.cfg.python_context_radius
        } else {
            self.cfg.context_radius
        };

        let context = prompt::context_window(&lines, source, radius);
        let cursor_line_text = lines
            .get(req.cursor_line)
            .map(|l| l.to_string())
            .unwrap_or_default();
        let line_prefix = if next_line { String::new() } else { cleaned.clone() };

        let key = SuggestCache::cache_key(line_text, &context);
        let cached = match self.cache.lock() {
            Ok(mut c) => c.get(&key).map(|e| e.text.clone()),
            Err(_) => None,
        };
        if let Some(text) = cached {
            debug!(file = %req.file_path, "suggestion cache hit");
            return self.publish(id, text, req.cursor_line, line_prefix, "cache");
        }

        self.set_status(if next_line {
            "predictingNextLine"
        } else {
            "thinking"
        });

        let file_name = Path::new(&req.file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&req.file_path);
        let hints = prompt::style_hints(&req.file_content, &language);
        let prompt_text = prompt::build_suggest_prompt(
            file_name,
            &language,
            hints.as_deref(),
            &context,
            &cleaned,
            next_line,
        );

        let raw = match self.upstream.suggest(&self.user_id, bearer, &prompt_text).await {
            Ok(r) => r,
            Err(e) => {
                warn!(file = %req.file_path, err = %e, "upstream suggestion failed");
                self.set_status("error");
                return SuggestResponse::none(req.cursor_line);
            }
        };

        if self.seq.load(Ordering::SeqCst) != id {
            // Superseded while the HTTP call was in flight — discard.
            self.set_status("idle");
            return SuggestResponse::none(req.cursor_line);
        }

        let text = self.post_process(&raw, is_html, next_line, &cursor_line_text);
        self.set_status("idle");
        if text.is_empty() {
            return SuggestResponse::none(req.cursor_line);
        }

        if let Ok(mut c) = self.cache.lock() {
            c.insert(
                key,
                CacheEntry {
                    text: text.clone(),
                    created_at: std::time::Instant::now(),
                },
            );
        }

        self.publish(id, text, req.cursor_line, line_prefix, "upstream")
    }

    /// Handle `inline.fromComment`: implement the comment on the given line.
    /// Returns the generated snippet, or an empty string when the line is not
    /// a comment or the upstream call fails.
    pub async fn from_comment(&self, req: CommentRequest, bearer: Option<&str>) -> String {
        if !self.hot.read().await.inline_enabled {
            return String::new();
        }

        let lines: Vec<&str> = req.file_content.lines().collect();
        let Some(line_text) = lines.get(req.comment_line) else {
            return String::new();
        };
        if !prompt::is_comment_line(line_text) {
            return String::new();
        }
        let comment = prompt::strip_comment_markers(line_text);
        if comment.is_empty() {
            return String::new();
        }

        let language = req
            .language
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| prompt::detect_language(&req.file_path).to_string());
        let file_name = Path::new(&req.file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&req.file_path);
        let hints = prompt::style_hints(&req.file_content, &language);
        let prompt_text = prompt::build_comment_prompt(
            file_name,
            &language,
            hints.as_deref(),
            &req.file_content,
            &comment,
        );

        self.set_status("thinking");
        let raw = match self.upstream.suggest(&self.user_id, bearer, &prompt_text).await {
            Ok(r) => r,
            Err(e) => {
                warn!(file = %req.file_path, err = %e, "comment generation failed");
                self.set_status("error");
                return String::new();
            }
        };
        self.set_status("idle");

        let text = strip_code_fences(raw.trim());
        // Drop leading lines that merely echo the comment back.
        let mut out: Vec<&str> = text.lines().collect();
        while let Some(first) = out.first() {
            if prompt::is_comment_line(first) && prompt::strip_comment_markers(first) == comment {
                out.remove(0);
            } else {
                break;
            }
        }
        out.join("\n").trim().to_string()
    }

    /// Handle `inline.dismiss`: forget the live suggestion and tell clients
    /// to clear ghost text.
    pub fn dismiss(&self) {
        self.clear_pending();
        self.set_status("idle");
    }

    /// Forget the live suggestion without emitting a status event. Runs on
    /// dismiss and on the first `suggest` after `inline.enabled` flips off;
    /// the config watcher itself never calls in here.
    pub fn clear_pending(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
    }

    /// The suggestion most recently published, if any.
    pub fn last_suggestion(&self) -> Option<LastSuggestion> {
        self.last.lock().ok().and_then(|l| l.clone())
    }

    /// Record the suggestion and broadcast it — but only if `id` is still the
    /// newest request. Late results are silently dropped.
    fn publish(
        &self,
        id: u64,
        text: String,
        line: usize,
        line_prefix: String,
        source: &str,
    ) -> SuggestResponse {
        if self.seq.load(Ordering::SeqCst) != id || text.is_empty() {
            return SuggestResponse::none(line);
        }
        if let Ok(mut last) = self.last.lock() {
            *last = Some(LastSuggestion {
                text: text.clone(),
                line,
                line_prefix: line_prefix.clone(),
            });
        }
        let resp = SuggestResponse {
            text,
            line,
            line_prefix,
            source: source.to_string(),
        };
        self.broadcaster.broadcast("inline.suggestion", json!(&resp));
        resp
    }

    fn set_status(&self, state: &str) {
        self.broadcaster
            .broadcast("inline.status", json!({ "state": state }));
    }

    /// Clean a raw upstream reply into a single ghost-text line.
    fn post_process(&self, raw: &str, is_html: bool, next_line: bool, cursor_line: &str) -> String {
        let text = strip_code_fences(raw.trim());
        let candidate = text.trim();
        // HTML new-line replies must look like markup, not prose.
        if is_html && next_line && !candidate.is_empty() && !html_candidate_ok(candidate) {
            debug!(candidate, "dropped non-markup HTML suggestion");
            return String::new();
        }
        let stripped = strip_known_prefix(&text, cursor_line);
        normalize_single_line(stripped, self.cfg.max_chars)
    }
}

// ─── Post-processing helpers ──────────────────────────────────────────────────

/// Strip markdown code fences from an upstream reply, if present.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(after_fence) = trimmed.strip_prefix("```") {
        let body = if let Some(nl) = after_fence.find('\n') {
            &after_fence[nl + 1..]
        } else {
            after_fence
        };
        let stripped = if let Some(end) = body.rfind("\n```") {
            &body[..end]
        } else {
            body.strip_suffix("```").unwrap_or(body)
        };
        return stripped.to_string();
    }
    trimmed.to_string()
}

/// A next-line HTML candidate must open a tag and close one.
fn html_candidate_ok(candidate: &str) -> bool {
    candidate.starts_with('<') && candidate.contains('>')
}

/// If the reply repeats the text already on the line, keep only the rest.
fn strip_known_prefix<'a>(candidate: &'a str, line_prefix: &str) -> &'a str {
    if !line_prefix.is_empty() {
        if let Some(rest) = candidate.strip_prefix(line_prefix) {
            return rest;
        }
    }
    candidate
}

/// Flatten to one line and cap the length in characters.
fn normalize_single_line(text: &str, max_chars: usize) -> String {
    let flat: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    flat.chars().take(max_chars).collect()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
