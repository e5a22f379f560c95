// SPDX-License-Identifier: MIT

//! Workspace sampling for "teach the AI this codebase".
//!
//! Walks a workspace, picks a few representative files per folder, strips or
//! skeletonizes them, and assembles the result into a single annotated text
//! block under a character budget. The output feeds an AI prompt, not a
//! compiler, so all text processing here is best-effort by construction.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::SamplerConfig;

const MAX_DEPTH: usize = 10;

/// Directory names never descended into. Hidden directories are skipped too.
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "out",
    ".git",
    ".svn",
    ".hg",
    ".next",
    ".nuxt",
    ".expo",
    "vendor",
    "__pycache__",
    ".pytest_cache",
    ".idea",
    ".vscode",
    ".vs",
    "coverage",
    "bin",
    "obj",
    "target",
    "Pods",
    "env",
    "tmp",
    "temp",
];

/// Extensions treated as sampleable text.
const TEXT_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "kt", "swift", "c", "h", "cpp", "hpp",
    "cs", "rb", "php", "scala", "vue", "svelte", "astro", "html", "css", "scss", "json", "yaml",
    "yml", "toml", "md", "txt", "xml", "ini", "sql", "sh", "prisma", "graphql", "ejs", "hbs",
    "pug", "njk",
];

/// Well-known build/config file names. These sort last within a folder but
/// keep their bodies (comments stripped only).
const CONFIG_FILE_NAMES: &[&str] = &[
    "package.json",
    "tsconfig",
    "vite.config",
    "webpack.config",
    "postcss.config",
    "tailwind.config",
    "eslint.config",
    "Cargo.toml",
    "pyproject.toml",
    "go.mod",
];

static PRIORITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(model|schema|entity|types?|interfaces?|dto|config|api|routes?|validation)")
        .unwrap()
});

static BLOCK_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static LINE_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]*//.*$").unwrap());
static HASH_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*#.*$").unwrap());
static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\n").unwrap());

static JS_FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s+\w+\s*\(").unwrap()
});
static ARROW_FN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+\w+\s*=\s*(?:async\s+)?\([^)]*\)\s*=>")
        .unwrap()
});
static GO_FUNC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*func\s+(?:\([^)]*\)\s*)?\w+\s*\(").unwrap());
static RUST_FN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+\w+").unwrap()
});
static BRACED_DECL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?:class|interface|enum)\s+\w+")
        .unwrap()
});
static PY_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:async\s+)?def\s+\w+\s*\(").unwrap());

/// Result of sampling one workspace.
#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    /// Annotated sample text (folder and file headers plus processed code).
    pub content: String,
    /// Workspace-relative paths that made it into `content`.
    pub files: Vec<String>,
    /// Number of folder groups emitted.
    pub folders: usize,
    /// True when the character budget forced anything out.
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum FileClass {
    Priority,
    Normal,
    Config,
}

#[derive(Debug, Clone)]
struct Candidate {
    rel: String,
    code: String,
    class: FileClass,
}

/// Sample `root` on a blocking thread.
pub async fn sample_workspace(root: &Path, cfg: &SamplerConfig) -> Result<SampleReport> {
    let root = root.to_path_buf();
    let cfg = cfg.clone();
    tokio::task::spawn_blocking(move || sample_sync(&root, &cfg))
        .await
        .map_err(|e| anyhow::anyhow!("workspace sample panicked: {e}"))?
}

pub fn sample_sync(root: &Path, cfg: &SamplerConfig) -> Result<SampleReport> {
    if !root.is_dir() {
        anyhow::bail!("INVALID_PATH: {} is not a directory", root.display());
    }

    // ── 1. Walk the tree ─────────────────────────────────────────────────────
    let mut paths: Vec<PathBuf> = Vec::new();
    collect_files(root, &mut paths, 0, cfg.max_file_bytes);
    paths.sort();

    // ── 2. Process and bucket by parent directory ────────────────────────────
    let mut buckets: BTreeMap<PathBuf, Vec<Candidate>> = BTreeMap::new();
    for path in paths {
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        let class = if PRIORITY_RE.is_match(&rel) {
            FileClass::Priority
        } else if is_config_file(name) {
            FileClass::Config
        } else {
            FileClass::Normal
        };
        // Priority and config files keep their bodies; the rest shrink to
        // declarations only.
        let code = match class {
            FileClass::Priority | FileClass::Config => strip_comments(&raw),
            FileClass::Normal => skeletonize(&raw),
        };
        if code.is_empty() {
            continue;
        }

        let parent = path.parent().unwrap_or(root).to_path_buf();
        buckets.entry(parent).or_default().push(Candidate { rel, code, class });
    }

    // ── 3. Select per folder: priority first, then normal, then config ──────
    let mut selected: Vec<Candidate> = Vec::new();
    for bucket in buckets.into_values() {
        let mut slots = cfg.max_files_per_folder;
        for class in [FileClass::Priority, FileClass::Normal, FileClass::Config] {
            for cand in bucket.iter().filter(|c| c.class == class) {
                if slots == 0 {
                    break;
                }
                selected.push(cand.clone());
                slots -= 1;
            }
        }
    }

    // ── 4. Group under display folders ───────────────────────────────────────
    let mut grouped: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
    for cand in selected {
        grouped
            .entry(display_folder(&cand.rel))
            .or_default()
            .push(cand);
    }

    // ── 5. Assemble under the character budget ───────────────────────────────
    let mut content = String::new();
    let mut files: Vec<String> = Vec::new();
    let mut folders = 0usize;
    let mut truncated = false;
    let mut total = 0usize;
    for (folder, group) in &grouped {
        let header = format!("\n\n// ===== Folder: {folder} =====\n");
        if total + header.len() > cfg.target_chars {
            truncated = true;
            tracing::debug!(folder = %folder, "sample budget reached, skipping folder");
            continue;
        }
        content.push_str(&header);
        total += header.len();
        folders += 1;
        for cand in group {
            let snippet = format!("// File: {}\n{}\n\n", cand.rel, cand.code);
            if total + snippet.len() > cfg.target_chars {
                truncated = true;
                tracing::debug!(file = %cand.rel, "sample budget reached, skipping file");
                continue;
            }
            content.push_str(&snippet);
            total += snippet.len();
            files.push(cand.rel.clone());
        }
    }

    tracing::info!(
        files = files.len(),
        folders,
        chars = total,
        truncated,
        "workspace sampled"
    );
    Ok(SampleReport {
        content,
        files,
        folders,
        truncated,
    })
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>, depth: usize, max_file_bytes: u64) {
    if depth > MAX_DEPTH {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_dir() {
            if name.starts_with('.') || EXCLUDED_DIRS.contains(&name) {
                continue;
            }
            collect_files(&path, out, depth + 1, max_file_bytes);
            continue;
        }
        if is_sensitive(name) {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !TEXT_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)) {
            continue;
        }
        if entry.metadata().map(|m| m.len() > max_file_bytes).unwrap_or(true) {
            continue;
        }
        out.push(path);
    }
}

fn is_sensitive(name: &str) -> bool {
    let lower = name.to_lowercase();
    if lower == ".env" || lower.starts_with(".env.") || lower == ".envrc" {
        return true;
    }
    lower.ends_with(".key")
        || lower.ends_with(".pem")
        || lower.ends_with(".lock")
        || lower.ends_with(".log")
        || lower.ends_with(".min.js")
}

fn is_config_file(name: &str) -> bool {
    CONFIG_FILE_NAMES.iter().any(|p| name.contains(p))
}

/// Display folder for grouping: first path segment under `src/`, else
/// `(root)`. A file sitting directly in `src/` groups under its own name,
/// which keeps one header per file there.
fn display_folder(rel: &str) -> String {
    let under_src = if let Some(idx) = rel.find("/src/") {
        Some(&rel[idx + 5..])
    } else {
        rel.strip_prefix("src/")
    };
    match under_src {
        Some(rest) => match rest.split('/').next() {
            Some(seg) if !seg.is_empty() => format!("src/{seg}"),
            _ => "(root)".to_string(),
        },
        None => "(root)".to_string(),
    }
}

// ─── Text processing ─────────────────────────────────────────────────────────

/// Remove `/* */` blocks, `//` line comments, full-line `#` comments, and
/// blank lines. Not string-literal aware; a `//` inside a string goes too.
pub fn strip_comments(source: &str) -> String {
    let text = BLOCK_COMMENT_RE.replace_all(source, "");
    let text = LINE_COMMENT_RE.replace_all(&text, "");
    let text = HASH_LINE_RE.replace_all(&text, "");
    let text = BLANK_LINE_RE.replace_all(&text, "");
    text.trim().to_string()
}

/// Collapse function, class, interface, and enum bodies to their declaration
/// lines, keeping everything else. Comments are stripped first.
///
/// Brace-delimited bodies are tracked by counting braces from the head line;
/// Python bodies by indentation. Heads whose opening brace sits on a later
/// line are left intact.
pub fn skeletonize(source: &str) -> String {
    let text = {
        let t = BLOCK_COMMENT_RE.replace_all(source, "");
        let t = LINE_COMMENT_RE.replace_all(&t, "");
        HASH_LINE_RE.replace_all(&t, "").to_string()
    };

    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if PY_DEF_RE.is_match(line) && line.trim_end().ends_with(':') {
            let indent = leading_ws(line);
            out.push(format!("{} ...", line.trim_end()));
            i += 1;
            while i < lines.len() {
                let body = lines[i];
                if body.trim().is_empty() || leading_ws(body) > indent {
                    i += 1;
                } else {
                    break;
                }
            }
            continue;
        }

        if let Some(tail) = braced_head_tail(line) {
            if let Some(brace) = line.find('{') {
                let head = line[..brace].trim_end();
                out.push(format!("{head}{tail}"));
                let mut depth = brace_delta(&line[brace..]);
                i += 1;
                while depth > 0 && i < lines.len() {
                    depth += brace_delta(lines[i]);
                    i += 1;
                }
                continue;
            }
        }

        if !line.trim().is_empty() {
            out.push(line.trim_end().to_string());
        }
        i += 1;
    }
    out.join("\n")
}

/// Replacement tail for a collapsible head line, or `None` to keep the line.
fn braced_head_tail(line: &str) -> Option<&'static str> {
    if JS_FUNCTION_RE.is_match(line) {
        Some(";")
    } else if ARROW_FN_RE.is_match(line) {
        Some(" { ... };")
    } else if GO_FUNC_RE.is_match(line) || RUST_FN_RE.is_match(line) || BRACED_DECL_RE.is_match(line)
    {
        Some(" { ... }")
    } else {
        None
    }
}

fn brace_delta(text: &str) -> i32 {
    let mut delta = 0;
    for c in text.chars() {
        match c {
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn leading_ws(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn strip_comments_removes_all_comment_forms() {
        let src = "/* block */\nlet a = 1; // tail\n# full line\n\nlet b = 2;\n";
        assert_eq!(strip_comments(src), "let a = 1;\nlet b = 2;");
    }

    #[test]
    fn skeletonize_collapses_js_function_bodies() {
        let src = "function add(a, b) {\n  const sum = a + b;\n  return sum;\n}\nconst x = 1;\n";
        let out = skeletonize(src);
        assert_eq!(out, "function add(a, b);\nconst x = 1;");
    }

    #[test]
    fn skeletonize_collapses_nested_braces_fully() {
        let src = "fn run(cfg: &Config) -> Result<()> {\n    if cfg.on {\n        go();\n    }\n    Ok(())\n}\nstatic N: u32 = 1;\n";
        let out = skeletonize(src);
        assert_eq!(out, "fn run(cfg: &Config) -> Result<()> { ... }\nstatic N: u32 = 1;");
    }

    #[test]
    fn skeletonize_collapses_arrow_and_interface() {
        let src = "interface User {\n  id: string;\n}\nconst load = async (id) => {\n  return fetch(id);\n};\n";
        let out = skeletonize(src);
        assert!(out.contains("interface User { ... }"));
        assert!(out.contains("const load = async (id) => { ... };"));
        assert!(!out.contains("fetch"));
    }

    #[test]
    fn skeletonize_collapses_python_def_by_indent() {
        let src = "import os\n\ndef main(argv):\n    run()\n    return 0\n\nVERSION = \"1\"\n";
        let out = skeletonize(src);
        assert_eq!(out, "import os\ndef main(argv): ...\nVERSION = \"1\"");
    }

    #[test]
    fn sample_prefers_priority_files_and_limits_per_folder() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/web/routes.ts", "export const r = 1;\n");
        write(dir.path(), "src/web/a.ts", "const a = 1;\n");
        write(dir.path(), "src/web/b.ts", "const b = 1;\n");
        write(dir.path(), "src/web/c.ts", "const c = 1;\n");

        let report = sample_sync(dir.path(), &SamplerConfig::default()).unwrap();
        // routes.ts matches the priority pattern; one normal file fills the
        // second slot.
        assert!(report.files.contains(&"src/web/routes.ts".to_string()));
        assert_eq!(report.files.len(), 2);
        assert!(report.content.contains("// ===== Folder: src/web ====="));
        assert!(report.content.contains("// File: src/web/routes.ts"));
    }

    #[test]
    fn sample_skips_excluded_and_sensitive() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/app/main.ts", "const ok = 1;\n");
        write(dir.path(), "node_modules/pkg/index.js", "nope\n");
        write(dir.path(), "src/app/.env", "SECRET=1\n");
        write(dir.path(), "src/app/server.key", "nope\n");

        let report = sample_sync(dir.path(), &SamplerConfig::default()).unwrap();
        assert_eq!(report.files, vec!["src/app/main.ts".to_string()]);
        assert!(!report.content.contains("nope"));
        assert!(!report.content.contains("SECRET"));
    }

    #[test]
    fn sample_respects_character_budget() {
        let dir = TempDir::new().unwrap();
        // Priority names keep bodies, so sizes are predictable.
        write(
            dir.path(),
            "src/one/types.ts",
            &format!("const pad = \"{}\";\n", "x".repeat(400)),
        );
        write(
            dir.path(),
            "src/two/types.ts",
            &format!("const pad = \"{}\";\n", "y".repeat(400)),
        );

        let cfg = SamplerConfig {
            target_chars: 500,
            ..SamplerConfig::default()
        };
        let report = sample_sync(dir.path(), &cfg).unwrap();
        assert!(report.truncated);
        assert_eq!(report.files.len(), 1);
        assert!(report.content.len() <= 500);
    }

    #[test]
    fn sample_rejects_missing_root() {
        let err = sample_sync(Path::new("/nonexistent-vicod-root"), &SamplerConfig::default())
            .unwrap_err();
        assert!(err.to_string().starts_with("INVALID_PATH:"));
    }

    #[test]
    fn files_outside_src_group_under_root() {
        assert_eq!(display_folder("README.md"), "(root)");
        assert_eq!(display_folder("src/auth/token.ts"), "src/auth");
        assert_eq!(display_folder("packages/core/src/db/pool.ts"), "src/db");
        assert_eq!(display_folder("src/main.ts"), "src/main.ts");
    }
}
