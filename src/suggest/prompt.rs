// SPDX-License-Identifier: MIT
// Prompt assembly for inline suggestions.
//
// A request is framed the way a pair-programmer would be briefed: file name,
// language, the style conventions observed in the file, a window of
// surrounding code, and strict single-line output instructions.

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//(.*)$").unwrap());
static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static HASH_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)#(.*)$").unwrap());
static HTML_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--(.*?)-->").unwrap());
static STAR_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\*+\s?").unwrap());
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static COMMENT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(//|/\*|\*|#|<!--)").unwrap());

static SEMI_EOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m);\s*$").unwrap());
static SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'[^'\\\n]*(?:\\.[^'\\\n]*)*'").unwrap());
static DOUBLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"\\\n]*(?:\\.[^"\\\n]*)*""#).unwrap());
static TAB_INDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\t+").unwrap());
static SPACE_INDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^ +").unwrap());

// ─── Source line selection ────────────────────────────────────────────────────

/// Pick the line a suggestion is based on.
///
/// The cursor line is the source line. A blank cursor line (other than the
/// first) falls back to the line above and flips into *next-line* mode —
/// the engine predicts a fresh line instead of completing one. Returns
/// `None` when the source is still blank.
pub fn select_source_line(lines: &[&str], cursor_line: usize) -> Option<(usize, bool)> {
    let line = *lines.get(cursor_line)?;
    if !line.trim().is_empty() {
        return Some((cursor_line, false));
    }
    if cursor_line == 0 {
        return None;
    }
    let above = lines[cursor_line - 1];
    if above.trim().is_empty() {
        None
    } else {
        Some((cursor_line - 1, true))
    }
}

/// Lines `[center - radius, center + radius]` clamped to the file, joined
/// with trailing newlines.
pub fn context_window(lines: &[&str], center: usize, radius: usize) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let start = center.saturating_sub(radius);
    let end = (center + radius).min(lines.len() - 1);
    let mut out = String::new();
    for line in &lines[start..=end] {
        out.push_str(line);
        out.push('\n');
    }
    out
}

// ─── Comment handling ─────────────────────────────────────────────────────────

/// True if the line opens with a comment marker (`//`, `/*`, `*`, `#`, `<!--`).
pub fn is_comment_line(line: &str) -> bool {
    COMMENT_LINE.is_match(line)
}

/// Remove comment markers while keeping the commented text itself.
///
/// `// load the user` becomes ` load the user`; `/* ... */` blocks vanish;
/// `# note` keeps `note`; `<!-- hint -->` keeps ` hint `. Blank-line runs
/// left behind are collapsed and the result is trimmed.
pub fn strip_comment_markers(code: &str) -> String {
    let s = BLOCK_COMMENT.replace_all(code, "");
    let s = HTML_COMMENT.replace_all(&s, "$1");
    let s = LINE_COMMENT.replace_all(&s, "$1");
    let s = HASH_COMMENT.replace_all(&s, "$1");
    let s = STAR_PREFIX.replace_all(&s, "");
    let s = s.replace("<!--", "").replace("-->", "");
    let s = BLANK_RUN.replace_all(&s, "\n");
    s.trim().to_string()
}

// ─── Style hints ──────────────────────────────────────────────────────────────

/// Derive JS/TS style hints from the file text: semicolon usage, quote
/// preference, and indentation. Other languages get no hints.
pub fn style_hints(text: &str, language: &str) -> Option<String> {
    if !matches!(
        language,
        "javascript" | "typescript" | "javascriptreact" | "typescriptreact"
    ) {
        return None;
    }

    let line_count = text.lines().count();
    let semicolon_lines = SEMI_EOL.find_iter(text).count();
    // More than 10% of lines ending in ';' counts as a semicolon file.
    let uses_semicolons = semicolon_lines as f64 > line_count as f64 * 0.1;

    let single = SINGLE_QUOTED.find_iter(text).count();
    let double = DOUBLE_QUOTED.find_iter(text).count();
    let prefers_single = single >= double;

    let tabs = TAB_INDENT.find_iter(text).count();
    let space_runs: Vec<usize> = SPACE_INDENT
        .find_iter(text)
        .map(|m| m.as_str().len())
        .collect();
    let indent = if tabs > space_runs.len() {
        "use tabs"
    } else {
        let (mut two, mut four) = (0u32, 0u32);
        for n in space_runs.iter().filter(|n| **n >= 2) {
            if n % 4 == 0 {
                four += 1;
            } else if n % 2 == 0 {
                two += 1;
            }
        }
        if four >= two {
            "use 4-space indent"
        } else {
            "use 2-space indent"
        }
    };

    Some(format!(
        "{}; {}; {}",
        if uses_semicolons {
            "use semicolons"
        } else {
            "no semicolons"
        },
        if prefers_single {
            "prefer single quotes"
        } else {
            "prefer double quotes"
        },
        indent
    ))
}

/// Per-language heuristic notes appended to the instructions.
pub fn language_notes(language: &str) -> Option<&'static str> {
    match language {
        "python" => Some("Avoid inserting closing parentheses, colons, or next-line indentation."),
        "javascript" | "typescript" | "javascriptreact" | "typescriptreact" => {
            Some("Match the file's quote and semicolon style.")
        }
        "html" => Some(
            "For HTML/XML contexts: produce a complete, syntactically valid element or a \
             closing tag when appropriate. Never output a bare attribute. When starting a \
             new line, begin with '<' or '</'.",
        ),
        _ => None,
    }
}

// ─── Prompt builders ──────────────────────────────────────────────────────────

/// Build the inline suggestion prompt.
///
/// `typed` is the comment-stripped text of the source line; ignored in
/// next-line mode, where the instructions ask for a fresh line instead.
pub fn build_suggest_prompt(
    file_name: &str,
    language: &str,
    hints: Option<&str>,
    context: &str,
    typed: &str,
    next_line: bool,
) -> String {
    let mut prompt = format!(
        "File: {file_name}\nLanguage: {language}\nFollow {language} best practices and syntax.\n"
    );
    if let Some(h) = hints {
        prompt.push_str(&format!("Coding style hints: {h}\n"));
    }
    if let Some(n) = language_notes(language) {
        prompt.push_str(n);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Here is the surrounding code context:\n{context}\n\n"
    ));
    if next_line {
        prompt.push_str(
            "The user just pressed Enter and is starting a new line.\n\
             Suggest ONLY the next single line of code that should appear here.\n",
        );
    } else {
        prompt.push_str(&format!(
            "The user is currently typing this line: \"{typed}\".\nComplete ONLY this line.\n"
        ));
    }
    prompt.push_str(
        "Return a SINGLE LINE completion only.\n\
         Do NOT add new lines.\n\
         Do NOT return multiple statements.\n\
         Do NOT repeat any existing text from the current line.\n\
         Do NOT add braces, semicolons, or syntax that already exists later in the file.\n\
         Return ONLY the continuation text without explanations, markdown, or code fences.",
    );
    prompt
}

/// Build the comment-to-code prompt: the whole file as context plus the
/// comment text (markers already stripped).
pub fn build_comment_prompt(
    file_name: &str,
    language: &str,
    hints: Option<&str>,
    file_text: &str,
    comment: &str,
) -> String {
    let mut prompt = format!("File: {file_name}\nLanguage: {language}\n");
    if let Some(h) = hints {
        prompt.push_str(&format!("Coding style hints: {h}\n"));
    }
    // HTML gets no note here — the new-line markup rule does not apply.
    if let Some(n) = language_notes(language).filter(|_| language != "html") {
        prompt.push_str(n);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Here is the surrounding code context:\n{file_text}\n\n"
    ));
    prompt.push_str(&format!(
        "The user is currently typing this line: \"{comment}\".\n"
    ));
    prompt.push_str(
        "Return a SINGLE LINE continuation only. Do NOT add new lines or multiple \
         statements. Do NOT repeat existing text from the line. Do NOT add braces, \
         semicolons, or syntax that already exists later in the file. Return ONLY the \
         continuation text without explanations.",
    );
    prompt
}

/// Detect an editor-style language id from a file extension.
pub fn detect_language(file_path: &str) -> &'static str {
    let ext = std::path::Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match ext {
        "rs" => "rust",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "py" | "pyw" => "python",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "swift" => "swift",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "html" | "htm" => "html",
        "css" | "scss" | "sass" | "less" => "css",
        "sql" => "sql",
        "sh" | "bash" | "zsh" => "shellscript",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" | "jsonc" => "json",
        "md" | "mdx" => "markdown",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => "plaintext",
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_line_same_line_mode() {
        let lines = vec!["fn main() {", "    let x = 1;"];
        assert_eq!(select_source_line(&lines, 1), Some((1, false)));
    }

    #[test]
    fn source_line_falls_back_above_blank() {
        let lines = vec!["let total = 0;", ""];
        assert_eq!(select_source_line(&lines, 1), Some((0, true)));
    }

    #[test]
    fn source_line_blank_run_yields_none() {
        let lines = vec!["", "  "];
        assert_eq!(select_source_line(&lines, 1), None);
        assert_eq!(select_source_line(&lines, 0), None);
        assert_eq!(select_source_line(&lines, 5), None);
    }

    #[test]
    fn context_window_clamps_to_file() {
        let lines = vec!["a", "b", "c", "d"];
        assert_eq!(context_window(&lines, 0, 1), "a\nb\n");
        assert_eq!(context_window(&lines, 3, 2), "b\nc\nd\n");
        assert_eq!(context_window(&lines, 1, 100), "a\nb\nc\nd\n");
    }

    #[test]
    fn comment_markers_keep_the_text() {
        assert_eq!(strip_comment_markers("// load the user"), "load the user");
        assert_eq!(strip_comment_markers("# count rows"), "count rows");
        assert_eq!(strip_comment_markers("<!-- header -->"), "header");
        assert_eq!(strip_comment_markers("x = 1 /* temp */"), "x = 1");
        assert_eq!(strip_comment_markers("* bullet note"), "bullet note");
    }

    #[test]
    fn comment_line_detection() {
        assert!(is_comment_line("  // todo"));
        assert!(is_comment_line("# py comment"));
        assert!(is_comment_line("   * doc continuation"));
        assert!(is_comment_line("<!-- html -->"));
        assert!(!is_comment_line("let x = 1; // trailing"));
    }

    #[test]
    fn style_hints_only_for_js_ts() {
        assert!(style_hints("x = 1", "python").is_none());
        assert!(style_hints("const a = 1;", "typescript").is_some());
    }

    #[test]
    fn style_hints_detect_semicolons_and_quotes() {
        let text = "const a = 'x';\nconst b = 'y';\nconst c = 'z';\n";
        let hints = style_hints(text, "javascript").unwrap();
        assert!(hints.contains("use semicolons"));
        assert!(hints.contains("prefer single quotes"));
    }

    #[test]
    fn style_hints_detect_two_space_indent() {
        let text = "function f() {\n  return \"a\"\n}\nfunction g() {\n  return \"b\"\n}\n";
        let hints = style_hints(text, "javascript").unwrap();
        assert!(hints.contains("no semicolons"));
        assert!(hints.contains("prefer double quotes"));
        assert!(hints.contains("2-space indent"));
    }

    #[test]
    fn suggest_prompt_same_line_carries_typed_text() {
        let p = build_suggest_prompt("app.ts", "typescript", None, "const a = 1\n", "const a =", false);
        assert!(p.contains("File: app.ts"));
        assert!(p.contains("currently typing this line: \"const a =\""));
        assert!(p.contains("Return a SINGLE LINE completion only."));
    }

    #[test]
    fn suggest_prompt_next_line_mode() {
        let p = build_suggest_prompt("app.py", "python", None, "x = 1\n", "", true);
        assert!(p.contains("just pressed Enter"));
        assert!(p.contains("closing parentheses"));
        assert!(!p.contains("currently typing"));
    }

    #[test]
    fn comment_prompt_skips_html_note() {
        let p = build_comment_prompt("index.html", "html", None, "<div>\n", "navigation bar");
        assert!(p.contains("navigation bar"));
        assert!(!p.contains("bare attribute"));
    }

    #[test]
    fn detect_language_coverage() {
        assert_eq!(detect_language("main.rs"), "rust");
        assert_eq!(detect_language("App.tsx"), "typescriptreact");
        assert_eq!(detect_language("script.py"), "python");
        assert_eq!(detect_language("index.html"), "html");
        assert_eq!(detect_language("unknown.xyz"), "plaintext");
    }
}
