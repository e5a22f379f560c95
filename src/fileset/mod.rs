// SPDX-License-Identifier: MIT

//! Structured file-block parsing for AI chat replies.
//!
//! Assistants emit generated files as `[writeFile]` regions containing
//! `[file name="path"]...[/file]` blocks; some emit `<file path="...">`
//! XML instead. This module extracts those blocks and normalizes the
//! paths so the write handler can route every file through review.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static WRITE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[writeFile\](.*?)\[/writeFile\]").unwrap());
static WRITE_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[writeFile\](.*)").unwrap());
static FILE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\[file\s+name="([^"]+)"(?:\s+type="[^"]+")?\](.*?)\[/file\]"#).unwrap()
});
static XML_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<file\s+path="([^"]+)">(.*?)</file>"#).unwrap());

/// One file block extracted from an assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    /// Workspace-relative path exactly as the assistant wrote it.
    pub path: String,
    pub content: String,
}

/// Extract every file block from an assistant message.
///
/// All closed `[writeFile]` regions are concatenated first. When none close,
/// everything from the first `[writeFile]` to the end of the message is used;
/// with no opening tag at all, the whole message. The `[file name="..."]`
/// form wins; the XML form is only consulted when it finds nothing, since
/// some assistants use it despite the prompt.
pub fn parse_file_blocks(message: &str) -> Vec<ParsedFile> {
    let mut region = String::new();
    for cap in WRITE_BLOCK_RE.captures_iter(message) {
        region.push_str(&cap[1]);
        region.push('\n');
    }
    if region.trim().is_empty() {
        region = match WRITE_OPEN_RE.captures(message) {
            Some(cap) => cap[1].to_string(),
            None => message.to_string(),
        };
    }

    let mut files = extract(&FILE_BLOCK_RE, &region);
    if files.is_empty() {
        files = extract(&XML_FILE_RE, &region);
    }
    files
}

fn extract(re: &Regex, region: &str) -> Vec<ParsedFile> {
    re.captures_iter(region)
        .map(|cap| ParsedFile {
            path: cap[1].trim().to_string(),
            content: cap[2].trim().to_string(),
        })
        .collect()
}

/// Normalize an assistant-supplied path to a safe workspace-relative one.
///
/// Leading slashes and `./` are stripped. Paths containing `..` or reduced
/// to nothing are rejected before any filesystem contact.
pub fn sanitize_rel_path(raw: &str) -> Result<String> {
    let mut cleaned = raw.trim();
    // Strip to a fixed point: ".//./x" peels down to "x".
    loop {
        let next = cleaned.trim_start_matches('/').trim_start_matches("./");
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    if cleaned.is_empty() {
        return Err(anyhow!("INVALID_PATH: empty file path"));
    }
    if cleaned.contains("..") {
        return Err(anyhow!("INVALID_PATH: {raw} escapes the workspace"));
    }
    Ok(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_block() {
        let msg = "Sure!\n[writeFile]\n[file name=\"src/app.ts\"]\nconst x = 1;\n[/file]\n[/writeFile]\nDone.";
        let files = parse_file_blocks(msg);
        assert_eq!(
            files,
            vec![ParsedFile {
                path: "src/app.ts".into(),
                content: "const x = 1;".into(),
            }]
        );
    }

    #[test]
    fn accumulates_multiple_write_regions() {
        let msg = "[writeFile][file name=\"a.ts\"]a[/file][/writeFile]\n\
                   text between\n\
                   [writeFile][file name=\"b.ts\"]b[/file][/writeFile]";
        let files = parse_file_blocks(msg);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "a.ts");
        assert_eq!(files[1].path, "b.ts");
    }

    #[test]
    fn ignores_type_attribute() {
        let msg = "[writeFile][file name=\"x.py\" type=\"python\"]print(1)[/file][/writeFile]";
        let files = parse_file_blocks(msg);
        assert_eq!(files[0].path, "x.py");
        assert_eq!(files[0].content, "print(1)");
    }

    #[test]
    fn unclosed_write_tag_runs_to_end() {
        let msg = "prose\n[writeFile]\n[file name=\"x.rs\"]\nfn f() {}\n[/file]";
        let files = parse_file_blocks(msg);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "fn f() {}");
    }

    #[test]
    fn whole_message_when_no_write_tag() {
        let msg = "[file name=\"style.css\"]\nbody {}\n[/file]";
        let files = parse_file_blocks(msg);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "style.css");
    }

    #[test]
    fn xml_fallback_when_no_bracket_blocks() {
        let msg = "<file path=\"src/main.go\">\npackage main\n</file>";
        let files = parse_file_blocks(msg);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "src/main.go");
        assert_eq!(files[0].content, "package main");
    }

    #[test]
    fn bracket_blocks_suppress_xml_fallback() {
        let msg = "[file name=\"a.ts\"]a[/file]\n<file path=\"b.ts\">b</file>";
        let files = parse_file_blocks(msg);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "a.ts");
    }

    #[test]
    fn trims_path_and_content() {
        let msg = "[file name=\" src/x.ts \"]\n\n  let a = 1;\n\n[/file]";
        let files = parse_file_blocks(msg);
        assert_eq!(files[0].path, "src/x.ts");
        assert_eq!(files[0].content, "let a = 1;");
    }

    #[test]
    fn no_blocks_is_empty_not_error() {
        assert!(parse_file_blocks("just prose, no files").is_empty());
        assert!(parse_file_blocks("").is_empty());
    }

    #[test]
    fn sanitize_strips_leading_slash_and_dot() {
        assert_eq!(sanitize_rel_path("/src/app.ts").unwrap(), "src/app.ts");
        assert_eq!(sanitize_rel_path("./src/app.ts").unwrap(), "src/app.ts");
        assert_eq!(sanitize_rel_path(".//./src/app.ts").unwrap(), "src/app.ts");
        assert_eq!(sanitize_rel_path("  lib.rs  ").unwrap(), "lib.rs");
    }

    #[test]
    fn sanitize_rejects_traversal_and_empty() {
        assert!(sanitize_rel_path("../etc/passwd").is_err());
        assert!(sanitize_rel_path("src/../../secret").is_err());
        assert!(sanitize_rel_path("").is_err());
        assert!(sanitize_rel_path("///").is_err());
        let err = sanitize_rel_path("../x").unwrap_err();
        assert!(err.to_string().starts_with("INVALID_PATH:"));
    }
}
