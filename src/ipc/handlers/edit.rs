// SPDX-License-Identifier: MIT
//
// edit.applySelection RPC handler: splice an AI-suggested snippet over a
// byte range of a file (or replace the file outright), through the
// review manager so the change stays rejectable.

use crate::fileset;
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};
use std::path::PathBuf;

/// `edit.applySelection` — apply a code selection to a file.
///
/// Params: { workspace?, filePath?, code, startByte?, endByte? }.
///
/// With `workspace`, `filePath` is workspace-relative (leading slashes
/// stripped, `..` rejected); without it, `filePath` is taken as absolute.
/// With no `filePath` at all, the file last reported via
/// `editor.updateContext` is the target. When both byte offsets are
/// present, `code` replaces `[startByte, endByte)`; otherwise it replaces
/// the whole file.
pub async fn apply_selection(params: Value, ctx: &AppContext) -> Result<Value> {
    #[derive(serde::Deserialize)]
    struct Params {
        #[serde(default)]
        workspace: Option<String>,
        #[serde(rename = "filePath", default)]
        file_path: Option<String>,
        code: String,
        #[serde(rename = "startByte", default)]
        start_byte: Option<usize>,
        #[serde(rename = "endByte", default)]
        end_byte: Option<usize>,
    }

    let p: Params = serde_json::from_value(params)?;

    let target: PathBuf = match (&p.file_path, &p.workspace) {
        (Some(file_path), Some(workspace)) => {
            let rel = fileset::sanitize_rel_path(file_path)?;
            PathBuf::from(workspace).join(rel)
        }
        (Some(file_path), None) => PathBuf::from(file_path),
        (None, _) => ctx
            .editor
            .get()
            .await
            .file_path
            .map(PathBuf::from)
            .ok_or_else(|| {
                anyhow::anyhow!("INVALID_PARAMS: missing filePath and no active editor file")
            })?,
    };

    let original = match tokio::fs::read_to_string(&target).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let updated = match (p.start_byte, p.end_byte) {
        (Some(start), Some(end)) => splice(&original, &p.code, start, end),
        _ => p.code.clone(),
    };

    let existed = ctx.review.open(&target, &updated).await?;
    Ok(json!({ "path": target, "existed": existed }))
}

/// Replace `[start, end)` of `original` with `code`.
///
/// Client byte offsets may split a UTF-8 sequence; widen to the nearest
/// char boundaries instead of panicking.
fn splice(original: &str, code: &str, start: usize, end: usize) -> String {
    let mut start = start.min(original.len());
    let mut end = end.clamp(start, original.len());
    while start > 0 && !original.is_char_boundary(start) {
        start -= 1;
    }
    while end < original.len() && !original.is_char_boundary(end) {
        end += 1;
    }
    format!("{}{}{}", &original[..start], code, &original[end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splice_replaces_the_range() {
        assert_eq!(splice("fn old() {}", "new", 3, 6), "fn new() {}");
    }

    #[test]
    fn splice_clamps_out_of_range_offsets() {
        assert_eq!(splice("short", "x", 3, 99), "shox");
        assert_eq!(splice("short", "x", 99, 120), "shortx");
    }

    #[test]
    fn splice_widens_to_char_boundaries() {
        // "é" is two bytes; offset 1 lands inside it, so the whole char
        // is treated as part of the range.
        assert_eq!(splice("é!", "x", 1, 1), "x!");
    }
}
