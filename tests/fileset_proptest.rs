// SPDX-License-Identifier: MIT
//! Property tests for the file-block parser and path sanitizer.
//!
//! Assistant output is adversarial by nature — these check that arbitrary
//! text never panics the parser and that no sanitized path can escape a
//! workspace root.

use proptest::prelude::*;

use vicod::fileset::{parse_file_blocks, sanitize_rel_path};

proptest! {
    #[test]
    fn parser_never_panics(message in ".{0,2000}") {
        let _ = parse_file_blocks(&message);
    }

    #[test]
    fn parser_handles_stray_markers(
        prefix in "[\\[\\]/a-z ]{0,40}",
        inner in "[^\\[\\]]{0,200}",
    ) {
        let message = format!("{prefix}[writeFile]{inner}[file name=\"a.txt\"]{inner}");
        let _ = parse_file_blocks(&message);
    }

    #[test]
    fn sanitized_paths_stay_inside_the_workspace(raw in ".{0,120}") {
        if let Ok(cleaned) = sanitize_rel_path(&raw) {
            prop_assert!(!cleaned.is_empty());
            prop_assert!(!cleaned.starts_with('/'));
            prop_assert!(!cleaned.contains(".."));
        }
    }

    #[test]
    fn well_formed_blocks_always_round_trip(
        path in "[a-z]{1,8}(/[a-z]{1,8}){0,2}\\.[a-z]{1,4}",
        content in "[^\\[\\]]{1,200}",
    ) {
        let message = format!(
            "[writeFile][file name=\"{path}\"]{content}[/file][/writeFile]"
        );
        let files = parse_file_blocks(&message);
        prop_assert_eq!(files.len(), 1);
        prop_assert_eq!(&files[0].path, &path);
        prop_assert_eq!(files[0].content.as_str(), content.trim());
    }
}
