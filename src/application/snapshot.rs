//! Codebase snapshot for the system prompt.
//!
//! Renders a file tree plus the contents of small source files, bounded so
//! the stable cached block stays a predictable size.

use std::path::{Path, PathBuf};

/// Total content budget for the snapshot.
const CONTENT_BUDGET: usize = 192 * 1024;

/// Files larger than this are listed but not inlined.
const MAX_INLINE_FILE: u64 = 24 * 1024;

const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".autograft"];

/// Build the snapshot text for a workspace root.
pub fn snapshot_codebase(root: &Path) -> String {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() {
                if !SKIP_DIRS.contains(&name.as_str()) {
                    stack.push(path);
                }
            } else {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                files.push((path, size));
            }
        }
    }
    files.sort();

    let mut listing = String::from("## Files\n");
    for (path, size) in &files {
        let relative = relative_of(root, path);
        listing.push_str(&format!("{relative} ({size} bytes)\n"));
    }

    let mut contents = String::from("\n## Contents\n");
    let mut used = 0usize;
    for (path, size) in &files {
        if *size > MAX_INLINE_FILE || used >= CONTENT_BUDGET {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(path) else {
            continue; // binary or unreadable
        };
        let relative = relative_of(root, path);
        let block = format!("\n### {relative}\n```\n{text}\n```\n");
        if used + block.len() > CONTENT_BUDGET {
            contents.push_str(&format!("\n### {relative}\n(omitted, snapshot budget reached)\n"));
            continue;
        }
        used += block.len();
        contents.push_str(&block);
    }

    listing + &contents
}

fn relative_of(root: &Path, path: &PathBuf) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
