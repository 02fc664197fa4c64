//! `Renderer` — formats a selected tag list into the final map text.
//!
//! Grouping-by-file-in-first-appearance-order and the "surrounding
//! context window" idea mirror how the teacher's `budget::build_context_response`
//! assembles file blocks, generalized to tag-level interest windows with
//! elision markers instead of whole-block truncation.

use std::collections::BTreeMap;

use crate::types::Tag;

const CONTEXT_LINES: usize = 2;
const ELISION_MARKER: &str = "\u{22ee}...";

pub struct Renderer;

impl Renderer {
    /// Render `tags` (already budget-selected, definitions only) into the
    /// final map text. Deterministic: grouping follows first-appearance
    /// order in `tags`, and line ranges are emitted 1-based.
    pub fn render(tags: &[Tag]) -> String {
        if tags.is_empty() {
            return String::new();
        }

        let mut order: Vec<String> = Vec::new();
        let mut by_file: BTreeMap<String, Vec<&Tag>> = BTreeMap::new();
        for tag in tags {
            if !by_file.contains_key(&tag.rel_path) {
                order.push(tag.rel_path.clone());
            }
            by_file.entry(tag.rel_path.clone()).or_default().push(tag);
        }

        let mut out = String::new();
        for (i, rel_path) in order.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let file_tags = &by_file[rel_path];
            out.push_str(rel_path);
            out.push_str(":\n");
            out.push_str(&render_file(file_tags));
        }
        out
    }
}

fn render_file(tags: &[&Tag]) -> String {
    let Some(first) = tags.first() else { return String::new() };
    let lines: Vec<String> = match std::fs::read_to_string(&first.abs_path) {
        Ok(contents) => contents.lines().map(|l| l.to_string()).collect(),
        Err(_) => return String::new(),
    };
    if lines.is_empty() {
        return String::new();
    }
    let last_line = lines.len() - 1;

    let mut windows: Vec<(usize, usize)> = tags
        .iter()
        .map(|t| {
            let lo = t.line.saturating_sub(CONTEXT_LINES);
            let hi = (t.line + CONTEXT_LINES).min(last_line);
            (lo, hi)
        })
        .collect();
    windows.sort();

    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (lo, hi) in windows {
        if let Some(last) = merged.last_mut() {
            if lo <= last.1 + 1 {
                last.1 = last.1.max(hi);
                continue;
            }
        }
        merged.push((lo, hi));
    }

    let max_line_num = merged.last().map(|(_, hi)| hi + 1).unwrap_or(1);
    let width = max_line_num.to_string().len();

    let mut out = String::new();
    for (i, (lo, hi)) in merged.iter().enumerate() {
        if i > 0 {
            out.push_str(&format!("{}\n", ELISION_MARKER));
        }
        for line_idx in *lo..=*hi {
            out.push_str(&format!("{:>width$}: {}\n", line_idx + 1, lines[line_idx], width = width));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagKind;
    use std::path::PathBuf;

    fn write_tmp(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.py");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn empty_input_renders_empty_string() {
        assert_eq!(Renderer::render(&[]), "");
    }

    #[test]
    fn single_tag_windows_around_its_line() {
        let contents = (0..10).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let (_dir, path) = write_tmp(&contents);
        let tag = Tag { rel_path: "a.py".into(), abs_path: path, line: 5, name: "foo".into(), kind: TagKind::Def };
        let out = Renderer::render(&[tag]);
        assert!(out.starts_with("a.py:\n"));
        assert!(out.contains("6: line5"));
        assert!(out.contains("4: line3"));
        assert!(!out.contains("line9"));
    }

    #[test]
    fn two_far_apart_tags_get_elision_marker() {
        let contents = (0..20).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let (_dir, path) = write_tmp(&contents);
        let t1 = Tag { rel_path: "a.py".into(), abs_path: path.clone(), line: 1, name: "foo".into(), kind: TagKind::Def };
        let t2 = Tag { rel_path: "a.py".into(), abs_path: path, line: 15, name: "bar".into(), kind: TagKind::Def };
        let out = Renderer::render(&[t1, t2]);
        assert!(out.contains("\u{22ee}..."));
    }
}
