//! `TagExtractor` — tree-sitter parsing into `Tag`s, with a lexical
//! fallback for grammars whose query ships no reference captures.
//!
//! Grounded on `codescope_server::ast`'s `language_for_ext`/`classify_node`/
//! `walk_node` trio, generalized from "extract symbols" to "extract tags"
//! and driven by `.scm` query files instead of a hardcoded node-kind match.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{Tag, TagKind};

/// Resolve a file extension to the tag-query language name. Language
/// *detection* proper is out of scope for this crate (an external
/// collaborator's concern per the interface contract); this is the
/// minimal extension table needed to drive the pipeline end to end,
/// ported from `ast::language_for_ext`.
pub fn detect_language(ext: &str) -> Option<&'static str> {
    match ext {
        "rs" => Some("rust"),
        "ts" | "tsx" => Some("typescript"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        "py" | "pyi" => Some("python"),
        "go" => Some("go"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some("cpp"),
        "java" => Some("java"),
        _ => None,
    }
}

#[cfg(feature = "treesitter")]
fn ts_language(name: &str) -> Option<tree_sitter::Language> {
    Some(match name {
        "rust" => tree_sitter_rust::LANGUAGE.into(),
        "typescript" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        "javascript" => tree_sitter_javascript::LANGUAGE.into(),
        "python" => tree_sitter_python::LANGUAGE.into(),
        "go" => tree_sitter_go::LANGUAGE.into(),
        "c" => tree_sitter_c::LANGUAGE.into(),
        "cpp" => tree_sitter_cpp::LANGUAGE.into(),
        "java" => tree_sitter_java::LANGUAGE.into(),
        _ => return None,
    })
}

fn query_source(name: &str) -> Option<&'static str> {
    Some(match name {
        "rust" => include_str!("../queries/rust-tags.scm"),
        "typescript" => include_str!("../queries/typescript-tags.scm"),
        "javascript" => include_str!("../queries/javascript-tags.scm"),
        "python" => include_str!("../queries/python-tags.scm"),
        "go" => include_str!("../queries/go-tags.scm"),
        "c" => include_str!("../queries/c-tags.scm"),
        "cpp" => include_str!("../queries/cpp-tags.scm"),
        "java" => include_str!("../queries/java-tags.scm"),
        _ => return None,
    })
}

/// Outcome of an extraction attempt, distinguishing "no grammar for this
/// language" (excluded) from a successful (possibly partial) tag list.
pub enum Extraction {
    Tags(Vec<Tag>),
    NoGrammar,
    Unreadable,
}

pub struct TagExtractor;

impl TagExtractor {
    /// Parse `abs_path`'s contents as `language` and emit one `Tag` per
    /// captured node in that language's query. Falls back to a lexical
    /// scan for references when the query defines no `reference.*`
    /// captures.
    pub fn extract(abs_path: &Path, rel_path: &str, language: &str) -> Extraction {
        let Some(source) = std::fs::read_to_string(abs_path).ok() else {
            return Extraction::Unreadable;
        };

        #[cfg(feature = "treesitter")]
        {
            if let Some(tags) = Self::extract_treesitter(&source, abs_path, rel_path, language) {
                return Extraction::Tags(tags);
            }
        }

        if query_source(language).is_none() {
            return Extraction::NoGrammar;
        }

        // No tree-sitter feature compiled in, but a known language: still
        // produce something via the pure lexical path so the pipeline
        // degrades gracefully rather than excluding every file.
        Extraction::Tags(lexical_fallback(&source, abs_path, rel_path, &[]))
    }

    #[cfg(feature = "treesitter")]
    fn extract_treesitter(
        source: &str,
        abs_path: &Path,
        rel_path: &str,
        language: &str,
    ) -> Option<Vec<Tag>> {
        let lang = ts_language(language)?;
        let query_text = query_source(language)?;

        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&lang).ok()?;
        let tree = parser.parse(source, None)?;

        let query = match tree_sitter::Query::new(&lang, query_text) {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(language, error = %e, "invalid tag query, treating as no-grammar");
                return None;
            }
        };

        let name_capture_idx = query.capture_index_for_name("name");
        let mut has_reference_capture = false;
        for name in query.capture_names() {
            if name.starts_with("reference.") || name.starts_with("name.reference.") {
                has_reference_capture = true;
            }
        }

        let mut tags = Vec::new();
        let mut def_lines = Vec::new();
        let mut cursor = tree_sitter::QueryCursor::new();
        let bytes = source.as_bytes();
        let mut matches = cursor.matches(&query, tree.root_node(), bytes);
        use streaming_iterator::StreamingIterator;
        while let Some(m) = matches.next() {
            for cap in m.captures {
                let cap_name = query.capture_names()[cap.index as usize];
                let kind = if cap_name.starts_with("definition.") {
                    TagKind::Def
                } else if cap_name.starts_with("reference.") || cap_name.starts_with("name.reference.")
                {
                    TagKind::Ref
                } else {
                    continue;
                };

                // The node carrying the tag's identifier text is the
                // capture named "name" within this match when present,
                // otherwise this capture itself.
                let name_node = if Some(cap.index) == name_capture_idx {
                    cap.node
                } else if let Some(idx) = name_capture_idx {
                    match m.captures.iter().find(|c| c.index == idx as u32) {
                        Some(c) => c.node,
                        None => cap.node,
                    }
                } else {
                    cap.node
                };

                let Ok(text) = name_node.utf8_text(bytes) else {
                    continue;
                };
                if text.is_empty() {
                    continue;
                }
                let line = name_node.start_position().row;
                if kind == TagKind::Def {
                    def_lines.push(line);
                }
                tags.push(Tag {
                    rel_path: rel_path.to_string(),
                    abs_path: abs_path.to_path_buf(),
                    line,
                    name: text.to_string(),
                    kind,
                });
            }
        }

        if !has_reference_capture {
            tags.extend(lexical_fallback(source, abs_path, rel_path, &def_lines));
        }

        Some(tags)
    }
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

/// Pygments-style lexical fallback: emit a `ref` tag for every
/// identifier-like token not already emitted as a `def` on that line.
/// `def_lines` holds the 0-based lines that already produced a
/// definition tag in this file, so trivial self-references (`fn foo`'s
/// own name token) don't duplicate as refs.
fn lexical_fallback(source: &str, abs_path: &Path, rel_path: &str, def_lines: &[usize]) -> Vec<Tag> {
    let def_line_set: std::collections::HashSet<usize> = def_lines.iter().copied().collect();
    let re = identifier_regex();
    let mut tags = Vec::new();
    for (line_no, line) in source.lines().enumerate() {
        if def_line_set.contains(&line_no) {
            continue;
        }
        for m in re.find_iter(line) {
            tags.push(Tag {
                rel_path: rel_path.to_string(),
                abs_path: abs_path.to_path_buf(),
                line: line_no,
                name: m.as_str().to_string(),
                kind: TagKind::Ref,
            });
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_known_extensions() {
        assert_eq!(detect_language("rs"), Some("rust"));
        assert_eq!(detect_language("py"), Some("python"));
        assert_eq!(detect_language("xyz"), None);
    }

    #[test]
    fn unknown_language_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.xyz");
        std::fs::write(&path, "hello").unwrap();
        match TagExtractor::extract(&path, "f.xyz", "xyz") {
            Extraction::NoGrammar => {}
            _ => panic!("expected NoGrammar for unknown language"),
        }
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn rust_file_yields_function_definition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "fn foo() {{\n    bar();\n}}\n\nfn bar() {{}}").unwrap();
        drop(f);

        let Extraction::Tags(tags) = TagExtractor::extract(&path, "lib.rs", "rust") else {
            panic!("expected tags");
        };
        let defs: Vec<_> = tags.iter().filter(|t| t.kind == TagKind::Def).collect();
        assert!(defs.iter().any(|t| t.name == "foo"));
        assert!(defs.iter().any(|t| t.name == "bar"));
        let refs: Vec<_> = tags.iter().filter(|t| t.kind == TagKind::Ref).collect();
        assert!(refs.iter().any(|t| t.name == "bar"));
    }
}
