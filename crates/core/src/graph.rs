//! `GraphBuilder` — aggregates per-file tags into a weighted reference
//! graph across files.
//!
//! The shared-identifier linking idea follows the `Tag`/`TagIndex` design
//! (`defines`/`references` maps keyed by identifier) rather than the
//! teacher's call/type-ref `CodeGraph`, since the teacher's graph resolves
//! semantic call edges (out of scope here — references are matched purely
//! by identifier name per the purpose statement).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::SystemTime;

use rayon::prelude::*;

use crate::cache::TagCache;
use crate::extractor::{detect_language, Extraction, TagExtractor};
use crate::types::{FileReport, ReferenceGraph, Tag, TagKind};

pub struct GraphBuildOutput {
    pub graph: ReferenceGraph,
    pub report: FileReport,
    /// Per-node (absolute path) personalization weight, normalized to
    /// sum to 1 (or left empty for the ranker to treat as uniform).
    pub personalization: HashMap<String, f64>,
    /// (abs_path, identifier) -> the definition tag instances found
    /// there. Used by the ranker to distribute accumulated rank across
    /// same-named definitions within a file.
    pub defs_by_file_ident: HashMap<(String, String), Vec<Tag>>,
}

pub struct GraphBuilder;

impl GraphBuilder {
    /// `chat_files` and `other_files` are absolute paths with their
    /// repo-relative counterpart (callers resolve this once up front).
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        cache: &TagCache,
        chat_files: &[(String, String)],
        other_files: &[(String, String)],
        mentioned_fnames: &HashSet<String>,
        mentioned_idents: &HashSet<String>,
        force_refresh: bool,
    ) -> GraphBuildOutput {
        let all_files: Vec<&(String, String)> = chat_files.iter().chain(other_files.iter()).collect();

        let mut report = FileReport {
            total_files_considered: all_files.len(),
            ..Default::default()
        };

        // Extraction is independent per file, parallelize per §5.
        let extracted: Vec<(String, Vec<Tag>, Option<&'static str>)> = all_files
            .par_iter()
            .map(|(abs, rel)| extract_one(cache, abs, rel, force_refresh))
            .collect();

        let mut tags_by_file: HashMap<String, Vec<Tag>> = HashMap::new();
        for (abs, tags, excluded) in extracted {
            if let Some(reason) = excluded {
                report.excluded.insert(abs.clone(), reason.to_string());
            }
            report.definition_matches += tags.iter().filter(|t| t.kind == TagKind::Def).count();
            report.reference_matches += tags.iter().filter(|t| t.kind == TagKind::Ref).count();
            tags_by_file.insert(abs, tags);
        }

        // defs[ident] = set of files defining it; refs[ident] = multiset
        // of referencing files (as an occurrence-count map per file).
        let mut defs: HashMap<String, HashSet<String>> = HashMap::new();
        let mut refs: HashMap<String, HashMap<String, usize>> = HashMap::new();
        let mut defs_by_file_ident: HashMap<(String, String), Vec<Tag>> = HashMap::new();

        for (abs, tags) in &tags_by_file {
            for tag in tags {
                match tag.kind {
                    TagKind::Def => {
                        defs.entry(tag.name.clone()).or_default().insert(abs.clone());
                        defs_by_file_ident
                            .entry((abs.clone(), tag.name.clone()))
                            .or_default()
                            .push(tag.clone());
                    }
                    TagKind::Ref => {
                        *refs.entry(tag.name.clone()).or_default().entry(abs.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut graph = ReferenceGraph::new();
        // Deterministic iteration: sort identifiers.
        let mut idents: Vec<&String> = defs.keys().filter(|i| refs.contains_key(i.as_str())).collect();
        idents.sort();

        for ident in idents {
            let def_files = &defs[ident];
            let Some(ref_files) = refs.get(ident) else { continue };
            let mut referencing: Vec<(&String, &usize)> = ref_files.iter().collect();
            referencing.sort_by_key(|(f, _)| (*f).clone());
            for (r_file, count) in referencing {
                for d_file in def_files {
                    if r_file == d_file {
                        continue;
                    }
                    let weight = edge_weight(*count, ident, mentioned_idents);
                    graph.add_edge(r_file, d_file, ident, weight);
                }
            }
        }

        // Ensure every file with at least one tag is a node, even if it
        // has no edges (isolated nodes still carry definitions forward).
        for abs in tags_by_file.keys() {
            if !tags_by_file[abs].is_empty() {
                graph.ensure_node(abs);
            }
        }

        let personalization = build_personalization(chat_files, mentioned_fnames, &graph);

        GraphBuildOutput { graph, report, personalization, defs_by_file_ident }
    }
}

fn extract_one(
    cache: &TagCache,
    abs_path: &str,
    rel_path: &str,
    force_refresh: bool,
) -> (String, Vec<Tag>, Option<&'static str>) {
    let path = Path::new(abs_path);
    let Ok(meta) = std::fs::metadata(path) else {
        return (abs_path.to_string(), Vec::new(), Some("unreadable"));
    };

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let Some(language) = detect_language(ext) else {
        return (abs_path.to_string(), Vec::new(), Some("no-grammar"));
    };

    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let rel_owned = rel_path.to_string();
    let abs_owned = abs_path.to_string();
    let mut exclusion: Option<&'static str> = None;
    let tags = cache.get_or_compute(path, mtime, force_refresh, move || {
        match TagExtractor::extract(Path::new(&abs_owned), &rel_owned, language) {
            Extraction::Tags(tags) => tags,
            Extraction::NoGrammar | Extraction::Unreadable => Vec::new(),
        }
    });
    if tags.is_empty() {
        // Distinguish "genuinely no tags" from "extractor couldn't run"
        // by re-checking readability; the grammar was already known good.
        if std::fs::read(path).is_err() {
            exclusion = Some("unreadable");
        }
    }

    (abs_path.to_string(), tags, exclusion)
}

/// `w(i, R) = sqrt(occurrence_count) · 10^mentioned · 10^uppercase · 0.1^trivial`.
fn edge_weight(occurrence_count: usize, ident: &str, mentioned_idents: &HashSet<String>) -> f64 {
    let mut w = (occurrence_count as f64).sqrt();
    if mentioned_idents.contains(ident) {
        w *= 10.0;
    }
    if ident.chars().next().is_some_and(|c| c.is_uppercase()) {
        w *= 10.0;
    }
    if ident.len() <= 2 || ident.starts_with('_') {
        w *= 0.1;
    }
    w
}

fn build_personalization(
    chat_files: &[(String, String)],
    mentioned_fnames: &HashSet<String>,
    graph: &ReferenceGraph,
) -> HashMap<String, f64> {
    let mut boosted: BTreeMap<String, ()> = BTreeMap::new();
    for (abs, _) in chat_files {
        if graph.node_index.contains_key(abs) {
            boosted.insert(abs.clone(), ());
        }
    }
    for node in &graph.nodes {
        let rel = node.rsplit('/').next().unwrap_or(node);
        if mentioned_fnames.contains(node) || mentioned_fnames.contains(rel) {
            boosted.insert(node.clone(), ());
        }
    }
    if boosted.is_empty() {
        return HashMap::new();
    }
    let share = 1.0 / boosted.len() as f64;
    boosted.into_keys().map(|k| (k, share)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, name: &str, contents: &str) -> (String, String) {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        (path.to_string_lossy().to_string(), name.to_string())
    }

    #[test]
    fn edge_weight_boosts_mentioned_and_uppercase() {
        let mentioned: HashSet<String> = ["special".to_string()].into_iter().collect();
        let base = edge_weight(1, "plain", &HashSet::new());
        let boosted = edge_weight(1, "special", &mentioned);
        let upper = edge_weight(1, "Special", &HashSet::new());
        assert!(boosted > base);
        assert!(upper > base);
    }

    #[test]
    fn trivial_identifiers_are_downweighted() {
        let short = edge_weight(4, "ab", &HashSet::new());
        let normal = edge_weight(4, "abcdef", &HashSet::new());
        assert!(short < normal);
    }

    #[test]
    fn two_file_reference_creates_single_directed_edge() {
        let dir = tempfile::tempdir().unwrap();
        let (a_abs, a_rel) = write_file(dir.path(), "a.py", "def foo():\n    pass\n");
        let (b_abs, b_rel) = write_file(dir.path(), "b.py", "foo()\nfoo()\nfoo()\n");

        let cache = TagCache::new(dir.path().join(".cache"));
        let other = vec![(a_abs.clone(), a_rel), (b_abs.clone(), b_rel)];
        let out = GraphBuilder::build(&cache, &[], &other, &HashSet::new(), &HashSet::new(), false);

        assert!(out.graph.edges.iter().any(|e| e.from == b_abs && e.to == a_abs && e.ident == "foo"));
        assert!(!out.graph.edges.iter().any(|e| e.from == a_abs && e.to == b_abs));
    }
}
