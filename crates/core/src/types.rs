//! Core data model: `Tag`, `FileReport`, `ReferenceGraph`, `RankedTag`.
//!
//! Mirrors the shape of `codescope_core::types::ScannedFile` /
//! `ImportGraph` but generalized to identifier-level (not just
//! file-level) edges, per spec.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A single lexical occurrence of a named symbol.
///
/// Two tags are equal iff all five attributes match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    /// Path relative to the repo root, used for display and grouping.
    pub rel_path: String,
    /// Absolute path, used for I/O.
    pub abs_path: PathBuf,
    /// 0-based line number.
    pub line: usize,
    pub name: String,
    pub kind: TagKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Def,
    Ref,
}

/// A definition tag augmented with a nonnegative PageRank-derived score.
///
/// Ordering: score descending, then (rel_path ascending, line ascending).
#[derive(Debug, Clone)]
pub struct RankedTag {
    pub tag: Tag,
    pub score: f64,
}

impl RankedTag {
    fn sort_key(&self) -> (&str, usize) {
        (self.tag.rel_path.as_str(), self.tag.line)
    }
}

impl PartialEq for RankedTag {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.sort_key() == other.sort_key()
    }
}
impl Eq for RankedTag {}

impl PartialOrd for RankedTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedTag {
    /// Score descending, then (rel_path, line) ascending.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.sort_key().cmp(&other.sort_key()))
    }
}

/// Extraction diagnostics for a single pipeline run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FileReport {
    /// path -> exclusion reason (e.g. "no-grammar", "unreadable")
    pub excluded: BTreeMap<String, String>,
    pub definition_matches: usize,
    pub reference_matches: usize,
    pub total_files_considered: usize,
    /// Set once if PageRank fell back to uniform ranks.
    pub rank_fallback: bool,
}

/// A directed multigraph over absolute file paths, edges carry an
/// identifier label and weight. Self-edges are never added.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    pub nodes: Vec<String>,
    /// (from, to, identifier, weight)
    pub edges: Vec<GraphEdge>,
    /// node -> index into `nodes`, for fast lookup.
    pub(crate) node_index: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub ident: String,
    pub weight: f64,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node if absent, returning its stable index.
    pub fn ensure_node(&mut self, path: &str) -> usize {
        if let Some(&idx) = self.node_index.get(path) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(path.to_string());
        self.node_index.insert(path.to_string(), idx);
        idx
    }

    pub fn add_edge(&mut self, from: &str, to: &str, ident: &str, weight: f64) {
        if from == to {
            return;
        }
        self.ensure_node(from);
        self.ensure_node(to);
        self.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            ident: ident.to_string(),
            weight,
        });
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
