//! `get_repo_map` — the single blocking entry point that wires
//! TagExtractor → TagCache → GraphBuilder → Ranker → BudgetFitter →
//! Renderer into one call, per the external library surface.

use std::collections::HashSet;
use std::sync::Arc;

use crate::budget::BudgetFitter;
use crate::cache::TagCache;
use crate::graph::GraphBuilder;
use crate::rank::Ranker;
use crate::tokenizer::Tokenizer;
use crate::types::FileReport;

/// Mirrors the option table from the external interface: every field
/// the caller can set to steer a single pipeline run.
pub struct RepoMapOptions {
    /// (absolute_path, relative_path) pairs already in the consumer's
    /// context; they contribute structure but never appear in output.
    pub chat_files: Vec<(String, String)>,
    /// (absolute_path, relative_path) pairs that are candidates for
    /// inclusion in the rendered map.
    pub other_files: Vec<(String, String)>,
    /// Relative-path or bare-filename hints that receive a
    /// personalization boost.
    pub mentioned_fnames: HashSet<String>,
    /// Identifiers whose defining edges receive a weight boost.
    pub mentioned_idents: HashSet<String>,
    pub force_refresh: bool,
    pub max_map_tokens: i64,
    /// Hard ceiling; map tokens can never exceed this regardless of
    /// `max_map_tokens`.
    pub max_context_window: Option<i64>,
    pub exclude_unranked: bool,
    pub token_counter: Arc<dyn Tokenizer>,
}

impl Default for RepoMapOptions {
    fn default() -> Self {
        Self {
            chat_files: Vec::new(),
            other_files: Vec::new(),
            mentioned_fnames: HashSet::new(),
            mentioned_idents: HashSet::new(),
            force_refresh: false,
            max_map_tokens: 1024,
            max_context_window: None,
            exclude_unranked: false,
            token_counter: Arc::new(crate::tokenizer::BytesEstimateTokenizer),
        }
    }
}

/// Returns `(rendered_map, file_report)`. `rendered_map` is `None` when
/// the graph was empty or the budget admitted nothing.
pub fn get_repo_map(cache: &TagCache, opts: &RepoMapOptions) -> (Option<String>, FileReport) {
    if opts.chat_files.is_empty() && opts.other_files.is_empty() {
        return (None, FileReport::default());
    }

    let budget = opts.max_map_tokens.max(0);
    let budget = match opts.max_context_window {
        Some(ceiling) => budget.min(ceiling.max(0)),
        None => budget,
    };

    let build = GraphBuilder::build(
        cache,
        &opts.chat_files,
        &opts.other_files,
        &opts.mentioned_fnames,
        &opts.mentioned_idents,
        opts.force_refresh,
    );

    if build.graph.is_empty() {
        return (None, build.report);
    }

    let (ranked, rank_fell_back) = Ranker::rank(
        &build.graph,
        &build.personalization,
        &build.defs_by_file_ident,
        opts.exclude_unranked,
    );

    let mut report = build.report;
    report.rank_fallback = rank_fell_back;

    if budget == 0 {
        return (None, report);
    }

    let chat_file_set: HashSet<String> = opts.chat_files.iter().map(|(abs, _)| abs.clone()).collect();
    let fit = BudgetFitter::fit(&ranked, &chat_file_set, budget, opts.token_counter.as_ref());

    if fit.selected.is_empty() {
        return (None, report);
    }

    (Some(fit.rendered), report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineConfig;
    use std::sync::Arc;

    fn write(dir: &std::path::Path, name: &str, contents: &str) -> (String, String) {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        (path.to_string_lossy().to_string(), name.to_string())
    }

    fn opts(chat: Vec<(String, String)>, other: Vec<(String, String)>) -> RepoMapOptions {
        RepoMapOptions {
            chat_files: chat,
            other_files: other,
            max_map_tokens: 4096,
            token_counter: Arc::new(crate::tokenizer::BytesEstimateTokenizer),
            ..Default::default()
        }
    }

    #[test]
    fn empty_input_returns_none_and_zero_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(dir.path());
        let cache = TagCache::new(config.cache_dir());
        let (map, report) = get_repo_map(&cache, &opts(vec![], vec![]));
        assert!(map.is_none());
        assert_eq!(report.total_files_considered, 0);
    }

    #[test]
    fn single_file_with_two_defs_renders_both() {
        let dir = tempfile::tempdir().unwrap();
        let (abs, rel) = write(dir.path(), "a.py", "def foo():\n    pass\n\ndef bar():\n    pass\n");
        let config = PipelineConfig::new(dir.path());
        let cache = TagCache::new(config.cache_dir());
        let (map, report) = get_repo_map(&cache, &opts(vec![], vec![(abs, rel)]));
        let map = map.expect("expected a rendered map");
        assert!(map.contains("foo"));
        assert!(map.contains("bar"));
        assert_eq!(report.definition_matches, 2);
    }

    #[test]
    fn chat_file_suppression_empties_output_when_only_definer() {
        let dir = tempfile::tempdir().unwrap();
        let (a_abs, a_rel) = write(dir.path(), "a.py", "def foo():\n    pass\n");
        let (b_abs, b_rel) = write(dir.path(), "b.py", "foo()\nfoo()\n");
        let config = PipelineConfig::new(dir.path());
        let cache = TagCache::new(config.cache_dir());

        let (map, report) =
            get_repo_map(&cache, &opts(vec![(a_abs, a_rel)], vec![(b_abs, b_rel)]));
        assert!(map.is_none());
        assert_eq!(report.definition_matches, 1);
    }

    #[test]
    fn tiny_budget_never_exceeds_it_by_more_than_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let contents: String = (0..30).map(|i| format!("def f{i}():\n    pass\n")).collect();
        let (abs, rel) = write(dir.path(), "big.py", &contents);
        let config = PipelineConfig::new(dir.path());
        let cache = TagCache::new(config.cache_dir());
        let mut o = opts(vec![], vec![(abs, rel)]);
        o.max_map_tokens = 10;
        let (map, _report) = get_repo_map(&cache, &o);
        if let Some(text) = map {
            let tokens = o.token_counter.count_tokens(&text);
            assert!(tokens as f64 <= 10.0 * 1.10 + 1.0);
        }
    }
}
