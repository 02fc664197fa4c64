//! `BudgetFitter` — binary-search over ranked-tag prefixes for the
//! largest rendering that fits a token budget.
//!
//! The "respect a ceiling, search for the largest admissible prefix"
//! shape is the same idea as the teacher's `budget::allocate_file_budgets`
//! water-fill loop, but here the variable is prefix length over an
//! already-sorted list rather than per-file allocation shares — the
//! teacher never does a pure binary search, so this is hand-rolled per
//! the algorithmic contract.

use std::collections::HashSet;

use crate::render::Renderer;
use crate::tokenizer::Tokenizer;
use crate::types::{RankedTag, Tag};

const TOLERANCE: f64 = 0.10;

pub struct BudgetFitter;

pub struct FitResult {
    pub selected: Vec<Tag>,
    pub rendered: String,
}

impl BudgetFitter {
    /// Binary-search the largest prefix of `ranked_tags` (after dropping
    /// any tag whose file is in `chat_files`) whose rendering fits
    /// `token_budget`, with a 10%-over-budget tolerance band.
    pub fn fit(
        ranked_tags: &[RankedTag],
        chat_files: &HashSet<String>,
        token_budget: i64,
        tokenizer: &dyn Tokenizer,
    ) -> FitResult {
        let budget = token_budget.max(0) as usize;
        let candidates: Vec<Tag> = ranked_tags
            .iter()
            .map(|rt| &rt.tag)
            .filter(|t| !chat_files.contains(&t.abs_path.to_string_lossy().to_string()))
            .cloned()
            .collect();

        if budget == 0 || candidates.is_empty() {
            return FitResult { selected: Vec::new(), rendered: String::new() };
        }

        let render_prefix = |k: usize| -> (String, usize) {
            let text = Renderer::render(&candidates[..k]);
            let tokens = tokenizer.count_tokens(&text);
            (text, tokens)
        };

        // Largest k with tokens(render(k)) <= budget. k=0 always fits
        // (empty render, 0 tokens), so lo starts at a known-good floor.
        let mut lo = 0usize;
        let mut hi = candidates.len();
        let mut best_text = String::new();

        while lo < hi {
            // Ties resolve upward: prefer the bigger map that still fits.
            let mid = lo + (hi - lo + 1) / 2;
            let (text, tokens) = render_prefix(mid);
            if tokens <= budget {
                lo = mid;
                best_text = text;
                if tokens as f64 >= budget as f64 * (1.0 - TOLERANCE) {
                    // Within the tolerance band already: good enough,
                    // stop searching to avoid extra renderings.
                    break;
                }
            } else {
                hi = mid - 1;
            }
        }

        if lo == 0 {
            return FitResult { selected: Vec::new(), rendered: String::new() };
        }
        if best_text.is_empty() {
            best_text = Renderer::render(&candidates[..lo]);
        }
        FitResult { selected: candidates[..lo].to_vec(), rendered: best_text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::BytesEstimateTokenizer;
    use crate::types::TagKind;
    use std::path::PathBuf;

    fn ranked(path: &PathBuf, line: usize, name: &str, score: f64) -> RankedTag {
        RankedTag {
            tag: Tag { rel_path: "a.py".into(), abs_path: path.clone(), line, name: name.into(), kind: TagKind::Def },
            score,
        }
    }

    #[test]
    fn zero_budget_yields_empty_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "def foo():\n    pass\n").unwrap();
        let tags = vec![ranked(&path, 0, "foo", 1.0)];
        let tok = BytesEstimateTokenizer;
        let result = BudgetFitter::fit(&tags, &HashSet::new(), 0, &tok);
        assert!(result.selected.is_empty());
        assert_eq!(result.rendered, "");
    }

    #[test]
    fn chat_files_are_never_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "def foo():\n    pass\n").unwrap();
        let tags = vec![ranked(&path, 0, "foo", 1.0)];
        let mut chat = HashSet::new();
        chat.insert(path.to_string_lossy().to_string());
        let tok = BytesEstimateTokenizer;
        let result = BudgetFitter::fit(&tags, &chat, 4096, &tok);
        assert!(result.selected.is_empty());
    }

    #[test]
    fn budget_is_respected_within_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.py");
        let contents: String = (0..50).map(|i| format!("def f{i}():\n    pass\n")).collect();
        std::fs::write(&path, &contents).unwrap();
        let tags: Vec<RankedTag> = (0..50)
            .map(|i| ranked(&path, i * 2, &format!("f{i}"), 50.0 - i as f64))
            .collect();
        let tok = BytesEstimateTokenizer;
        let budget = 50i64;
        let result = BudgetFitter::fit(&tags, &HashSet::new(), budget, &tok);
        let tokens = tok.count_tokens(&result.rendered);
        assert!(tokens as f64 <= budget as f64 * 1.10 + 1.0);
    }
}
