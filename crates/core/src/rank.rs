//! `Ranker` — personalized PageRank over the reference graph, then
//! distribution of each node's rank across its definitions.
//!
//! The teacher has no PageRank of its own (`budget::compute_importance`
//! solves a different, dependency-count-based scoring problem); this is
//! hand-rolled power iteration per the algorithmic contract, the same
//! shape `infiniloom`'s `compute_pagerank(0.85, iterations)` call implies
//! without a graph-library dependency — the spec explicitly sanctions
//! either.

use std::collections::{HashMap, HashSet};

use crate::types::{RankedTag, ReferenceGraph, Tag};

const DAMPING: f64 = 0.85;
const MAX_ITERATIONS: usize = 100;
const CONVERGENCE_THRESHOLD: f64 = 1e-6;

pub struct Ranker;

impl Ranker {
    /// Run personalized PageRank, then fold each definition's inbound
    /// rank share into a sorted `RankedTag` list. `exclude_unranked`
    /// drops zero-score definitions before returning (callers that want
    /// them for diagnostics should read `FileReport` instead).
    pub fn rank(
        graph: &ReferenceGraph,
        personalization: &HashMap<String, f64>,
        defs_by_file_ident: &HashMap<(String, String), Vec<Tag>>,
        exclude_unranked: bool,
    ) -> (Vec<RankedTag>, bool) {
        if graph.is_empty() {
            return (Vec::new(), false);
        }

        let (ranks, fell_back) = pagerank(graph, personalization);

        let mut scores: HashMap<(String, String), f64> = HashMap::new();
        let out_weight = out_weight_sums(graph);

        for edge in &graph.edges {
            let Some(&from_idx) = graph.node_index.get(&edge.from) else { continue };
            let r_from = ranks[from_idx];
            let total_out = out_weight.get(&edge.from).copied().unwrap_or(0.0);
            if total_out <= 0.0 {
                continue;
            }
            let share = r_from * edge.weight / total_out;
            *scores.entry((edge.to.clone(), edge.ident.clone())).or_insert(0.0) += share;
        }

        let mut ranked = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for ((file, ident), tags) in defs_by_file_ident {
            seen.insert((file.clone(), ident.clone()));
            let total = scores.get(&(file.clone(), ident.clone())).copied().unwrap_or(0.0);
            // Multiple definitions of the same identifier in one file
            // split the accumulated score evenly; the spec is silent on
            // this case (see DESIGN.md).
            let per_tag = if tags.is_empty() { 0.0 } else { total / tags.len() as f64 };
            for tag in tags {
                if exclude_unranked && per_tag <= 0.0 {
                    continue;
                }
                ranked.push(RankedTag { tag: tag.clone(), score: per_tag });
            }
        }

        ranked.sort();
        (ranked, fell_back)
    }
}

fn out_weight_sums(graph: &ReferenceGraph) -> HashMap<String, f64> {
    let mut sums: HashMap<String, f64> = HashMap::new();
    for edge in &graph.edges {
        *sums.entry(edge.from.clone()).or_insert(0.0) += edge.weight;
    }
    sums
}

/// Power-iteration personalized PageRank. Returns (`ranks` indexed like
/// `graph.nodes`, `fell_back`) — `fell_back` is true if the iteration
/// failed to converge within `MAX_ITERATIONS` or the graph has zero
/// total edge weight (a pure-uniform distribution is then substituted).
fn pagerank(graph: &ReferenceGraph, personalization: &HashMap<String, f64>) -> (Vec<f64>, bool) {
    let n = graph.node_count();
    let uniform = 1.0 / n as f64;

    let mut personalization_vec = vec![uniform; n];
    if !personalization.is_empty() {
        let total: f64 = personalization.values().sum();
        if total > 0.0 {
            personalization_vec = vec![0.0; n];
            for (path, weight) in personalization {
                if let Some(&idx) = graph.node_index.get(path) {
                    personalization_vec[idx] = weight / total;
                }
            }
            // Any mass not covered by a recognized node is redistributed
            // uniformly so the vector still sums to 1.
            let covered: f64 = personalization_vec.iter().sum();
            if covered < 1.0 {
                let remainder = (1.0 - covered) / n as f64;
                for v in &mut personalization_vec {
                    *v += remainder;
                }
            }
        }
    }

    let out_weight = out_weight_sums(graph);
    let mut outgoing: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for edge in &graph.edges {
        let (Some(&from), Some(&to)) = (graph.node_index.get(&edge.from), graph.node_index.get(&edge.to)) else {
            continue;
        };
        outgoing[from].push((to, edge.weight));
    }

    let mut ranks = personalization_vec.clone();
    let mut converged = false;

    for _ in 0..MAX_ITERATIONS {
        let mut next = vec![0.0_f64; n];
        let mut dangling_mass = 0.0;

        for (node, rank) in ranks.iter().enumerate() {
            let total_out = out_weight.get(&graph.nodes[node]).copied().unwrap_or(0.0);
            if total_out <= 0.0 || outgoing[node].is_empty() {
                dangling_mass += rank;
                continue;
            }
            for &(target, weight) in &outgoing[node] {
                next[target] += rank * weight / total_out;
            }
        }

        for i in 0..n {
            let teleport = (1.0 - DAMPING) * personalization_vec[i];
            let flow = DAMPING * (next[i] + dangling_mass * personalization_vec[i]);
            next[i] = teleport + flow;
        }

        let delta: f64 = ranks.iter().zip(next.iter()).map(|(a, b)| (a - b).abs()).sum();
        ranks = next;
        if delta < CONVERGENCE_THRESHOLD {
            converged = true;
            break;
        }
    }

    if !converged || ranks.iter().any(|r| !r.is_finite() || *r < 0.0) {
        return (vec![uniform; n], true);
    }

    let sum: f64 = ranks.iter().sum();
    if sum > 0.0 {
        for r in &mut ranks {
            *r /= sum;
        }
    } else {
        return (vec![uniform; n], true);
    }

    (ranks, false)
}
