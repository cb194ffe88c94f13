//! PageRank by power iteration over a finished crawl.
//!
//! The vertex set is every fetched node plus every edge target that never
//! resolved to a node. Vertices with no outgoing edges (including all of the
//! unresolved targets) hand their rank mass out uniformly on each iteration.

use crate::error::{CrawlError, Result};
use crate::graph::GraphSnapshot;
use petgraph::Direction;
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const DEFAULT_DAMPING: f64 = 0.85;
pub const DEFAULT_EPSILON: f64 = 1e-8;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankOptions {
    pub damping: f64,
    /// Iteration stops once the L1 change between rounds drops below this.
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            damping: DEFAULT_DAMPING,
            epsilon: DEFAULT_EPSILON,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Scores for every vertex, summing to 1.
///
/// `converged == false` means the iteration cap was hit first. The scores are
/// still the best available estimate and still sum to 1; disconnected or
/// periodic graphs can legitimately end up here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankOutcome {
    pub ranks: HashMap<String, f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl RankOutcome {
    pub fn get(&self, url: &str) -> Option<f64> {
        self.ranks.get(url).copied()
    }

    pub fn total(&self) -> f64 {
        self.ranks.values().sum()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Highest-ranked URLs first; ties broken by URL.
    pub fn top(&self, n: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> =
            self.ranks.iter().map(|(url, score)| (url.clone(), *score)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

#[derive(Debug, Clone, Default)]
pub struct RankEngine {
    options: RankOptions,
}

impl RankEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RankOptions) -> Result<Self> {
        if !(0.0..1.0).contains(&options.damping) {
            return Err(CrawlError::InvalidDampingFactor(options.damping));
        }
        Ok(Self { options })
    }

    pub fn with_damping(damping: f64) -> Result<Self> {
        Self::with_options(RankOptions {
            damping,
            ..RankOptions::default()
        })
    }

    pub fn options(&self) -> RankOptions {
        self.options
    }

    pub fn compute(&self, snapshot: &GraphSnapshot) -> RankOutcome {
        let (graph, _) = snapshot.to_digraph();
        let n = graph.node_count();
        if n == 0 {
            return RankOutcome {
                converged: true,
                ..RankOutcome::default()
            };
        }

        let RankOptions {
            damping,
            epsilon,
            max_iterations,
        } = self.options;
        let size = n as f64;

        let out_degree: Vec<usize> = graph
            .node_indices()
            .map(|idx| graph.neighbors_directed(idx, Direction::Outgoing).count())
            .collect();

        let mut rank = vec![1.0 / size; n];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < max_iterations {
            iterations += 1;

            let dangling_mass: f64 = out_degree
                .iter()
                .zip(&rank)
                .filter(|(degree, _)| **degree == 0)
                .map(|(_, score)| score)
                .sum();

            let base = (1.0 - damping) / size + damping * dangling_mass / size;
            let mut next = vec![base; n];
            for edge in graph.edge_references() {
                let from = edge.source().index();
                next[edge.target().index()] += damping * rank[from] / out_degree[from] as f64;
            }

            let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
            rank = next;

            if delta < epsilon {
                converged = true;
                break;
            }
        }

        if converged {
            debug!("PageRank converged after {} iterations over {} vertices", iterations, n);
        } else {
            warn!(
                "PageRank did not converge within {} iterations over {} vertices; using last estimate",
                iterations, n
            );
        }

        // Absorb floating point drift so the scores sum to 1.
        let total: f64 = rank.iter().sum();
        let ranks = graph
            .node_indices()
            .map(|idx| (graph[idx].clone(), rank[idx.index()] / total))
            .collect();

        RankOutcome {
            ranks,
            iterations,
            converged,
        }
    }
}
