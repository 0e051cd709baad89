//! Debug and self-test primitives: structural validation, index statistics,
//! and the recall self-test.

use crate::hnsw::graph::{Graph, HnswIndex};
use crate::hnsw::search::{greedy_descend, search_layer};
use crate::hnsw::visited::VisitedSet;
use crate::quantization::Quantization;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::VecDeque;

/// Result of [`HnswIndex::validate_graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphValidation {
    /// Live nodes reachable from the entry point (following links on any
    /// layer).
    pub connected_nodes: u64,
    /// True if every link has its inverse on the same layer.
    pub reciprocal: bool,
    /// True if no neighbor list exceeds its layer cap.
    pub within_caps: bool,
}

/// Index statistics reported by [`HnswIndex::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub nodes: u64,
    pub dim: usize,
    pub quantization: Quantization,
    pub max_level: usize,
    /// Number of nodes whose top layer is each level.
    pub level_counts: Vec<u64>,
    /// Mean layer-0 degree across live nodes.
    pub mean_degree0: f32,
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} nodes, dim {}, {:?} quantization, max level {}",
            self.nodes, self.dim, self.quantization, self.max_level
        )?;
        for (level, count) in self.level_counts.iter().enumerate() {
            writeln!(f, "  level {level}: {count} nodes")?;
        }
        write!(f, "  mean layer-0 degree: {:.2}", self.mean_degree0)
    }
}

impl<V> HnswIndex<V> {
    /// Walk the whole graph and check the structural invariants.
    ///
    /// Counts the live nodes reachable from the entry point (BFS across
    /// every layer's links) and verifies that each link `u → v` has its
    /// inverse `v → u` on the same layer.
    pub fn validate_graph(&self) -> GraphValidation {
        let graph = self.graph.read();

        let mut reciprocal = true;
        let mut within_caps = true;
        'outer: for slot in graph.live_slots() {
            let node = graph.node(slot);
            for (layer, list) in node.neighbors.iter().enumerate() {
                if list.len() > self.config.cap(layer) {
                    within_caps = false;
                }
                for &w in list {
                    let ok = graph.get(w).is_some_and(|peer| {
                        peer.level >= layer && peer.neighbors[layer].contains(&slot)
                    });
                    if !ok {
                        reciprocal = false;
                        break 'outer;
                    }
                }
            }
        }

        let mut connected_nodes = 0u64;
        if let Some(ep) = graph.entry_point {
            let mut seen = VisitedSet::with_capacity(graph.nodes.len());
            seen.reset(graph.nodes.len());
            let mut queue = VecDeque::new();
            seen.first_visit(ep);
            queue.push_back(ep);
            connected_nodes = 1;
            while let Some(slot) = queue.pop_front() {
                for list in &graph.node(slot).neighbors {
                    for &w in list {
                        if seen.first_visit(w) {
                            connected_nodes += 1;
                            queue.push_back(w);
                        }
                    }
                }
            }
        }

        GraphValidation {
            connected_nodes,
            reciprocal,
            within_caps,
        }
    }

    /// Current index statistics.
    pub fn stats(&self) -> IndexStats {
        let graph = self.graph.read();
        let mut level_counts = vec![0u64; graph.max_level + 1];
        let mut degree0_total = 0u64;
        for slot in graph.live_slots() {
            let node = graph.node(slot);
            level_counts[node.level] += 1;
            degree0_total += node.neighbors[0].len() as u64;
        }
        let mean_degree0 = if graph.node_count > 0 {
            degree0_total as f32 / graph.node_count as f32
        } else {
            0.0
        };
        IndexStats {
            nodes: graph.node_count,
            dim: self.dim,
            quantization: self.quant,
            max_level: graph.max_level,
            level_counts,
            mean_degree0,
        }
    }

    /// Recall self-test: sample random live nodes, search with each node's
    /// own stored vector as the query, and compare against a linear scan.
    /// Returns mean recall@k in `[0, 1]`.
    pub fn test_graph_recall(&self, samples: usize, k: usize) -> f64 {
        let graph = self.graph.read();
        let live: Vec<u32> = graph.live_slots().collect();
        if live.is_empty() || samples == 0 || k == 0 {
            return 1.0;
        }
        let k = k.min(live.len());

        let mut rng = rand::thread_rng();
        let picked: Vec<u32> = live
            .choose_multiple(&mut rng, samples.min(live.len()))
            .copied()
            .collect();

        let mut total = 0.0f64;
        let mut visited = VisitedSet::with_capacity(graph.nodes.len());
        for &sample in &picked {
            let query = graph.node(sample).vector.clone();
            let found = self.knn_slots(&graph, &query, k, &mut visited);
            let truth = self.linear_scan(&graph, &query, k);
            let hits = found
                .iter()
                .filter(|&&(_, s)| truth.iter().any(|&(_, t)| t == s))
                .count();
            total += hits as f64 / k as f64;
        }
        total / picked.len() as f64
    }

    /// Internal graph search over an already-held read guard.
    fn knn_slots(
        &self,
        graph: &Graph<V>,
        query: &crate::quantization::QuantizedVector,
        k: usize,
        visited: &mut VisitedSet,
    ) -> Vec<(f32, u32)> {
        let Some(ep) = graph.entry_point else {
            return Vec::new();
        };
        let nearest = greedy_descend(graph, query, self.dim, ep, graph.max_level, 1, visited);
        let ef = self.config.ef_search.max(k);
        let mut found = search_layer(graph, query, self.dim, &[nearest], ef, 0, visited, None);
        found.truncate(k);
        found
    }
}
