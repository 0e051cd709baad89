//! Graph search: single-layer candidate search and multi-layer KNN.
//!
//! The layer search keeps two priority structures: a min-heap of unexplored
//! candidates and a max-heap of the current best results, and stops once the
//! nearest unexplored candidate is farther than the worst kept result. Ties
//! on distance break by ascending node id so builds and searches are
//! reproducible.
//!
//! An optional filter program restricts which candidates may be *returned*;
//! rejected candidates still steer graph exploration. Predicate evaluations
//! are budgeted, so a highly selective filter terminates instead of walking
//! the whole graph.

use crate::error::HnswError;
use crate::expr::Program;
use crate::hnsw::distance;
use crate::hnsw::epoch::ReadSlot;
use crate::hnsw::graph::{Graph, HnswIndex};
use crate::hnsw::visited::VisitedSet;
use crate::quantization::{normalize, QuantizedVector};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One search result: the node's caller-assigned id and its distance to the
/// query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub id: u64,
    pub distance: f32,
}

/// Heap entry ordered by `(distance, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    dist: OrderedFloat<f32>,
    id: u64,
    slot: u32,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist.cmp(&other.dist).then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Predicate state for a filtered layer-0 search.
pub(crate) struct FilterState<'a> {
    program: &'a Program,
    /// Remaining predicate evaluations before the search gives up.
    budget: usize,
    exhausted: bool,
}

impl<'a> FilterState<'a> {
    pub(crate) fn new(program: &'a Program, budget: usize) -> Self {
        Self {
            program,
            budget,
            exhausted: false,
        }
    }

    /// Test a node against the predicate, spending budget. Nodes without
    /// attributes, or with attributes that are not valid JSON, never match.
    fn admit(&mut self, attributes: Option<&str>) -> bool {
        if self.budget == 0 {
            self.exhausted = true;
            return false;
        }
        self.budget -= 1;
        let Some(raw) = attributes else {
            return false;
        };
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(doc) => self.program.eval(&doc),
            Err(_) => false,
        }
    }
}

/// Search one layer for the `ef` nearest admissible nodes to `query`.
///
/// Returns `(distance, slot)` pairs sorted ascending. With a filter, only
/// admitted nodes are returned, but every visited node still feeds the
/// candidate heap so the walk can tunnel through rejected regions.
pub(crate) fn search_layer<V>(
    graph: &Graph<V>,
    query: &QuantizedVector,
    dim: usize,
    entry_points: &[u32],
    ef: usize,
    layer: usize,
    visited: &mut VisitedSet,
    mut filter: Option<&mut FilterState<'_>>,
) -> Vec<(f32, u32)> {
    visited.reset(graph.nodes.len());

    let mut candidates: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(ef + 1);
    // Cached worst kept distance, avoids heap peeks in the hot loop.
    let mut worst = f32::MAX;

    let consider = |slot: u32,
                        candidates: &mut BinaryHeap<Reverse<HeapEntry>>,
                        results: &mut BinaryHeap<HeapEntry>,
                        worst: &mut f32,
                        filter: &mut Option<&mut FilterState<'_>>| {
        let node = graph.node(slot);
        let dist = distance::distance(query, &node.vector, dim);
        if results.len() >= ef && dist >= *worst {
            return;
        }
        let entry = HeapEntry {
            dist: OrderedFloat(dist),
            id: node.id,
            slot,
        };
        candidates.push(Reverse(entry));
        let admitted = match filter {
            Some(f) => f.admit(node.attributes.as_deref()),
            None => true,
        };
        if admitted {
            results.push(entry);
            if results.len() > ef {
                results.pop();
            }
            if results.len() >= ef {
                *worst = results.peek().map_or(f32::MAX, |r| r.dist.0);
            }
        }
    };

    for &ep in entry_points {
        if visited.first_visit(ep) {
            consider(ep, &mut candidates, &mut results, &mut worst, &mut filter);
        }
    }

    while let Some(Reverse(candidate)) = candidates.pop() {
        if results.len() >= ef && candidate.dist.0 > worst {
            break;
        }
        if let Some(f) = filter.as_deref() {
            if f.exhausted {
                break;
            }
        }

        let node = graph.node(candidate.slot);
        let Some(neighbor_list) = node.neighbors.get(layer) else {
            continue;
        };
        for &neighbor in neighbor_list {
            if visited.first_visit(neighbor) {
                consider(
                    neighbor,
                    &mut candidates,
                    &mut results,
                    &mut worst,
                    &mut filter,
                );
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.dist.0, r.slot))
        .collect()
}

/// Greedy single-path descent used on the upper layers (ef = 1).
pub(crate) fn greedy_descend<V>(
    graph: &Graph<V>,
    query: &QuantizedVector,
    dim: usize,
    mut current: u32,
    from_layer: usize,
    to_layer: usize,
    visited: &mut VisitedSet,
) -> u32 {
    for layer in (to_layer..=from_layer).rev() {
        let found = search_layer(graph, query, dim, &[current], 1, layer, visited, None);
        if let Some(&(_, nearest)) = found.first() {
            current = nearest;
        }
    }
    current
}

impl<V> HnswIndex<V> {
    /// K-nearest-neighbor search.
    ///
    /// Uses `max(ef_search, k)` as the layer-0 candidate list size. With a
    /// `filter`, only nodes whose attributes satisfy the program are
    /// returned, and predicate evaluations are capped at
    /// `k * filter_ef_mult`.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        slot: &ReadSlot<'_>,
        filter: Option<&Program>,
    ) -> Result<Vec<SearchHit>, HnswError> {
        let ef = self.config.ef_search.max(k);
        self.search_ef(query, k, ef, None, slot, filter)
    }

    /// K-nearest-neighbor search with explicit exploration parameters.
    ///
    /// `ef` is the layer-0 candidate list size (raised to `k` if smaller).
    /// `filter_ef` overrides the predicate-evaluation budget for filtered
    /// searches; `None` uses `k * filter_ef_mult`.
    pub fn search_ef(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter_ef: Option<usize>,
        slot: &ReadSlot<'_>,
        filter: Option<&Program>,
    ) -> Result<Vec<SearchHit>, HnswError> {
        assert!(
            slot.registry_is(&self.slots),
            "read slot belongs to a different index"
        );
        if query.len() != self.dim {
            return Err(HnswError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        let mut normalized = query.to_vec();
        if normalize(&mut normalized).is_none() {
            return Err(HnswError::ZeroVector);
        }
        let qv = QuantizedVector::encode(self.quant, &normalized);

        let graph = self.graph.read();
        let Some(ep) = graph.entry_point else {
            return Ok(Vec::new());
        };

        let mut visited = VisitedSet::with_capacity(graph.nodes.len());
        let nearest = if graph.max_level > 0 {
            greedy_descend(&graph, &qv, self.dim, ep, graph.max_level, 1, &mut visited)
        } else {
            ep
        };

        let ef = ef.max(k);
        let mut filter_state = filter.map(|program| {
            let budget = filter_ef.unwrap_or_else(|| k.saturating_mul(self.config.filter_ef_mult));
            FilterState::new(program, budget)
        });
        let found = search_layer(
            &graph,
            &qv,
            self.dim,
            &[nearest],
            ef,
            0,
            &mut visited,
            filter_state.as_mut(),
        );

        Ok(found
            .into_iter()
            .take(k)
            .map(|(dist, slot)| SearchHit {
                id: graph.node(slot).id,
                distance: dist,
            })
            .collect())
    }

    /// Exact k-nearest-neighbors by linear scan. Ground truth for the
    /// recall self-test; O(n) per call.
    pub(crate) fn linear_scan(
        &self,
        graph: &Graph<V>,
        query: &QuantizedVector,
        k: usize,
    ) -> Vec<(f32, u32)> {
        let mut all: Vec<HeapEntry> = graph
            .live_slots()
            .map(|slot| {
                let node = graph.node(slot);
                HeapEntry {
                    dist: OrderedFloat(distance::distance(query, &node.vector, self.dim)),
                    id: node.id,
                    slot,
                }
            })
            .collect();
        all.sort_unstable();
        all.truncate(k);
        all.into_iter().map(|e| (e.dist.0, e.slot)).collect()
    }
}
