//! Insertion: the locked path and the optimistic two-phase path.
//!
//! Both paths share the same shape: greedy-descend from the entry point to
//! the new node's level, run a candidate search per layer with
//! `ef_construction`, reduce each candidate set with the diversity
//! heuristic (Algorithm 4 from the HNSW paper), then install bidirectional
//! links and prune any neighbor that exceeded its layer cap.
//!
//! The locked path holds the write guard throughout. The optimistic path
//! runs the expensive candidate searches under a read guard only, records
//! what it observed, and re-validates under the write guard at commit;
//! on conflict the caller falls back to the locked path.

use crate::error::HnswError;
use crate::hnsw::distance;
use crate::hnsw::epoch::ReadSlot;
use crate::hnsw::graph::{Graph, HnswIndex, Node};
use crate::hnsw::search::{greedy_descend, search_layer};
use crate::hnsw::visited::VisitedSet;
use crate::quantization::{normalize, QuantizedVector};
use ordered_float::OrderedFloat;

/// Diversity-preserving neighbor selection.
///
/// Candidates are taken in order of ascending `(distance, id)`; one is
/// accepted only if it is closer to the base point than to every
/// already-accepted neighbor. This avoids clusters of mutually-close
/// neighbors and keeps long-range links. If the heuristic under-fills the
/// `m` slots, the closest unused candidates are backfilled.
pub(crate) fn select_neighbors<V>(
    graph: &Graph<V>,
    dim: usize,
    candidates: &[(f32, u32)],
    m: usize,
) -> Vec<(f32, u32)> {
    let mut sorted = candidates.to_vec();
    sorted.sort_unstable_by_key(|&(d, slot)| (OrderedFloat(d), graph.node(slot).id));
    sorted.dedup_by_key(|&mut (_, slot)| slot);

    let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);
    for &(dist_to_base, cand) in &sorted {
        if selected.len() >= m {
            break;
        }
        let cand_vec = &graph.node(cand).vector;
        let diverse = selected.iter().all(|&(_, kept)| {
            let d = distance::distance(cand_vec, &graph.node(kept).vector, dim);
            dist_to_base <= d
        });
        if diverse {
            selected.push((dist_to_base, cand));
        }
    }

    if selected.len() < m {
        for &(dist, cand) in &sorted {
            if selected.len() >= m {
                break;
            }
            if !selected.iter().any(|&(_, s)| s == cand) {
                selected.push((dist, cand));
            }
        }
    }

    selected
}

/// A prepared (not yet committed) optimistic insert.
///
/// Holds a [`ReadSlot`] so the arena slots it observed cannot be recycled
/// before [`HnswIndex::try_commit_insert`] re-validates them.
#[derive(Debug)]
pub struct InsertPrep<'a, V> {
    /// Held for its drop: keeps observed arena slots from being recycled.
    _pin: ReadSlot<'a>,
    observed_version: u64,
    observed_ep: Option<u32>,
    observed_max_level: usize,
    id: u64,
    value: V,
    attributes: Option<Box<str>>,
    vector: QuantizedVector,
    norm: f32,
    level: usize,
    /// Selected neighbors per layer, innermost first (index = layer).
    selected: Vec<Vec<ObservedNeighbor>>,
    duplicate: bool,
}

#[derive(Debug, Clone, Copy)]
struct ObservedNeighbor {
    slot: u32,
    dist: f32,
    id: u64,
    level: usize,
}

impl<V> InsertPrep<'_, V> {
    /// Recover the caller value after a conflicted commit, for the fallback
    /// locked insert.
    pub fn into_value(self) -> V {
        self.value
    }
}

impl<V> HnswIndex<V> {
    fn check_vector(&self, vector: &[f32]) -> Result<(Vec<f32>, f32), HnswError> {
        if vector.len() != self.dim {
            return Err(HnswError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        let mut normalized = vector.to_vec();
        let norm = normalize(&mut normalized).ok_or(HnswError::ZeroVector)?;
        Ok((normalized, norm))
    }

    /// Insert a vector under the write lock.
    ///
    /// The vector is L2-normalized and quantized to the index's storage
    /// format; its original magnitude is kept so
    /// [`get_node_vector`](Self::get_node_vector) can reconstruct it.
    /// Inserting an id that is already present is a no-op returning that id
    /// (the new value is dropped).
    pub fn insert(
        &self,
        vector: &[f32],
        attributes: Option<&str>,
        id: u64,
        value: V,
        ef_construction: usize,
    ) -> Result<u64, HnswError> {
        let (normalized, norm) = self.check_vector(vector)?;
        let qv = QuantizedVector::encode(self.quant, &normalized);

        let mut graph = self.graph.write();
        graph.collect_garbage(&self.slots);
        if graph.by_id.contains_key(&id) {
            return Ok(id);
        }

        let level = self.random_level();
        let selected = self.find_neighbors(&graph, &qv, level, ef_construction);
        self.install(
            &mut graph,
            id,
            value,
            attributes.map(Box::from),
            qv,
            norm,
            level,
            selected,
        );
        self.bump_version();
        Ok(id)
    }

    /// Phase 1 + 2: descend to the node's level, then collect and reduce
    /// candidates per layer. Pure read of the graph.
    fn find_neighbors(
        &self,
        graph: &Graph<V>,
        qv: &QuantizedVector,
        level: usize,
        ef_construction: usize,
    ) -> Vec<Vec<(f32, u32)>> {
        let mut selected: Vec<Vec<(f32, u32)>> = vec![Vec::new(); level + 1];
        let Some(ep) = graph.entry_point else {
            return selected;
        };

        let mut visited = VisitedSet::with_capacity(graph.nodes.len());
        let ef = ef_construction.max(1);

        // No-op when the node's level reaches the top of the graph.
        let current = greedy_descend(
            graph,
            qv,
            self.dim,
            ep,
            graph.max_level,
            level + 1,
            &mut visited,
        );

        let top = level.min(graph.max_level);
        let mut layer_eps: Vec<u32> = vec![current];
        for layer in (0..=top).rev() {
            let candidates = search_layer(
                graph,
                qv,
                self.dim,
                &layer_eps,
                ef,
                layer,
                &mut visited,
                None,
            );
            selected[layer] = select_neighbors(graph, self.dim, &candidates, self.config.cap(layer));
            layer_eps.clear();
            layer_eps.extend(candidates.iter().map(|&(_, slot)| slot));
            if layer_eps.is_empty() {
                layer_eps.push(ep);
            }
        }
        selected
    }

    /// Phase 3: allocate the node, install bidirectional links, prune
    /// over-capacity neighbors (symmetrically), update the entry point, and
    /// splice onto the live list. Callers hold the write guard.
    #[allow(clippy::too_many_arguments)]
    fn install(
        &self,
        graph: &mut Graph<V>,
        id: u64,
        value: V,
        attributes: Option<Box<str>>,
        vector: QuantizedVector,
        norm: f32,
        level: usize,
        selected: Vec<Vec<(f32, u32)>>,
    ) -> u32 {
        let was_empty = graph.entry_point.is_none();
        let neighbors: Vec<Vec<u32>> = selected
            .iter()
            .map(|layer| layer.iter().map(|&(_, slot)| slot).collect())
            .collect();

        let slot = graph.alloc(Node {
            id,
            value,
            vector,
            norm,
            level,
            neighbors,
            attributes,
            prev: None,
            next: None,
        });

        for (layer, layer_selected) in selected.iter().enumerate() {
            let cap = self.config.cap(layer);
            for &(_, neighbor) in layer_selected {
                graph.node_mut(neighbor).neighbors[layer].push(slot);
                if graph.node(neighbor).neighbors[layer].len() > cap {
                    self.prune_neighbor(graph, neighbor, layer, cap);
                }
            }
        }

        graph.by_id.insert(id, slot);
        graph.splice_head(slot);
        graph.node_count += 1;
        if was_empty || level > graph.max_level {
            graph.entry_point = Some(slot);
            graph.max_level = level;
        }
        slot
    }

    /// Re-run the selection heuristic over an over-capacity neighbor list.
    /// Links dropped from `slot`'s list are removed from the other side as
    /// well, keeping every link reciprocal. A neighbor whose only link at
    /// this layer is the pruned one is kept instead of the farthest
    /// replaceable pick, so pruning never orphans a node.
    fn prune_neighbor(&self, graph: &mut Graph<V>, slot: u32, layer: usize, cap: usize) {
        let base_vec = graph.node(slot).vector.clone();
        let current: Vec<u32> = graph.node(slot).neighbors[layer].clone();
        let candidates: Vec<(f32, u32)> = current
            .iter()
            .map(|&c| {
                let d = distance::distance(&base_vec, &graph.node(c).vector, self.dim);
                (d, c)
            })
            .collect();
        let kept = select_neighbors(graph, self.dim, &candidates, cap);
        let mut kept_slots: Vec<u32> = kept.iter().map(|&(_, s)| s).collect();

        let dropped_slots: Vec<u32> = current
            .iter()
            .filter(|c| !kept_slots.contains(c))
            .copied()
            .collect();
        for dropped in dropped_slots {
            let would_orphan = graph.node(dropped).neighbors[layer].len() == 1;
            if would_orphan {
                let evictable = kept_slots
                    .iter()
                    .rposition(|&k| graph.node(k).neighbors[layer].len() > 1);
                if let Some(pos) = evictable {
                    let evicted = kept_slots[pos];
                    graph.node_mut(evicted).neighbors[layer].retain(|&s| s != slot);
                    kept_slots[pos] = dropped;
                    continue;
                }
            }
            if let Some(list) = graph.node_mut(dropped).neighbors.get_mut(layer) {
                list.retain(|&s| s != slot);
            }
        }
        graph.node_mut(slot).neighbors[layer] = kept_slots;
    }

    /// First half of the optimistic insert: run the candidate searches
    /// without the write lock, recording the observed graph state.
    ///
    /// The returned [`InsertPrep`] pins a read slot so observed storage
    /// cannot be recycled before commit.
    pub fn prepare_insert<'a>(
        &'a self,
        vector: &[f32],
        attributes: Option<&str>,
        id: u64,
        value: V,
        ef_construction: usize,
    ) -> Result<InsertPrep<'a, V>, HnswError> {
        let (normalized, norm) = self.check_vector(vector)?;
        let qv = QuantizedVector::encode(self.quant, &normalized);
        let level = self.random_level();

        let pin = self.acquire_read_slot();
        let graph = self.graph.read();
        let observed_version = self.current_version();

        let duplicate = graph.by_id.contains_key(&id);
        let selected = if duplicate {
            Vec::new()
        } else {
            self.find_neighbors(&graph, &qv, level, ef_construction)
                .into_iter()
                .map(|layer| {
                    layer
                        .into_iter()
                        .map(|(dist, slot)| {
                            let node = graph.node(slot);
                            ObservedNeighbor {
                                slot,
                                dist,
                                id: node.id,
                                level: node.level,
                            }
                        })
                        .collect()
                })
                .collect()
        };
        let observed_ep = graph.entry_point;
        let observed_max_level = graph.max_level;
        drop(graph);

        Ok(InsertPrep {
            _pin: pin,
            observed_version,
            observed_ep,
            observed_max_level,
            id,
            value,
            attributes: attributes.map(Box::from),
            vector: qv,
            norm,
            level,
            selected,
            duplicate,
        })
    }

    /// Second half of the optimistic insert: validate and commit under the
    /// write lock.
    ///
    /// Commits directly when the graph version is unchanged; otherwise every
    /// observed neighbor must still be live at its observed level and the
    /// entry point must be unchanged. On conflict the prep is handed back so
    /// the caller can recover the value and fall back to
    /// [`insert`](Self::insert).
    pub fn try_commit_insert<'a>(
        &'a self,
        prep: InsertPrep<'a, V>,
    ) -> Result<u64, InsertPrep<'a, V>> {
        let mut graph = self.graph.write();
        graph.collect_garbage(&self.slots);

        if graph.by_id.contains_key(&prep.id) {
            return Ok(prep.id);
        }
        if prep.duplicate {
            // Observed as a duplicate, but the node is gone now: the scan
            // was never performed, so there is nothing valid to commit.
            return Err(prep);
        }

        if self.current_version() != prep.observed_version {
            let unchanged_frame = graph.entry_point == prep.observed_ep
                && graph.max_level == prep.observed_max_level;
            let neighbors_live = prep.selected.iter().all(|layer| {
                layer.iter().all(|obs| {
                    graph
                        .get(obs.slot)
                        .map_or(false, |n| n.id == obs.id && n.level == obs.level)
                })
            });
            if !unchanged_frame || !neighbors_live {
                drop(graph);
                return Err(prep);
            }
        }

        let selected: Vec<Vec<(f32, u32)>> = prep
            .selected
            .iter()
            .map(|layer| layer.iter().map(|obs| (obs.dist, obs.slot)).collect())
            .collect();
        self.install(
            &mut graph,
            prep.id,
            prep.value,
            prep.attributes,
            prep.vector,
            prep.norm,
            prep.level,
            selected,
        );
        self.bump_version();
        Ok(prep.id)
    }
}
