//! Deletion with neighborhood relinking.
//!
//! Removing a node tears a hole in every layer it participated in. After
//! the back-links are removed, its ex-neighbors are patched back together:
//! any ex-neighbor whose degree fell below half the layer cap tries to link
//! to the other ex-neighbors, closest first, subject to the same diversity
//! heuristic used at insert time. This restores local connectivity without
//! a global rebuild.
//!
//! The node's storage is retired, not freed: the arena slot becomes
//! reusable only once the read-slot registry has drained past the deletion
//! version.

use crate::hnsw::distance;
use crate::hnsw::graph::{Graph, HnswIndex};

impl<V> HnswIndex<V> {
    /// Delete a node by id. Returns false if the id is not live.
    ///
    /// The caller value is dropped with the node; the arena slot is
    /// recycled later, once no registered reader can still observe it.
    pub fn delete(&self, id: u64) -> bool {
        let mut graph = self.graph.write();
        graph.collect_garbage(&self.slots);

        let Some(&slot) = graph.by_id.get(&id) else {
            return false;
        };
        let level = graph.node(slot).level;

        for layer in 0..=level {
            let ex_neighbors: Vec<u32> = graph.node(slot).neighbors[layer].clone();
            for &v in &ex_neighbors {
                if let Some(list) = graph.node_mut(v).neighbors.get_mut(layer) {
                    list.retain(|&s| s != slot);
                }
            }
            self.relink(&mut graph, layer, &ex_neighbors);
        }

        if graph.entry_point == Some(slot) {
            self.replace_entry_point(&mut graph, slot);
        }

        graph.unsplice(slot);
        graph.by_id.remove(&id);
        graph.node_count -= 1;
        let version = self.bump_version();
        graph.retire(slot, version);
        true
    }

    /// Patch the neighborhood left by a deleted node at one layer.
    ///
    /// For each ex-neighbor whose degree dropped below `cap / 2`, attempt
    /// links to the remaining ex-neighbors in order of ascending distance,
    /// applying the diversity rule against the links it already has, until
    /// `cap / 2` is restored or the candidates are exhausted.
    fn relink(&self, graph: &mut Graph<V>, layer: usize, ex_neighbors: &[u32]) {
        let cap = self.config.cap(layer);
        let target = cap / 2;

        for &v in ex_neighbors {
            if graph.node(v).neighbors[layer].len() >= target {
                continue;
            }

            let v_vec = graph.node(v).vector.clone();
            let mut candidates: Vec<(f32, u32)> = ex_neighbors
                .iter()
                .filter(|&&c| c != v)
                .map(|&c| {
                    let d = distance::distance(&v_vec, &graph.node(c).vector, self.dim);
                    (d, c)
                })
                .collect();
            candidates.sort_unstable_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then_with(|| graph.node(a.1).id.cmp(&graph.node(b.1).id))
            });

            for (dist, c) in candidates {
                if graph.node(v).neighbors[layer].len() >= target {
                    break;
                }
                if graph.node(c).neighbors[layer].len() >= cap {
                    continue;
                }
                if graph.node(v).neighbors[layer].contains(&c) {
                    continue;
                }
                // Diversity: skip a candidate that sits closer to one of
                // v's existing links than to v itself.
                let dominated = graph.node(v).neighbors[layer].iter().any(|&kept| {
                    let d = distance::distance(
                        &graph.node(c).vector,
                        &graph.node(kept).vector,
                        self.dim,
                    );
                    d < dist
                });
                if dominated {
                    continue;
                }
                graph.node_mut(v).neighbors[layer].push(c);
                graph.node_mut(c).neighbors[layer].push(v);
            }
        }
    }

    /// Promote the highest-level survivor to entry point. With the graph
    /// now empty, clears it.
    fn replace_entry_point(&self, graph: &mut Graph<V>, deleted: u32) {
        let mut best: Option<(usize, u32)> = None;
        let mut cursor = graph.head;
        while let Some(s) = cursor {
            let node = graph.node(s);
            cursor = node.next;
            if s == deleted {
                continue;
            }
            match best {
                Some((lvl, _)) if node.level <= lvl => {}
                _ => best = Some((node.level, s)),
            }
        }
        match best {
            Some((lvl, s)) => {
                graph.entry_point = Some(s);
                graph.max_level = lvl;
            }
            None => {
                graph.entry_point = None;
                graph.max_level = 0;
            }
        }
    }
}
