//! Graph storage: configuration, the node arena, and the live list.
//!
//! Nodes live in an arena of stable `u32` slots; adjacency lists refer to
//! slots, never to pointers. Freed slots are recycled through a free list
//! that is fed by epoch reclamation (see [`super::epoch`]), so a slot whose
//! node was deleted stays unused while any registered reader could still
//! reference it. Live nodes are additionally threaded onto a doubly-linked
//! list rooted at `head`, most recently inserted first.

use crate::config;
use crate::error::HnswError;
use crate::hnsw::epoch::{ReadSlot, SlotRegistry};
use crate::quantization::{QuantizedVector, Quantization};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Configuration parameters for an index.
///
/// Controls the trade-off between build speed, search speed, recall, and
/// memory usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Number of bidirectional links per node on layers above 0.
    pub m: usize,
    /// Maximum links per node at layer 0 (typically `2 * m`).
    pub m0: usize,
    /// Candidate list size during index construction.
    pub ef_construction: usize,
    /// Candidate list size during search (higher = better recall, slower).
    pub ef_search: usize,
    /// Maximum number of layers in the graph.
    pub max_level: usize,
    /// Multiplier applied to `k` to bound predicate evaluations during
    /// filtered search.
    pub filter_ef_mult: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: config::HNSW_DEFAULT_M,
            m0: config::HNSW_DEFAULT_M0,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            ef_search: config::HNSW_DEFAULT_EF_SEARCH,
            max_level: config::HNSW_MAX_LEVEL,
            filter_ef_mult: config::FILTER_EF_MULT,
        }
    }
}

impl HnswConfig {
    /// Neighbor cap for a layer: `m0` at layer 0, `m` above.
    #[inline]
    pub fn cap(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m0
        } else {
            self.m
        }
    }
}

/// A stored element: vector, caller value, attributes, and adjacency.
#[derive(Debug)]
pub(crate) struct Node<V> {
    /// Caller-assigned stable identifier, unique within the index.
    pub id: u64,
    pub value: V,
    pub vector: QuantizedVector,
    /// Pre-normalization magnitude of the inserted vector.
    pub norm: f32,
    /// Top layer this node participates in.
    pub level: usize,
    /// Neighbor slots per layer; `neighbors.len() == level + 1`.
    pub neighbors: Vec<Vec<u32>>,
    /// Raw JSON attribute document for filtered search.
    pub attributes: Option<Box<str>>,
    // Live-list links (insertion order, most recent at head).
    pub prev: Option<u32>,
    pub next: Option<u32>,
}

/// The mutable graph state guarded by the index's `RwLock`.
#[derive(Debug)]
pub(crate) struct Graph<V> {
    pub nodes: Vec<Option<Node<V>>>,
    /// Recycled slots available for allocation.
    free: Vec<u32>,
    /// Slots of deleted nodes still gated by the epoch registry, with the
    /// version at which they died.
    garbage: Vec<(u32, u64)>,
    pub by_id: HashMap<u64, u32>,
    pub head: Option<u32>,
    pub entry_point: Option<u32>,
    pub max_level: usize,
    pub node_count: u64,
}

impl<V> Graph<V> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            garbage: Vec::new(),
            by_id: HashMap::new(),
            head: None,
            entry_point: None,
            max_level: 0,
            node_count: 0,
        }
    }

    /// Borrow a live node. Panics on a vacant slot: adjacency lists and the
    /// live list only ever hold occupied slots.
    #[inline]
    pub fn node(&self, slot: u32) -> &Node<V> {
        self.nodes[slot as usize]
            .as_ref()
            .expect("dangling slot in graph structure")
    }

    #[inline]
    pub fn node_mut(&mut self, slot: u32) -> &mut Node<V> {
        self.nodes[slot as usize]
            .as_mut()
            .expect("dangling slot in graph structure")
    }

    /// Borrow a slot that may have been vacated by a concurrent-world
    /// deletion (used by optimistic commit verification).
    #[inline]
    pub fn get(&self, slot: u32) -> Option<&Node<V>> {
        self.nodes.get(slot as usize).and_then(|n| n.as_ref())
    }

    /// Place a node into the arena, reusing a reclaimed slot when one is
    /// available.
    pub fn alloc(&mut self, node: Node<V>) -> u32 {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                (self.nodes.len() - 1) as u32
            }
        }
    }

    /// Thread `slot` onto the head of the live list.
    pub fn splice_head(&mut self, slot: u32) {
        let old_head = self.head;
        {
            let n = self.node_mut(slot);
            n.prev = None;
            n.next = old_head;
        }
        if let Some(h) = old_head {
            self.node_mut(h).prev = Some(slot);
        }
        self.head = Some(slot);
    }

    /// Remove `slot` from the live list.
    pub fn unsplice(&mut self, slot: u32) {
        let (prev, next) = {
            let n = self.node(slot);
            (n.prev, n.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        if let Some(nx) = next {
            self.node_mut(nx).prev = prev;
        }
    }

    /// Drop the node in `slot` and park the slot in the garbage list until
    /// the epoch registry drains past `version`.
    pub fn retire(&mut self, slot: u32, version: u64) {
        self.nodes[slot as usize] = None;
        self.garbage.push((slot, version));
    }

    /// Move garbage slots whose deletion version every reader has passed
    /// onto the free list. Called by writers before mutating.
    pub fn collect_garbage(&mut self, slots: &SlotRegistry) {
        if self.garbage.is_empty() {
            return;
        }
        let mut i = 0;
        while i < self.garbage.len() {
            let (slot, dead_at) = self.garbage[i];
            if slots.drained_past(dead_at) {
                self.free.push(slot);
                self.garbage.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Number of garbage slots awaiting reclamation.
    #[cfg(test)]
    pub fn pending_garbage(&self) -> usize {
        self.garbage.len()
    }

    /// Iterate live slots in live-list order.
    pub fn live_slots(&self) -> LiveSlots<'_, V> {
        LiveSlots {
            graph: self,
            cursor: self.head,
        }
    }
}

pub(crate) struct LiveSlots<'a, V> {
    graph: &'a Graph<V>,
    cursor: Option<u32>,
}

impl<V> Iterator for LiveSlots<'_, V> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let slot = self.cursor?;
        self.cursor = self.graph.node(slot).next;
        Some(slot)
    }
}

/// A concurrent HNSW index over vectors of a fixed dimension.
///
/// `V` is the caller's opaque per-node value (e.g. a word). One writer at a
/// time mutates the graph; readers run concurrently and register through
/// [`acquire_read_slot`](Self::acquire_read_slot).
#[derive(Debug)]
pub struct HnswIndex<V> {
    pub(crate) dim: usize,
    pub(crate) quant: Quantization,
    pub(crate) config: HnswConfig,
    pub(crate) graph: RwLock<Graph<V>>,
    pub(crate) slots: SlotRegistry,
    /// Monotone mutation counter; readers snapshot it at slot acquisition.
    pub(crate) version: AtomicU64,
}

impl<V> HnswIndex<V> {
    /// Create an empty index with default configuration.
    pub fn new(dim: usize, quant: Quantization) -> Result<Self, HnswError> {
        Self::with_config(dim, quant, HnswConfig::default())
    }

    /// Create an empty index with explicit configuration.
    pub fn with_config(
        dim: usize,
        quant: Quantization,
        config: HnswConfig,
    ) -> Result<Self, HnswError> {
        if dim == 0 || dim > config::MAX_DIMENSION {
            return Err(HnswError::InvalidDimension(dim));
        }
        Ok(Self {
            dim,
            quant,
            config,
            graph: RwLock::new(Graph::new()),
            slots: SlotRegistry::new(),
            version: AtomicU64::new(1),
        })
    }

    /// The fixed vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The storage format every node uses.
    pub fn quantization(&self) -> Quantization {
        self.quant
    }

    /// Index configuration.
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.graph.read().node_count as usize
    }

    /// True if the index holds no live nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if a node with this id is live.
    pub fn contains(&self, id: u64) -> bool {
        self.graph.read().by_id.contains_key(&id)
    }

    /// Register as a reader. The returned guard pins the storage of every
    /// node live at acquisition until it is dropped; searches require one.
    pub fn acquire_read_slot(&self) -> ReadSlot<'_> {
        ReadSlot::new(&self.slots, self.version.load(Ordering::Acquire))
    }

    /// Write the node's dequantized, de-normalized vector into `out`.
    /// Returns false if the id is not live.
    pub fn get_node_vector(&self, id: u64, out: &mut Vec<f32>) -> bool {
        let graph = self.graph.read();
        let Some(&slot) = graph.by_id.get(&id) else {
            return false;
        };
        let node = graph.node(slot);
        out.clear();
        out.resize(self.dim, 0.0);
        node.vector.decode_into(out);
        for x in out.iter_mut() {
            *x *= node.norm;
        }
        true
    }

    /// The node's attribute document, if it has one.
    pub fn attributes(&self, id: u64) -> Option<String> {
        let graph = self.graph.read();
        let &slot = graph.by_id.get(&id)?;
        graph.node(slot).attributes.as_ref().map(|a| a.to_string())
    }

    /// Ids of live nodes in insertion order, most recent first.
    pub fn live_ids(&self) -> Vec<u64> {
        let graph = self.graph.read();
        graph.live_slots().map(|s| graph.node(s).id).collect()
    }

    /// Draw a level from the exponential distribution
    /// `floor(-ln(U) / ln(M))`, clamped to the configured maximum.
    pub(crate) fn random_level(&self) -> usize {
        let ml = 1.0 / (self.config.m as f64).ln();
        let u: f64 = rand::random();
        let level = (-u.ln() * ml) as usize;
        level.min(self.config.max_level.saturating_sub(1))
    }

    /// Bump the mutation counter. Callers hold the write guard.
    pub(crate) fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current version.
    pub(crate) fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl<V: Clone> HnswIndex<V> {
    /// Clone out the caller value stored with a node.
    pub fn value(&self, id: u64) -> Option<V> {
        let graph = self.graph.read();
        let &slot = graph.by_id.get(&id)?;
        Some(graph.node(slot).value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64) -> Node<&'static str> {
        Node {
            id,
            value: "x",
            vector: QuantizedVector::F32(vec![1.0]),
            norm: 1.0,
            level: 0,
            neighbors: vec![Vec::new()],
            attributes: None,
            prev: None,
            next: None,
        }
    }

    #[test]
    fn test_new_empty_index() {
        let idx: HnswIndex<&str> = HnswIndex::new(128, Quantization::F32).unwrap();
        assert_eq!(idx.dim(), 128);
        assert!(idx.is_empty());
        assert_eq!(idx.len(), 0);
        assert!(!idx.contains(0));
    }

    #[test]
    fn test_invalid_dimension() {
        assert_eq!(
            HnswIndex::<&str>::new(0, Quantization::F32).unwrap_err(),
            HnswError::InvalidDimension(0)
        );
        assert!(HnswIndex::<&str>::new(config::MAX_DIMENSION + 1, Quantization::F32).is_err());
    }

    #[test]
    fn test_live_list_splice_unsplice() {
        let mut g: Graph<&str> = Graph::new();
        let a = g.alloc(node(1));
        let b = g.alloc(node(2));
        let c = g.alloc(node(3));
        g.splice_head(a);
        g.splice_head(b);
        g.splice_head(c);
        let order: Vec<u64> = g.live_slots().map(|s| g.node(s).id).collect();
        assert_eq!(order, vec![3, 2, 1]);

        g.unsplice(b);
        let order: Vec<u64> = g.live_slots().map(|s| g.node(s).id).collect();
        assert_eq!(order, vec![3, 1]);

        g.unsplice(c);
        let order: Vec<u64> = g.live_slots().map(|s| g.node(s).id).collect();
        assert_eq!(order, vec![1]);

        g.unsplice(a);
        assert!(g.live_slots().next().is_none());
        assert_eq!(g.head, None);
    }

    #[test]
    fn test_slot_reuse_gated_by_registry() {
        let mut g: Graph<&str> = Graph::new();
        let reg = SlotRegistry::new();

        let a = g.alloc(node(1));
        g.retire(a, 5);
        assert_eq!(g.pending_garbage(), 1);

        // A reader pinned at version 5 blocks reclamation.
        let pinned = reg.acquire(5);
        g.collect_garbage(&reg);
        assert_eq!(g.pending_garbage(), 1);
        let b = g.alloc(node(2));
        assert_ne!(a, b, "slot must not be recycled while pinned");

        // Once the reader advances past the deletion version, the slot is
        // recycled.
        reg.release(pinned);
        let _later = reg.acquire(6);
        g.collect_garbage(&reg);
        assert_eq!(g.pending_garbage(), 0);
        let c = g.alloc(node(3));
        assert_eq!(a, c);
    }

    #[test]
    fn test_random_level_bounded() {
        let idx: HnswIndex<&str> = HnswIndex::new(8, Quantization::F32).unwrap();
        for _ in 0..1000 {
            assert!(idx.random_level() < idx.config.max_level);
        }
    }

    #[test]
    fn test_config_cap() {
        let cfg = HnswConfig::default();
        assert_eq!(cfg.cap(0), cfg.m0);
        assert_eq!(cfg.cap(1), cfg.m);
        assert_eq!(cfg.cap(7), cfg.m);
    }
}
